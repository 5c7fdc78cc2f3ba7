//! `GRAPH_UPDATE` (§4.7): merge `CODE_PARSING`'s normalized graphs into the
//! graph database, then apply any file deletions reported by `GIT_SYNC`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EffectiveTaskConfig;
use crate::error::IndexerError;
use crate::error::Result;
use crate::graph::GraphSink;
use crate::normalize::NormalizedGraph;
use crate::task::JobContext;
use crate::task::Task;
use crate::task::TaskName;
use crate::task::TaskOutput;

pub struct GraphUpdateTask {
    sink: Arc<dyn GraphSink>,
}

impl GraphUpdateTask {
    pub fn new(sink: Arc<dyn GraphSink>) -> Self {
        GraphUpdateTask { sink }
    }
}

#[async_trait]
impl Task for GraphUpdateTask {
    fn name(&self) -> TaskName {
        TaskName::GraphUpdate
    }

    fn required_upstream(&self) -> &'static [TaskName] {
        &[TaskName::GitSync]
    }

    fn optional_upstream(&self) -> &'static [TaskName] {
        &[TaskName::CodeParsing]
    }

    async fn should_run(&self, _ctx: &JobContext) -> Result<bool> {
        Ok(true)
    }

    async fn validate(&self, ctx: &JobContext) -> Result<()> {
        if ctx.output_of(TaskName::GitSync).is_none() {
            return Err(IndexerError::Validation(
                "GRAPH_UPDATE requires GIT_SYNC's output".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext, _config: EffectiveTaskConfig) -> Result<TaskOutput> {
        let files_deleted = match ctx.output_of(TaskName::GitSync) {
            Some(TaskOutput::GitSync { files_deleted, .. }) => files_deleted,
            _ => Vec::new(),
        };

        let mut merged = NormalizedGraph::default();
        if let Some(TaskOutput::CodeParsing { parsing_results, .. }) = ctx.output_of(TaskName::CodeParsing) {
            for graph in parsing_results {
                merged.merge(graph);
            }
        }

        // Nodes first, relationships second (already the order `write_graph`
        // applies internally), deletes last (§5 "Ordering guarantees").
        let write_stats = self.sink.write_graph(&merged, &ctx.cancellation).await?;
        let delete_stats = self.sink.delete_files(&ctx.codebase_id, &files_deleted).await?;

        Ok(TaskOutput::GraphUpdate {
            nodes_created: write_stats.nodes_written,
            nodes_updated: write_stats.nodes_updated,
            relationships_created: write_stats.relationships_written,
            nodes_deleted: delete_stats.nodes_deleted,
            relationships_deleted: delete_stats.relationships_deleted,
        })
    }
}
