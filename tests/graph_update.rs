//! End-to-end exercise of `GRAPH_UPDATE` against an in-memory `GraphSink`
//! (no Neo4j instance needed): a full index run, idempotent re-indexing,
//! incremental deletes, unknown-relationship drops, and two codebases
//! indexed concurrently without crossing id prefixes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use codegraph_indexer::config::EffectiveTaskConfig;
use codegraph_indexer::config::TaskConfigResolver;
use codegraph_indexer::config::TaskDefaults;
use codegraph_indexer::config::TaskOverrides;
use codegraph_indexer::container::SupportedLanguage;
use codegraph_indexer::error::Result as IndexerResult;
use codegraph_indexer::graph::GraphSink;
use codegraph_indexer::graph::RecordingGraphSink;
use codegraph_indexer::normalize;
use codegraph_indexer::normalize::NodeType;
use codegraph_indexer::normalize::NormalizedGraph;
use codegraph_indexer::task::run_task;
use codegraph_indexer::task::JobContext;
use codegraph_indexer::task::JobType;
use codegraph_indexer::task::Task;
use codegraph_indexer::task::TaskName;
use codegraph_indexer::task::TaskOutput;
use codegraph_indexer::tasks::GraphUpdateTask;
use codegraph_indexer::util::progress::ProgressSink;

/// A fixed `TaskOutput::GitSync`/`TaskOutput::CodeParsing` pair, handed to
/// `GraphUpdateTask` the same way the real upstream tasks would populate
/// `JobContext` — but precomputed, so these tests don't need a real Docker
/// daemon or git checkout.
struct FixedUpstream {
    name: TaskName,
    output: TaskOutput,
}

#[async_trait]
impl Task for FixedUpstream {
    fn name(&self) -> TaskName {
        self.name
    }

    fn required_upstream(&self) -> &'static [TaskName] {
        &[]
    }

    async fn should_run(&self, _ctx: &JobContext) -> IndexerResult<bool> {
        Ok(true)
    }

    async fn validate(&self, _ctx: &JobContext) -> IndexerResult<()> {
        Ok(())
    }

    async fn execute(&self, _ctx: &JobContext, _config: EffectiveTaskConfig) -> IndexerResult<TaskOutput> {
        Ok(self.output.clone())
    }
}

fn ctx(codebase: &str) -> JobContext {
    JobContext::new(
        Uuid::new_v4(),
        codebase,
        codebase,
        format!("https://example.invalid/{codebase}.git"),
        "main",
        JobType::Full,
        None,
        PathBuf::from("/tmp/work"),
        PathBuf::from("/tmp/store"),
        PathBuf::from("/tmp/tmp"),
    )
}

fn git_sync_output(files_deleted: Vec<String>) -> TaskOutput {
    TaskOutput::GitSync {
        clone_path: PathBuf::from("/tmp/store"),
        commit_hash: "deadbeef".to_string(),
        files_added: Vec::new(),
        files_changed: Vec::new(),
        files_deleted,
    }
}

fn code_parsing_output(graphs: Vec<NormalizedGraph>) -> TaskOutput {
    TaskOutput::CodeParsing {
        files_processed: graphs.len() as u64,
        symbols_extracted: 0,
        parsing_results: graphs,
        languages_stats: HashMap::new(),
    }
}

async fn populate_upstream(context: &JobContext, git_sync: TaskOutput, code_parsing: Option<TaskOutput>) {
    let defaults = TaskDefaults::default();
    let resolver = TaskConfigResolver::new(&defaults);
    let overrides = TaskOverrides::new();
    let progress = ProgressSink::default();

    run_task(
        &FixedUpstream {
            name: TaskName::GitSync,
            output: git_sync,
        },
        context,
        &overrides,
        &resolver,
        &progress,
    )
    .await;

    if let Some(output) = code_parsing {
        run_task(
            &FixedUpstream {
                name: TaskName::CodeParsing,
                output,
            },
            context,
            &overrides,
            &resolver,
            &progress,
        )
        .await;
    }
}

async fn run_graph_update(context: &JobContext, sink: Arc<dyn GraphSink>) -> TaskOutput {
    let defaults = TaskDefaults::default();
    let resolver = TaskConfigResolver::new(&defaults);
    let overrides = TaskOverrides::new();
    let progress = ProgressSink::default();
    let task = GraphUpdateTask::new(sink);

    match run_task(&task, context, &overrides, &resolver, &progress).await.outcome {
        codegraph_indexer::task::TaskOutcome::Succeeded(output) => output,
        other => panic!("expected GRAPH_UPDATE to succeed, got {other:?}"),
    }
}

fn single_class_parser_json() -> serde_json::Value {
    json!({
        "codebaseName": "demo",
        "files": [
            { "path": "src/Widget.java", "packageName": "com.acme" }
        ],
        "classes": [
            {
                "name": "Widget",
                "fullyQualifiedName": "com.acme.Widget",
                "filePath": "src/Widget.java",
                "packageName": "com.acme",
                "visibility": "public"
            }
        ],
        "methods": [
            {
                "name": "render",
                "className": "com.acme.Widget",
                "filePath": "src/Widget.java",
                "startLine": 10
            }
        ]
    })
}

#[tokio::test]
async fn full_index_then_reindex_is_idempotent() {
    let sink: Arc<dyn GraphSink> = Arc::new(RecordingGraphSink::new());
    let context = ctx("demo");

    let raw = single_class_parser_json();
    let graph = normalize::normalize("demo", SupportedLanguage::Java, &raw).expect("normalizes cleanly");

    populate_upstream(
        &context,
        git_sync_output(Vec::new()),
        Some(code_parsing_output(vec![graph.clone()])),
    )
    .await;

    let first = run_graph_update(&context, sink.clone()).await;
    match first {
        TaskOutput::GraphUpdate { nodes_created, relationships_created, .. } => {
            assert!(nodes_created > 0);
            assert!(relationships_created > 0);
        }
        other => panic!("unexpected output: {other:?}"),
    }

    // Re-running the same job (same ids) must not create anything new.
    let context2 = ctx("demo");
    populate_upstream(
        &context2,
        git_sync_output(Vec::new()),
        Some(code_parsing_output(vec![graph])),
    )
    .await;
    let second = run_graph_update(&context2, sink).await;
    match second {
        TaskOutput::GraphUpdate { nodes_created, nodes_updated, relationships_created, .. } => {
            assert_eq!(nodes_created, 0);
            assert_eq!(relationships_created, 0);
            // Same properties the second time round: nothing to re-set either.
            assert_eq!(nodes_updated, 0);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[tokio::test]
async fn deleting_a_file_removes_its_class_and_method() {
    let recording = Arc::new(RecordingGraphSink::new());
    let sink: Arc<dyn GraphSink> = recording.clone();
    let context = ctx("demo");

    let raw = single_class_parser_json();
    let graph = normalize::normalize("demo", SupportedLanguage::Java, &raw).unwrap();

    populate_upstream(
        &context,
        git_sync_output(Vec::new()),
        Some(code_parsing_output(vec![graph])),
    )
    .await;
    run_graph_update(&context, sink.clone()).await;

    assert!(recording.has_node("demo:class:com.acme.Widget"));
    assert!(recording.has_node("demo:file:src/Widget.java"));

    let delete_ctx = ctx("demo");
    populate_upstream(&delete_ctx, git_sync_output(vec!["src/Widget.java".to_string()]), None).await;
    let output = run_graph_update(&delete_ctx, sink).await;

    match output {
        TaskOutput::GraphUpdate { nodes_deleted, .. } => assert!(nodes_deleted >= 2),
        other => panic!("unexpected output: {other:?}"),
    }
    assert!(!recording.has_node("demo:file:src/Widget.java"));
    assert!(!recording.has_node("demo:class:com.acme.Widget"));
}

#[tokio::test]
async fn unrecognized_relationship_kind_is_dropped_but_the_rest_of_the_graph_persists() {
    let recording = Arc::new(RecordingGraphSink::new());
    let sink: Arc<dyn GraphSink> = recording.clone();
    let context = ctx("demo");

    let mut raw = single_class_parser_json();
    raw["relationships"] = json!([
        { "kind": "mixins", "source": "com.acme.Widget", "target": "com.acme.Other" }
    ]);
    let graph = normalize::normalize("demo", SupportedLanguage::Java, &raw).unwrap();
    // The unrecognized tag never becomes a relationship in the first place
    // (§4.6 "unknown kinds are dropped"), so nothing schema-invalid reaches
    // the sink at all.
    assert!(graph.relationships.iter().all(|r| r.kind != codegraph_indexer::normalize::RelationshipKind::UsesType));

    populate_upstream(
        &context,
        git_sync_output(Vec::new()),
        Some(code_parsing_output(vec![graph])),
    )
    .await;
    run_graph_update(&context, sink).await;

    assert!(recording.has_node("demo:class:com.acme.Widget"));
    assert_eq!(recording.nodes_of_type(NodeType::Class).len(), 1);
}

#[tokio::test]
async fn two_codebases_indexed_concurrently_keep_distinct_id_namespaces() {
    let sink: Arc<dyn GraphSink> = Arc::new(RecordingGraphSink::new());

    let alpha_ctx = ctx("alpha");
    let beta_ctx = ctx("beta");

    let alpha_graph = normalize::normalize("alpha", SupportedLanguage::Java, &single_class_parser_json()).unwrap();
    let beta_graph = normalize::normalize("beta", SupportedLanguage::Java, &single_class_parser_json()).unwrap();

    populate_upstream(&alpha_ctx, git_sync_output(Vec::new()), Some(code_parsing_output(vec![alpha_graph]))).await;
    populate_upstream(&beta_ctx, git_sync_output(Vec::new()), Some(code_parsing_output(vec![beta_graph]))).await;

    let (alpha_result, beta_result) =
        tokio::join!(run_graph_update(&alpha_ctx, sink.clone()), run_graph_update(&beta_ctx, sink.clone()));

    for output in [alpha_result, beta_result] {
        match output {
            TaskOutput::GraphUpdate { nodes_created, .. } => assert!(nodes_created > 0),
            other => panic!("unexpected output: {other:?}"),
        }
    }
}
