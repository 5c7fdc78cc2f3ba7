//! The graph writer (§4.7): a bolt-protocol connection pool plus
//! idempotent, ordered batch writes, behind a `GraphSink` trait boundary so
//! `GRAPH_UPDATE` can be exercised against an in-memory recorder in tests
//! (§10.6 "fakes over mocks").

mod batch;
mod fake;
mod writer;

pub use fake::RecordingGraphSink;
pub use writer::DeleteStats;
pub use writer::GraphWriter;
pub use writer::WriteStats;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::normalize::NormalizedGraph;

/// The collaborator `GRAPH_UPDATE` depends on: write a normalized graph,
/// then delete the nodes for files a sync removed. Mirrors the
/// `ParserRunner` trait boundary in `container::driver` — a plain
/// `async_trait` with the real implementation and a recording fake, rather
/// than a mock framework.
#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn write_graph(&self, graph: &NormalizedGraph, cancellation: &CancellationToken) -> Result<WriteStats>;

    async fn delete_files(&self, codebase: &str, deleted_paths: &[String]) -> Result<DeleteStats>;
}

#[async_trait]
impl GraphSink for GraphWriter {
    async fn write_graph(&self, graph: &NormalizedGraph, cancellation: &CancellationToken) -> Result<WriteStats> {
        GraphWriter::write_graph(self, graph, cancellation).await
    }

    async fn delete_files(&self, codebase: &str, deleted_paths: &[String]) -> Result<DeleteStats> {
        GraphWriter::delete_files(self, codebase, deleted_paths).await
    }
}
