//! Graph writer (§4.7): connects to the graph database with a bounded
//! pool, ensures schema once, and writes a [`NormalizedGraph`] in ordered,
//! idempotent batches.

use neo4rs::query;
use neo4rs::Graph;
use tokio_util::sync::CancellationToken;

use crate::config::GraphConfig;
use crate::error::IndexerError;
use crate::error::Result;
use crate::normalize::NormalizedGraph;

use super::batch;

/// Outcome of one `write_graph` call, folded into `GRAPH_UPDATE`'s task
/// output (§3 "GRAPH_UPDATE").
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteStats {
    pub nodes_written: u64,
    pub nodes_updated: u64,
    pub relationships_written: u64,
    pub relationships_updated: u64,
}

/// Outcome of one `delete_files` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteStats {
    pub nodes_deleted: u64,
    pub relationships_deleted: u64,
}

/// Cheap to clone: `neo4rs::Graph` wraps its connection pool in an `Arc`,
/// so handing every job's `GRAPH_UPDATE` task its own [`GraphWriter`] value
/// shares one pool rather than opening a new one per job (§5 "Graph
/// connection pool: shared across jobs, bounded as above").
#[derive(Clone)]
pub struct GraphWriter {
    graph: Graph,
    batch_size: usize,
}

impl GraphWriter {
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo4rs_config = neo4rs::ConfigBuilder::default()
            .uri(config.uri())
            .user(config.user())
            .password(config.password())
            .max_connections(*config.max_connections())
            .fetch_size(500)
            .build()
            .map_err(|e| IndexerError::Config(format!("invalid graph configuration: {e}")))?;

        let graph = Graph::connect(neo4rs_config).await.map_err(IndexerError::Graph)?;

        Ok(GraphWriter {
            graph,
            batch_size: *config.batch_size(),
        })
    }

    /// Uniqueness constraints and indexes, applied once per database
    /// (§4.7 "On first use of a database, ensures the schema").
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT IF NOT EXISTS FOR (p:Project) REQUIRE p.projectId IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (c:Codebase) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (c:Class) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (m:Method) REQUIRE m.id IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (i:Interface) REQUIRE i.id IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (e:APIEndpoint) REQUIRE e.id IS UNIQUE",
            "CREATE INDEX IF NOT EXISTS FOR (f:File) ON (f.path)",
            "CREATE INDEX IF NOT EXISTS FOR (c:Class) ON (c.name)",
            "CREATE INDEX IF NOT EXISTS FOR (m:Method) ON (m.name)",
            "CREATE INDEX IF NOT EXISTS FOR (c:Class) ON (c.fullyQualifiedName)",
        ];

        for stmt in statements {
            self.graph.run(query(stmt)).await.map_err(IndexerError::Graph)?;
        }
        Ok(())
    }

    /// Writes one job's normalized graph: nodes first, relationships
    /// second, each in its own batch-sized transaction (§5 "Ordering
    /// guarantees"). A batch that fails rolls back entirely; the caller
    /// (`GRAPH_UPDATE`) is responsible for retrying within its budget.
    ///
    /// Counts come from each query's summary, not chunk length: a `MERGE`
    /// against an id that already exists only sets properties, so re-running
    /// the same graph must report zero `nodes_written`/`relationships_written`
    /// (§8 "Idempotence").
    pub async fn write_graph(&self, graph: &NormalizedGraph, cancellation: &CancellationToken) -> Result<WriteStats> {
        let mut stats = WriteStats::default();

        for chunk in batch::chunks(&graph.nodes, self.batch_size) {
            if cancellation.is_cancelled() {
                return Err(cancelled_error());
            }
            let txn = self.graph.start_txn().await.map_err(IndexerError::Graph)?;
            for node in chunk {
                let mut rows = txn
                    .execute(batch::upsert_node(node))
                    .await
                    .map_err(IndexerError::Graph)?;
                while rows.next().await.map_err(IndexerError::Graph)?.is_some() {}
                if let Some(summary) = rows.finish().await.map_err(IndexerError::Graph)? {
                    let node_stats = summary.stats();
                    let created = node_stats.nodes_created.max(0) as u64;
                    stats.nodes_written += created;
                    if created == 0 && node_stats.properties_set.max(0) > 0 {
                        stats.nodes_updated += 1;
                    }
                }
            }
            commit(txn, cancellation).await?;
        }

        for chunk in batch::chunks(&graph.relationships, self.batch_size) {
            if cancellation.is_cancelled() {
                return Err(cancelled_error());
            }
            let txn = self.graph.start_txn().await.map_err(IndexerError::Graph)?;
            for rel in chunk {
                let mut rows = txn
                    .execute(batch::upsert_relationship(rel))
                    .await
                    .map_err(IndexerError::Graph)?;
                while rows.next().await.map_err(IndexerError::Graph)?.is_some() {}
                if let Some(summary) = rows.finish().await.map_err(IndexerError::Graph)? {
                    let rel_stats = summary.stats();
                    let created = rel_stats.relationships_created.max(0) as u64;
                    stats.relationships_written += created;
                    if created == 0 && rel_stats.properties_set.max(0) > 0 {
                        stats.relationships_updated += 1;
                    }
                }
            }
            commit(txn, cancellation).await?;
        }

        Ok(stats)
    }

    /// Removes `File` nodes for `deleted_paths` together with any
    /// `Class`/`Method` nodes reachable only through `DEFINES_CLASS` /
    /// `DEFINES_METHOD` from those files, in one transaction per codebase
    /// (§4.7 "For deletes"). Runs last, after every node/relationship
    /// batch for the job (§5 "deletes-last").
    ///
    /// Both counts come from the query summary rather than a `RETURN`: the
    /// summary's `nodes_deleted` tallies the files and their dependent
    /// classes/methods together, and `relationships_deleted` is the only way
    /// to see the edges `DETACH DELETE` removed along with them.
    pub async fn delete_files(&self, codebase: &str, deleted_paths: &[String]) -> Result<DeleteStats> {
        if deleted_paths.is_empty() {
            return Ok(DeleteStats::default());
        }

        let file_ids: Vec<String> = deleted_paths
            .iter()
            .map(|p| crate::normalize::schema::ids::file(codebase, p))
            .collect();

        let txn = self.graph.start_txn().await.map_err(IndexerError::Graph)?;

        let mut rows = txn
            .execute(
                query(
                    "MATCH (f:File) WHERE f.id IN $ids \
                     OPTIONAL MATCH (f)-[:DEFINES_CLASS|DEFINES_METHOD]->(dependent) \
                     DETACH DELETE dependent, f",
                )
                .param("ids", file_ids),
            )
            .await
            .map_err(IndexerError::Graph)?;

        while rows.next().await.map_err(IndexerError::Graph)?.is_some() {}
        let summary = rows.finish().await.map_err(IndexerError::Graph)?;

        txn.commit().await.map_err(IndexerError::Graph)?;

        let (nodes_deleted, relationships_deleted) = summary
            .map(|s| {
                let stats = s.stats();
                (stats.nodes_deleted.max(0) as u64, stats.relationships_deleted.max(0) as u64)
            })
            .unwrap_or_default();

        Ok(DeleteStats {
            nodes_deleted,
            relationships_deleted,
        })
    }
}

/// Races a batch's commit against the job's cancellation signal, the other
/// network-round-trip suspension point inside `write_graph` (§5).
async fn commit(txn: neo4rs::Txn, cancellation: &CancellationToken) -> Result<()> {
    tokio::select! {
        result = txn.commit() => result.map_err(IndexerError::Graph),
        _ = cancellation.cancelled() => Err(cancelled_error()),
    }
}

fn cancelled_error() -> IndexerError {
    IndexerError::State("job cancelled while writing to the graph".into())
}
