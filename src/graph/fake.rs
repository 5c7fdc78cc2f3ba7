//! An in-memory [`GraphSink`] test double that records upserts instead of
//! talking to a real graph database, so the pipeline's idempotence and
//! incremental-delete invariants (§8) can be exercised without a Neo4j
//! instance (§10.6 "Fakes over mocks").

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::normalize::schema::ids;
use crate::normalize::NodeType;
use crate::normalize::NormalizedGraph;
use crate::normalize::RelationshipKind;
use crate::normalize::SchemaNode;

use super::DeleteStats;
use super::GraphSink;
use super::WriteStats;

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<String, SchemaNode>,
    // Keyed by (kind, start_id, end_id), the same identity `GraphWriter`'s
    // `MERGE` upsert uses, so re-writing an unchanged edge is a no-op here
    // too.
    relationships: HashMap<(RelationshipKind, String, String), (String, String)>,
}

/// Mirrors `GraphWriter`'s merge-by-id semantics (§4.7 "upserted by id
/// using merge-and-set") in memory. Cloning a `RecordingGraphSink` is not
/// supported; share it behind an `Arc` the way `GraphUpdateTask` expects.
#[derive(Default)]
pub struct RecordingGraphSink {
    state: Mutex<State>,
}

impl RecordingGraphSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .relationships
            .len()
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).nodes.contains_key(id)
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<SchemaNode> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .cloned()
            .collect()
    }

    pub fn has_node_with_file_path(&self, node_type: NodeType, file_path: &str) -> bool {
        self.nodes_of_type(node_type).iter().any(|n| {
            n.properties
                .get("filePath")
                .and_then(|v| v.as_str())
                .map(|p| p == file_path)
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl GraphSink for RecordingGraphSink {
    async fn write_graph(
        &self,
        graph: &NormalizedGraph,
        _cancellation: &tokio_util::sync::CancellationToken,
    ) -> Result<WriteStats> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut stats = WriteStats::default();

        for node in &graph.nodes {
            match state.nodes.insert(node.id.clone(), node.clone()) {
                None => stats.nodes_written += 1,
                Some(previous) if previous.properties != node.properties => stats.nodes_updated += 1,
                Some(_) => {}
            }
        }
        for rel in &graph.relationships {
            let key = (rel.kind, rel.start_id.clone(), rel.end_id.clone());
            match state
                .relationships
                .insert(key, (rel.start_id.clone(), rel.end_id.clone()))
            {
                None => stats.relationships_written += 1,
                Some(_) => stats.relationships_updated += 1,
            }
        }

        Ok(stats)
    }

    async fn delete_files(&self, codebase: &str, deleted_paths: &[String]) -> Result<DeleteStats> {
        if deleted_paths.is_empty() {
            return Ok(DeleteStats::default());
        }

        let file_ids: Vec<String> = deleted_paths.iter().map(|p| ids::file(codebase, p)).collect();

        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());

        // File nodes, plus anything reachable only through DEFINES_CLASS /
        // DEFINES_METHOD from them (§4.7 "For deletes").
        let mut to_remove: Vec<String> = file_ids.clone();
        for (kind, start_id, end_id) in state.relationships.keys() {
            if matches!(kind, RelationshipKind::DefinesClass | RelationshipKind::DefinesMethod)
                && file_ids.contains(start_id)
            {
                to_remove.push(end_id.clone());
            }
        }

        let mut removed = 0u64;
        for id in &to_remove {
            if state.nodes.remove(id).is_some() {
                removed += 1;
            }
        }
        let relationships_before = state.relationships.len();
        state
            .relationships
            .retain(|_, (s, e)| !to_remove.contains(s) && !to_remove.contains(e));
        let relationships_deleted = (relationships_before - state.relationships.len()) as u64;

        Ok(DeleteStats {
            nodes_deleted: removed,
            relationships_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Relationship;

    #[tokio::test]
    async fn rewriting_the_same_graph_creates_nothing_new() {
        let sink = RecordingGraphSink::new();
        let mut graph = NormalizedGraph::default();
        graph.push_node(SchemaNode::new("demo:file:a", NodeType::File));
        graph.push_node(SchemaNode::new("demo:class:A", NodeType::Class));
        graph.push_relationship(Relationship::new(
            RelationshipKind::DefinesClass,
            "demo:file:a",
            NodeType::File,
            "demo:class:A",
            NodeType::Class,
        ));

        let first = sink.write_graph(&graph, &tokio_util::sync::CancellationToken::new()).await.unwrap();
        assert_eq!(first.nodes_written, 2);
        assert_eq!(first.relationships_written, 1);

        let second = sink.write_graph(&graph, &tokio_util::sync::CancellationToken::new()).await.unwrap();
        assert_eq!(second.nodes_written, 0);
        assert_eq!(second.relationships_written, 0);
        assert_eq!(sink.node_count(), 2);
    }

    #[tokio::test]
    async fn deleting_a_file_removes_its_defined_class() {
        let sink = RecordingGraphSink::new();
        let mut graph = NormalizedGraph::default();
        graph.push_node(SchemaNode::new("demo:file:src/A.java", NodeType::File));
        graph.push_node(SchemaNode::new("demo:class:A", NodeType::Class));
        graph.push_relationship(Relationship::new(
            RelationshipKind::DefinesClass,
            "demo:file:src/A.java",
            NodeType::File,
            "demo:class:A",
            NodeType::Class,
        ));
        sink.write_graph(&graph, &tokio_util::sync::CancellationToken::new()).await.unwrap();

        let stats = sink
            .delete_files("demo", &["src/A.java".to_string()])
            .await
            .unwrap();
        assert_eq!(stats.nodes_deleted, 2);
        assert!(!sink.has_node("demo:file:src/A.java"));
        assert!(!sink.has_node("demo:class:A"));
    }
}
