//! Batch-sizing helper and the parameterized upsert query builders used by
//! [`super::writer::GraphWriter`] (§4.7 "ordered batches").

use neo4rs::query;
use neo4rs::Query;
use serde_json::Value;

use crate::normalize::Relationship;
use crate::normalize::SchemaNode;

/// Splits `items` into chunks no larger than `size` (the graph's
/// configured `batch_size`, default 100).
pub fn chunks<T>(items: &[T], size: usize) -> impl Iterator<Item = &[T]> {
    let size = size.max(1);
    items.chunks(size)
}

/// `MERGE (n:<Label> {id: $id}) SET n += $props` — match-or-create by id,
/// then overwrite properties. Idempotent by construction: re-running the
/// same node never creates a second copy or a new relationship.
pub fn upsert_node(node: &SchemaNode) -> Query {
    query(&format!(
        "MERGE (n:{label} {{id: $id}}) SET n += $props",
        label = node.node_type.label()
    ))
    .param("id", node.id.clone())
    .param("props", properties_to_value(&node.properties))
}

/// `MATCH` both endpoints by id, `MERGE` the typed edge between them, and
/// set/merge its properties. Endpoints are expected to already exist (a
/// prior node batch in the same job, or an earlier job).
pub fn upsert_relationship(rel: &Relationship) -> Query {
    query(&format!(
        "MATCH (a:{start_label} {{id: $start_id}}), (b:{end_label} {{id: $end_id}}) \
         MERGE (a)-[r:{kind}]->(b) SET r += $props",
        start_label = rel.start_type.label(),
        end_label = rel.end_type.label(),
        kind = rel.kind.label(),
    ))
    .param("start_id", rel.start_id.clone())
    .param("end_id", rel.end_id.clone())
    .param("props", properties_to_value(&rel.properties))
}

fn properties_to_value(props: &std::collections::BTreeMap<String, Value>) -> Value {
    Value::Object(props.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_never_exceed_configured_size() {
        let items: Vec<u32> = (0..250).collect();
        let parts: Vec<_> = chunks(&items, 100).collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 100);
        assert_eq!(parts[2].len(), 50);
    }

    #[test]
    fn zero_batch_size_still_makes_progress() {
        let items = vec![1, 2, 3];
        let parts: Vec<_> = chunks(&items, 0).collect();
        assert_eq!(parts.len(), 3);
    }
}
