//! The canonical node/relationship schema (§3 "NormalizedGraph") and its id
//! derivation rules (§4.6 "Id derivation").

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

use lazy_static::lazy_static;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// The closed set of node types the graph writer and normalizer agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Project,
    Codebase,
    File,
    Class,
    Interface,
    Method,
    Annotation,
    APIEndpoint,
    TestCase,
    Dependency,
    Document,
    Chunk,
    KafkaTopic,
    UserFlow,
    Commit,
    Author,
}

impl NodeType {
    /// The lower_snake_case tag used inside node ids, e.g. `api_endpoint`.
    pub fn tag(self) -> &'static str {
        match self {
            NodeType::Project => "project",
            NodeType::Codebase => "codebase",
            NodeType::File => "file",
            NodeType::Class => "class",
            NodeType::Interface => "interface",
            NodeType::Method => "method",
            NodeType::Annotation => "annotation",
            NodeType::APIEndpoint => "api_endpoint",
            NodeType::TestCase => "test_case",
            NodeType::Dependency => "dependency",
            NodeType::Document => "document",
            NodeType::Chunk => "chunk",
            NodeType::KafkaTopic => "kafka_topic",
            NodeType::UserFlow => "user_flow",
            NodeType::Commit => "commit",
            NodeType::Author => "author",
        }
    }

    /// The graph database label, e.g. `APIEndpoint`.
    pub fn label(self) -> &'static str {
        match self {
            NodeType::Project => "Project",
            NodeType::Codebase => "Codebase",
            NodeType::File => "File",
            NodeType::Class => "Class",
            NodeType::Interface => "Interface",
            NodeType::Method => "Method",
            NodeType::Annotation => "Annotation",
            NodeType::APIEndpoint => "APIEndpoint",
            NodeType::TestCase => "TestCase",
            NodeType::Dependency => "Dependency",
            NodeType::Document => "Document",
            NodeType::Chunk => "Chunk",
            NodeType::KafkaTopic => "KafkaTopic",
            NodeType::UserFlow => "UserFlow",
            NodeType::Commit => "Commit",
            NodeType::Author => "Author",
        }
    }
}

impl Display for NodeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The closed set of relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipKind {
    HasCodebase,
    ContainsFile,
    DefinesClass,
    DefinesMethod,
    HasMethod,
    Calls,
    Implements,
    Extends,
    UsesType,
    AnnotatedWith,
    ImplementsEndpoint,
    Tests,
    DependsOn,
    DescribedIn,
    HasChunk,
    Documents,
    PublishesTo,
    SubscribesTo,
    Authored,
    ModifiedIn,
}

impl RelationshipKind {
    pub fn label(self) -> &'static str {
        match self {
            RelationshipKind::HasCodebase => "HAS_CODEBASE",
            RelationshipKind::ContainsFile => "CONTAINS_FILE",
            RelationshipKind::DefinesClass => "DEFINES_CLASS",
            RelationshipKind::DefinesMethod => "DEFINES_METHOD",
            RelationshipKind::HasMethod => "HAS_METHOD",
            RelationshipKind::Calls => "CALLS",
            RelationshipKind::Implements => "IMPLEMENTS",
            RelationshipKind::Extends => "EXTENDS",
            RelationshipKind::UsesType => "USES_TYPE",
            RelationshipKind::AnnotatedWith => "ANNOTATED_WITH",
            RelationshipKind::ImplementsEndpoint => "IMPLEMENTS_ENDPOINT",
            RelationshipKind::Tests => "TESTS",
            RelationshipKind::DependsOn => "DEPENDS_ON",
            RelationshipKind::DescribedIn => "DESCRIBED_IN",
            RelationshipKind::HasChunk => "HAS_CHUNK",
            RelationshipKind::Documents => "DOCUMENTS",
            RelationshipKind::PublishesTo => "PUBLISHES_TO",
            RelationshipKind::SubscribesTo => "SUBSCRIBES_TO",
            RelationshipKind::Authored => "AUTHORED",
            RelationshipKind::ModifiedIn => "MODIFIED_IN",
        }
    }

    /// Parse a parser-emitted relationship tag (lowercase, loosely worded)
    /// into a kind, per §4.6 "accepted kinds (extends, implements, calls,
    /// uses -> USES_TYPE); unknown kinds are dropped".
    pub fn from_parser_tag(tag: &str) -> Option<RelationshipKind> {
        match tag.to_ascii_lowercase().as_str() {
            "extends" => Some(RelationshipKind::Extends),
            "implements" => Some(RelationshipKind::Implements),
            "calls" => Some(RelationshipKind::Calls),
            "uses" => Some(RelationshipKind::UsesType),
            _ => None,
        }
    }
}

impl Display for RelationshipKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

lazy_static! {
    /// The allowed `(startNodeType, endNodeType)` pairs for each
    /// relationship kind (§3 invariant, §8 "Schema closure").
    pub static ref RELATIONSHIP_SCHEMA: Vec<(RelationshipKind, NodeType, NodeType)> = vec![
        (RelationshipKind::HasCodebase, NodeType::Project, NodeType::Codebase),
        (RelationshipKind::ContainsFile, NodeType::Codebase, NodeType::File),
        (RelationshipKind::DefinesClass, NodeType::File, NodeType::Class),
        (RelationshipKind::DefinesClass, NodeType::File, NodeType::Interface),
        (RelationshipKind::DefinesMethod, NodeType::File, NodeType::Method),
        (RelationshipKind::HasMethod, NodeType::Class, NodeType::Method),
        (RelationshipKind::HasMethod, NodeType::Interface, NodeType::Method),
        (RelationshipKind::Calls, NodeType::Method, NodeType::Method),
        (RelationshipKind::Implements, NodeType::Class, NodeType::Interface),
        (RelationshipKind::Extends, NodeType::Class, NodeType::Class),
        (RelationshipKind::Extends, NodeType::Interface, NodeType::Interface),
        (RelationshipKind::UsesType, NodeType::Method, NodeType::Class),
        (RelationshipKind::UsesType, NodeType::Class, NodeType::Class),
        (RelationshipKind::AnnotatedWith, NodeType::Class, NodeType::Annotation),
        (RelationshipKind::AnnotatedWith, NodeType::Method, NodeType::Annotation),
        (RelationshipKind::ImplementsEndpoint, NodeType::Method, NodeType::APIEndpoint),
        (RelationshipKind::Tests, NodeType::TestCase, NodeType::Class),
        (RelationshipKind::Tests, NodeType::TestCase, NodeType::Method),
        (RelationshipKind::DependsOn, NodeType::Codebase, NodeType::Dependency),
        (RelationshipKind::DescribedIn, NodeType::Class, NodeType::Document),
        (RelationshipKind::HasChunk, NodeType::Document, NodeType::Chunk),
        (RelationshipKind::Documents, NodeType::Document, NodeType::Class),
        (RelationshipKind::PublishesTo, NodeType::Class, NodeType::KafkaTopic),
        (RelationshipKind::SubscribesTo, NodeType::Class, NodeType::KafkaTopic),
        (RelationshipKind::Authored, NodeType::Author, NodeType::Commit),
        (RelationshipKind::ModifiedIn, NodeType::Commit, NodeType::File),
    ];
}

/// Whether `(kind, start, end)` is one of the accepted triples.
pub fn is_allowed(kind: RelationshipKind, start: NodeType, end: NodeType) -> bool {
    RELATIONSHIP_SCHEMA
        .iter()
        .any(|(k, s, e)| *k == kind && *s == start && *e == end)
}

/// A node in the canonical schema: globally unique id, type tag, property
/// bag. Property values are never `null` (§4.6 "Values policy").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub id: String,
    pub node_type: NodeType,
    pub properties: BTreeMap<String, Value>,
}

impl SchemaNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        SchemaNode {
            id: id.into(),
            node_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// A relationship in the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub start_id: String,
    pub end_id: String,
    pub start_type: NodeType,
    pub end_type: NodeType,
    pub properties: BTreeMap<String, Value>,
}

impl Relationship {
    pub fn new(
        kind: RelationshipKind,
        start_id: impl Into<String>,
        start_type: NodeType,
        end_id: impl Into<String>,
        end_type: NodeType,
    ) -> Self {
        Relationship {
            kind,
            start_id: start_id.into(),
            end_id: end_id.into(),
            start_type,
            end_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn is_schema_valid(&self) -> bool {
        is_allowed(self.kind, self.start_type, self.end_type)
    }
}

/// The canonical output of one normalizer invocation (§3 "NormalizedGraph").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedGraph {
    pub nodes: Vec<SchemaNode>,
    pub relationships: Vec<Relationship>,
}

impl NormalizedGraph {
    pub fn push_node(&mut self, node: SchemaNode) {
        self.nodes.push(node);
    }

    pub fn push_relationship(&mut self, rel: Relationship) {
        self.relationships.push(rel);
    }

    /// Merge another graph's nodes/relationships into this one (used when
    /// `CODE_PARSING` aggregates per-language results, §4.4).
    pub fn merge(&mut self, other: NormalizedGraph) {
        self.nodes.extend(other.nodes);
        self.relationships.extend(other.relationships);
    }

    /// Drop relationships whose `(startType, endType)` pair is not in
    /// [`RELATIONSHIP_SCHEMA`], logging each drop (§7 "SchemaError").
    pub fn retain_schema_valid(&mut self) -> usize {
        let before = self.relationships.len();
        self.relationships.retain(|r| {
            let ok = r.is_schema_valid();
            if !ok {
                tracing::warn!(
                    kind = %r.kind,
                    start_type = %r.start_type,
                    end_type = %r.end_type,
                    "dropping relationship outside the accepted (startType, endType) pair set"
                );
            }
            ok
        });
        before - self.relationships.len()
    }
}

/// Deterministic id helpers (§4.6 "Id derivation"). Pure string
/// construction — ids are strings, not pointers, so normalization never
/// creates an in-memory cycle (§9 "Cyclic references").
pub mod ids {
    pub fn project(codebase: &str) -> String {
        format!("{codebase}:project:{codebase}")
    }

    pub fn codebase(codebase: &str) -> String {
        format!("{codebase}:codebase:{codebase}")
    }

    pub fn file(codebase: &str, path: &str) -> String {
        format!("{codebase}:file:{path}")
    }

    pub fn class(codebase: &str, fqn: &str) -> String {
        format!("{codebase}:class:{fqn}")
    }

    pub fn interface(codebase: &str, fqn: &str) -> String {
        format!("{codebase}:interface:{fqn}")
    }

    pub fn method(codebase: &str, file_path: &str, name: &str, start_line: i64) -> String {
        format!("{codebase}:method:{file_path}:{name}:{start_line}")
    }

    pub fn dependency(codebase: &str, name: &str, version: Option<&str>) -> String {
        format!(
            "{codebase}:dependency:{name}:{}",
            version.unwrap_or("unknown")
        )
    }

    pub fn api_endpoint(codebase: &str, http_method: &str, path: &str) -> String {
        format!(
            "{codebase}:api_endpoint:{}:{path}",
            http_method.to_ascii_uppercase()
        )
    }

    pub fn test_case(codebase: &str, file_path: &str, name: &str) -> String {
        format!("{codebase}:test_case:{file_path}:{name}")
    }
}

/// Derive `isTestFile` from path patterns (§4.6).
pub fn is_test_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.contains(".test.")
        || lower.contains(".spec.")
        || lower.contains("__tests__/")
        || lower.contains("/test/")
        || lower.contains("/tests/")
        || lower.ends_with("test.java")
        || lower.ends_with("tests.java")
}

/// Lower-case a visibility string to the accepted closed set, defaulting
/// to an explicit empty string rather than `null` (§4.6 "Values policy").
pub fn normalize_visibility(raw: Option<&str>) -> String {
    match raw.map(|s| s.to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "public" | "private" | "protected" | "internal" | "package") => v,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_rejects_unlisted_pair() {
        assert!(!is_allowed(
            RelationshipKind::ContainsFile,
            NodeType::File,
            NodeType::Method
        ));
        assert!(is_allowed(
            RelationshipKind::ContainsFile,
            NodeType::Codebase,
            NodeType::File
        ));
    }

    #[test]
    fn retain_schema_valid_drops_and_counts() {
        let mut graph = NormalizedGraph::default();
        graph.push_relationship(Relationship::new(
            RelationshipKind::ContainsFile,
            "a",
            NodeType::File,
            "b",
            NodeType::Method,
        ));
        graph.push_relationship(Relationship::new(
            RelationshipKind::ContainsFile,
            "c",
            NodeType::Codebase,
            "d",
            NodeType::File,
        ));

        let dropped = graph.retain_schema_valid();
        assert_eq!(dropped, 1);
        assert_eq!(graph.relationships.len(), 1);
    }

    #[test]
    fn ids_are_deterministic() {
        assert_eq!(ids::file("demo", "src/A.java"), "demo:file:src/A.java");
        assert_eq!(
            ids::method("demo", "src/A.java", "x", 1),
            "demo:method:src/A.java:x:1"
        );
        assert_eq!(ids::project("demo"), "demo:project:demo");
    }

    #[test]
    fn test_file_patterns_detected() {
        assert!(is_test_file("src/Foo.test.ts"));
        assert!(is_test_file("src/__tests__/Foo.ts"));
        assert!(is_test_file("src/FooTest.java"));
        assert!(!is_test_file("src/Foo.java"));
    }
}
