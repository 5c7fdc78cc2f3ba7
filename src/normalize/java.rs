//! Normalizer for JVM-family parsers (Java, Kotlin, Scala), which emit
//! `packageName` on files and classes (§4.6).

use crate::error::Result;

use super::common;
use super::parser_json::RawParserOutput;
use super::schema::NormalizedGraph;

pub fn normalize(codebase: &str, parsed: &RawParserOutput) -> Result<NormalizedGraph> {
    common::build(codebase, parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::schema::NodeType;

    fn sample() -> RawParserOutput {
        serde_json::from_value(serde_json::json!({
            "codebaseName": "demo",
            "files": [{"path": "src/main/java/com/acme/Foo.java", "packageName": "com.acme", "lineCount": 42}],
            "classes": [{"name": "Foo", "fullyQualifiedName": "com.acme.Foo", "filePath": "src/main/java/com/acme/Foo.java", "visibility": "PUBLIC"}],
            "methods": [{"name": "bar", "className": "com.acme.Foo", "filePath": "src/main/java/com/acme/Foo.java", "startLine": 10}],
            "relationships": [{"kind": "calls", "source": "com.acme.Foo#bar", "target": "com.acme.Foo#bar"}]
        }))
        .unwrap()
    }

    #[test]
    fn builds_file_class_method_chain() {
        let graph = normalize("demo", &sample()).unwrap();
        assert!(graph
            .nodes
            .iter()
            .any(|n| n.node_type == NodeType::File && n.id == "demo:file:src/main/java/com/acme/Foo.java"));
        assert!(graph
            .nodes
            .iter()
            .any(|n| n.node_type == NodeType::Class && n.id == "demo:class:com.acme.Foo"));
        assert!(graph
            .nodes
            .iter()
            .any(|n| n.node_type == NodeType::Method));
    }

    #[test]
    fn lowercases_visibility() {
        let graph = normalize("demo", &sample()).unwrap();
        let class = graph
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::Class)
            .unwrap();
        assert_eq!(
            class.properties.get("visibility").unwrap(),
            &serde_json::json!("public")
        );
    }
}
