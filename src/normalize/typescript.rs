//! Normalizer for the TypeScript/JavaScript parser, which emits
//! `moduleName` where the JVM-family parser emits `packageName` (§4.6);
//! [`super::parser_json::RawFile::package`] and
//! [`super::parser_json::RawClassLike::fqn`] already reconcile the two, so
//! the graph-construction logic below is identical to [`super::java`].

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
            "files": [{"path": "src/components/Widget.tsx", "moduleName": "components", "lineCount": 88}],
            "classes": [{"name": "Widget", "moduleName": "components", "filePath": "src/components/Widget.tsx", "visibility": "exported"}],
            "apiEndpoints": [{"httpMethod": "get", "path": "/widgets"}]
        }))
        .unwrap()
    }

    #[test]
    fn resolves_package_from_module_name() {
        let graph = normalize("demo", &sample()).unwrap();
        let file = graph
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::File)
            .unwrap();
        assert_eq!(
            file.properties.get("packageName").unwrap(),
            &serde_json::json!("components")
        );
    }

    #[test]
    fn uppercases_http_method() {
        let graph = normalize("demo", &sample()).unwrap();
        let endpoint = graph
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::APIEndpoint)
            .unwrap();
        assert_eq!(
            endpoint.properties.get("httpMethod").unwrap(),
            &serde_json::json!("GET")
        );
    }

    #[test]
    fn unrecognized_visibility_defaults_empty() {
        let graph = normalize("demo", &sample()).unwrap();
        let class = graph
            .nodes
            .iter()
            .find(|n| n.node_type == NodeType::Class)
            .unwrap();
        assert_eq!(class.properties.get("visibility").unwrap(), &serde_json::json!(""));
    }
}
