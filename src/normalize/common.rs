//! Shared graph-construction logic for the Java-style and TS-style
//! normalizers (§4.6). The two dialects agree on everything but a
//! handful of field names, already reconciled in [`super::parser_json`];
//! what is left here is identical between them, so both call through to
//! [`build`] rather than duplicating it.

use std::collections::HashMap;

use crate::error::Result;

use super::parser_json::RawParserOutput;
use super::schema::ids;
use super::schema::is_test_file;
use super::schema::normalize_visibility;
use super::schema::NodeType;
use super::schema::NormalizedGraph;
use super::schema::Relationship;
use super::schema::RelationshipKind;
use super::schema::SchemaNode;

pub fn build(codebase: &str, parsed: &RawParserOutput) -> Result<NormalizedGraph> {
    let mut graph = NormalizedGraph::default();

    let project_id = ids::project(codebase);
    graph.push_node(SchemaNode::new(project_id.clone(), NodeType::Project).with("name", codebase));

    let codebase_id = ids::codebase(codebase);
    graph.push_node(SchemaNode::new(codebase_id.clone(), NodeType::Codebase).with("name", codebase));
    graph.push_relationship(Relationship::new(
        RelationshipKind::HasCodebase,
        project_id,
        NodeType::Project,
        codebase_id.clone(),
        NodeType::Codebase,
    ));

    for file in &parsed.files {
        let file_id = ids::file(codebase, &file.path);
        graph.push_node(
            SchemaNode::new(file_id.clone(), NodeType::File)
                .with("path", file.path.clone())
                .with("filename", file.filename())
                .with("checksum", file.checksum.clone().unwrap_or_default())
                .with("lineCount", file.line_count.unwrap_or(0))
                .with("extension", file.extension())
                .with("packageName", file.package().to_string())
                .with("isTestFile", is_test_file(&file.path)),
        );
        graph.push_relationship(Relationship::new(
            RelationshipKind::ContainsFile,
            codebase_id.clone(),
            NodeType::Codebase,
            file_id,
            NodeType::File,
        ));
    }

    // fqn -> (id, NodeType) for relationship resolution below.
    let mut class_ids: HashMap<String, (String, NodeType)> = HashMap::new();
    // (kind, source fqn, target name) pulled from `extends`/`implements`
    // fields directly, resolved once every class/interface id is known.
    let mut direct_rels: Vec<(RelationshipKind, String, String)> = Vec::new();

    for class in &parsed.classes {
        push_class_like(&mut graph, codebase, class, NodeType::Class, "class");
        class_ids.insert(
            class.fqn(),
            (ids::class(codebase, &class.fqn()), NodeType::Class),
        );
        if let Some(parent) = &class.extends_name {
            direct_rels.push((RelationshipKind::Extends, class.fqn(), parent.clone()));
        }
        for iface_name in &class.implements {
            direct_rels.push((RelationshipKind::Implements, class.fqn(), iface_name.clone()));
        }
    }

    for iface in &parsed.interfaces {
        push_class_like(&mut graph, codebase, iface, NodeType::Interface, "interface");
        class_ids.insert(
            iface.fqn(),
            (ids::interface(codebase, &iface.fqn()), NodeType::Interface),
        );
        if let Some(parent) = &iface.extends_name {
            direct_rels.push((RelationshipKind::Extends, iface.fqn(), parent.clone()));
        }
    }

    for (kind, source, target) in direct_rels {
        if let (Some((s, st)), Some((t, tt))) = (class_ids.get(&source), class_ids.get(&target)) {
            graph.push_relationship(Relationship::new(kind, s.clone(), *st, t.clone(), *tt));
        }
    }

    // fqn#methodName -> method id, for `calls` resolution.
    let mut method_ids: HashMap<String, String> = HashMap::new();

    for method in &parsed.methods {
        let file_path = method.file_path.clone().unwrap_or_default();
        let start_line = method.start_line.unwrap_or(0);
        let method_id = ids::method(codebase, &file_path, &method.name, start_line);

        graph.push_node(
            SchemaNode::new(method_id.clone(), NodeType::Method)
                .with("name", method.name.clone())
                .with("filePath", file_path.clone())
                .with("startLine", start_line)
                .with("visibility", normalize_visibility(method.visibility.as_deref()))
                .with("annotations", method.annotations.clone()),
        );

        if !file_path.is_empty() {
            graph.push_relationship(Relationship::new(
                RelationshipKind::DefinesMethod,
                ids::file(codebase, &file_path),
                NodeType::File,
                method_id.clone(),
                NodeType::Method,
            ));
        }

        if let Some(class_name) = &method.class_name {
            if let Some((owner_id, owner_type)) = class_ids.get(class_name) {
                graph.push_relationship(Relationship::new(
                    RelationshipKind::HasMethod,
                    owner_id.clone(),
                    *owner_type,
                    method_id.clone(),
                    NodeType::Method,
                ));
            }
            method_ids.insert(format!("{class_name}#{}", method.name), method_id);
        }
    }

    for dep in &parsed.dependencies {
        let dep_id = ids::dependency(codebase, &dep.name, dep.version.as_deref());
        graph.push_node(
            SchemaNode::new(dep_id.clone(), NodeType::Dependency)
                .with("name", dep.name.clone())
                .with("version", dep.version.clone().unwrap_or_default())
                .with("scope", dep.scope.clone().unwrap_or_default()),
        );
        graph.push_relationship(Relationship::new(
            RelationshipKind::DependsOn,
            codebase_id.clone(),
            NodeType::Codebase,
            dep_id,
            NodeType::Dependency,
        ));
    }

    for endpoint in &parsed.api_endpoints {
        let endpoint_id = ids::api_endpoint(codebase, &endpoint.http_method, &endpoint.path);
        graph.push_node(
            SchemaNode::new(endpoint_id, NodeType::APIEndpoint)
                .with("httpMethod", endpoint.http_method.to_ascii_uppercase())
                .with("path", endpoint.path.clone())
                .with("requestSchema", endpoint.request_schema.clone().unwrap_or_default())
                .with("responseSchema", endpoint.response_schema.clone().unwrap_or_default()),
        );
    }

    for test in &parsed.test_cases {
        let file_path = test.file_path.clone().unwrap_or_default();
        let test_id = ids::test_case(codebase, &file_path, &test.name);
        graph.push_node(
            SchemaNode::new(test_id.clone(), NodeType::TestCase)
                .with("name", test.name.clone())
                .with("filePath", file_path),
        );

        if let Some(class_name) = &test.class_name {
            if let Some((owner_id, owner_type)) = class_ids.get(class_name) {
                graph.push_relationship(Relationship::new(
                    RelationshipKind::Tests,
                    test_id.clone(),
                    NodeType::TestCase,
                    owner_id.clone(),
                    *owner_type,
                ));
            }
            if let Some(method_name) = &test.method_name {
                if let Some(method_id) = method_ids.get(&format!("{class_name}#{method_name}")) {
                    graph.push_relationship(Relationship::new(
                        RelationshipKind::Tests,
                        test_id.clone(),
                        NodeType::TestCase,
                        method_id.clone(),
                        NodeType::Method,
                    ));
                }
            }
        }
    }

    for rel in &parsed.relationships {
        let Some(kind) = RelationshipKind::from_parser_tag(&rel.kind) else {
            tracing::debug!(kind = %rel.kind, "dropping relationship of unrecognized kind");
            continue;
        };

        let resolved = if kind == RelationshipKind::Calls {
            method_ids
                .get(&rel.source)
                .cloned()
                .zip(method_ids.get(&rel.target).cloned())
                .map(|(s, t)| (s, NodeType::Method, t, NodeType::Method))
        } else {
            class_ids
                .get(&rel.source)
                .cloned()
                .zip(class_ids.get(&rel.target).cloned())
                .map(|((s, st), (t, tt))| (s, st, t, tt))
        };

        let Some((start_id, start_type, end_id, end_type)) = resolved else {
            tracing::debug!(
                kind = %rel.kind,
                source = %rel.source,
                target = %rel.target,
                "dropping relationship whose endpoints could not be resolved"
            );
            continue;
        };

        graph.push_relationship(Relationship::new(kind, start_id, start_type, end_id, end_type));
    }

    graph.retain_schema_valid();
    Ok(graph)
}

fn push_class_like(
    graph: &mut NormalizedGraph,
    codebase: &str,
    class: &super::parser_json::RawClassLike,
    node_type: NodeType,
    entity_type: &str,
) {
    let fqn = class.fqn();
    let id = match node_type {
        NodeType::Interface => ids::interface(codebase, &fqn),
        _ => ids::class(codebase, &fqn),
    };

    graph.push_node(
        SchemaNode::new(id.clone(), node_type)
            .with("name", class.name.clone())
            .with("fullyQualifiedName", fqn)
            .with("packageName", class.package_name.clone().unwrap_or_default())
            .with("visibility", normalize_visibility(class.visibility.as_deref()))
            .with("annotations", class.annotations.clone()),
    );

    if let Some(file_path) = &class.file_path {
        let defines = Relationship::new(
            RelationshipKind::DefinesClass,
            ids::file(codebase, file_path),
            NodeType::File,
            id,
            node_type,
        );
        // `entityType` only distinguishes the interface case reusing
        // DEFINES_CLASS; the base class case carries no such property.
        let defines = if node_type == NodeType::Interface {
            defines.with("entityType", entity_type)
        } else {
            defines
        };
        graph.push_relationship(defines);
    }
}
