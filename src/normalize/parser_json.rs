//! The tolerant raw shape of parser output (§6 "Parser JSON shape
//! (accepted)"). All arrays are optional; a parser that omits one simply
//! contributes nothing for that category.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParserOutput {
    #[serde(default)]
    pub metadata: Option<RawMetadata>,

    #[serde(default)]
    pub codebase_name: String,

    #[serde(default)]
    pub files: Vec<RawFile>,

    #[serde(default)]
    pub classes: Vec<RawClassLike>,

    #[serde(default)]
    pub interfaces: Vec<RawClassLike>,

    #[serde(default)]
    pub methods: Vec<RawMethod>,

    /// Accepted but not mapped into the canonical schema (§4.6 only
    /// guarantees File/Class/Interface/Method/Dependency/APIEndpoint/
    /// TestCase nodes).
    #[serde(default)]
    pub enums: Vec<Value>,

    #[serde(default)]
    pub fields: Vec<Value>,

    #[serde(default)]
    pub dependencies: Vec<RawDependency>,

    #[serde(default)]
    pub api_endpoints: Vec<RawApiEndpoint>,

    #[serde(default)]
    pub test_cases: Vec<RawTestCase>,

    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    #[serde(default)]
    pub parser_version: String,
    #[serde(default)]
    pub parse_time: String,
    #[serde(default)]
    pub parsing_duration_ms: u64,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub detected_frameworks: Vec<String>,
    #[serde(default)]
    pub statistics: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFile {
    pub path: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub line_count: Option<u64>,
    #[serde(default)]
    pub extension: Option<String>,
    /// Java-style dialect field.
    #[serde(default)]
    pub package_name: Option<String>,
    /// TS-style dialect field, same meaning as `package_name`.
    #[serde(default)]
    pub module_name: Option<String>,
}

impl RawFile {
    pub fn package(&self) -> &str {
        self.package_name
            .as_deref()
            .or(self.module_name.as_deref())
            .unwrap_or("")
    }

    pub fn filename(&self) -> String {
        self.filename.clone().unwrap_or_else(|| {
            self.path
                .rsplit('/')
                .next()
                .unwrap_or(&self.path)
                .to_string()
        })
    }

    pub fn extension(&self) -> String {
        self.extension.clone().unwrap_or_else(|| {
            self.path
                .rsplit('.')
                .next()
                .filter(|ext| *ext != self.path)
                .unwrap_or("")
                .to_string()
        })
    }
}

/// Shared shape for `classes[]` and `interfaces[]` entries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClassLike {
    pub name: String,
    #[serde(default)]
    pub fully_qualified_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(default, rename = "extends")]
    pub extends_name: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
}

impl RawClassLike {
    pub fn fqn(&self) -> String {
        self.fully_qualified_name.clone().unwrap_or_else(|| {
            let pkg = self
                .package_name
                .as_deref()
                .or(self.module_name.as_deref())
                .unwrap_or("");
            if pkg.is_empty() {
                self.name.clone()
            } else {
                format!("{pkg}.{}", self.name)
            }
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMethod {
    pub name: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub start_line: Option<i64>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDependency {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawApiEndpoint {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub request_schema: Option<String>,
    #[serde(default)]
    pub response_schema: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTestCase {
    pub name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub method_name: Option<String>,
}

/// One parser-emitted relationship. `source`/`target` are fully-qualified
/// class names, or `<classFqn>#<methodName>` for method-level endpoints
/// (only meaningful for `calls`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRelationship {
    pub kind: String,
    pub source: String,
    pub target: String,
}
