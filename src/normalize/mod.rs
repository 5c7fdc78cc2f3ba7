//! The parser normalizer (§4.6): maps heterogeneous parser JSON onto the
//! canonical node/relationship schema.

mod common;
pub mod java;
pub mod parser_json;
pub mod schema;
pub mod typescript;

pub use schema::NodeType;
pub use schema::NormalizedGraph;
pub use schema::Relationship;
pub use schema::RelationshipKind;
pub use schema::SchemaNode;

use crate::container::SupportedLanguage;
use crate::error::IndexerError;
use crate::error::Result;
use parser_json::RawParserOutput;

/// Normalize one container invocation's raw JSON into the canonical graph,
/// dispatching to the language-appropriate field-name mapping (§4.6: "Two
/// normalizers exist ... they differ only in field names and must converge
/// on the canonical schema").
pub fn normalize(
    codebase: &str,
    language: SupportedLanguage,
    raw: &serde_json::Value,
) -> Result<NormalizedGraph> {
    let parsed: RawParserOutput = serde_json::from_value(raw.clone())
        .map_err(|e| IndexerError::Parse(format!("invalid parser output shape: {e}")))?;

    match language {
        SupportedLanguage::Java | SupportedLanguage::Kotlin | SupportedLanguage::Scala => {
            java::normalize(codebase, &parsed)
        }
        SupportedLanguage::TypeScript | SupportedLanguage::JavaScript => {
            typescript::normalize(codebase, &parsed)
        }
        SupportedLanguage::Python | SupportedLanguage::Go => {
            // These parsers emit the same field names as the Java-style
            // contract (§6 "Parser JSON shape"); no separate normalizer is
            // warranted until a parser disagrees.
            java::normalize(codebase, &parsed)
        }
    }
}
