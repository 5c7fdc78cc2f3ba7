//! The container parser driver (§4.5): runs a parser as a one-shot,
//! read-only-mounted container and exfiltrates its JSON result.

mod driver;

pub use driver::ContainerParserDriver;
pub use driver::FakeParserRunner;
pub use driver::ParserInvocation;
pub use driver::ParserInvocationOutcome;
pub use driver::ParserRunner;

use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

/// The closed set of languages the container parser driver knows how to
/// dispatch (§4.4 "fixed extension-to-language map").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedLanguage {
    Java,
    Kotlin,
    Scala,
    TypeScript,
    JavaScript,
    Python,
    Go,
}

impl SupportedLanguage {
    /// The fixed extension-to-language map (§4.4). Extensions not listed
    /// here are not indexed by any language.
    pub fn from_extension(ext: &str) -> Option<SupportedLanguage> {
        match ext.to_ascii_lowercase().as_str() {
            "java" => Some(SupportedLanguage::Java),
            "kt" | "kts" => Some(SupportedLanguage::Kotlin),
            "scala" | "sc" => Some(SupportedLanguage::Scala),
            "ts" | "tsx" => Some(SupportedLanguage::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(SupportedLanguage::JavaScript),
            "py" => Some(SupportedLanguage::Python),
            "go" => Some(SupportedLanguage::Go),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SupportedLanguage::Java => "java",
            SupportedLanguage::Kotlin => "kotlin",
            SupportedLanguage::Scala => "scala",
            SupportedLanguage::TypeScript => "typescript",
            SupportedLanguage::JavaScript => "javascript",
            SupportedLanguage::Python => "python",
            SupportedLanguage::Go => "go",
        }
    }
}

impl Display for SupportedLanguage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_map_covers_every_configured_language() {
        assert_eq!(SupportedLanguage::from_extension("JAVA"), Some(SupportedLanguage::Java));
        assert_eq!(SupportedLanguage::from_extension("tsx"), Some(SupportedLanguage::TypeScript));
        assert_eq!(SupportedLanguage::from_extension("rs"), None);
    }
}
