//! The boundary to the external credential/configuration provider (§1, §6):
//! out of scope as a system, but `GIT_SYNC` needs a per-codebase OAuth
//! token and the graph writer needs its own bolt credentials at job start.
//! [`CredentialSource`] is that seam, mirrored on [`crate::catalog::CodebaseCatalog`].

use async_trait::async_trait;

use crate::error::Result;

/// Bolt-protocol credentials for the graph database (§4.7).
#[derive(Debug, Clone)]
pub struct GraphCredentials {
    pub user: String,
    pub password: String,
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// A per-codebase Git OAuth token, if one is configured (§4.3
    /// "Authentication"). `None` means the static configuration's token
    /// (or SSH via host Git configuration) applies instead.
    async fn git_oauth_token(&self, codebase_id: &str) -> Result<Option<String>>;

    async fn graph_credentials(&self) -> Result<GraphCredentials>;
}

/// Reads credentials straight out of the resolved [`crate::config::Configuration`],
/// suitable for single-binary operation where a real secrets provider
/// hasn't been wired in yet (§10.6 "Fakes over mocks").
pub struct StaticCredentialSource {
    git_oauth_token: Option<String>,
    graph: GraphCredentials,
}

impl StaticCredentialSource {
    pub fn new(git_oauth_token: Option<String>, graph_user: String, graph_password: String) -> Self {
        StaticCredentialSource {
            git_oauth_token,
            graph: GraphCredentials {
                user: graph_user,
                password: graph_password,
            },
        }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn git_oauth_token(&self, _codebase_id: &str) -> Result<Option<String>> {
        Ok(self.git_oauth_token.clone())
    }

    async fn graph_credentials(&self) -> Result<GraphCredentials> {
        Ok(self.graph.clone())
    }
}

/// Per-codebase tokens, for tests and for deployments where different
/// codebases authenticate with different Git hosts.
#[derive(Default)]
pub struct PerCodebaseCredentialSource {
    tokens: std::collections::HashMap<String, String>,
    graph: Option<GraphCredentials>,
}

impl PerCodebaseCredentialSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, codebase_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.tokens.insert(codebase_id.into(), token.into());
        self
    }

    pub fn with_graph_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.graph = Some(GraphCredentials {
            user: user.into(),
            password: password.into(),
        });
        self
    }
}

#[async_trait]
impl CredentialSource for PerCodebaseCredentialSource {
    async fn git_oauth_token(&self, codebase_id: &str) -> Result<Option<String>> {
        Ok(self.tokens.get(codebase_id).cloned())
    }

    async fn graph_credentials(&self) -> Result<GraphCredentials> {
        Ok(self.graph.clone().unwrap_or(GraphCredentials {
            user: String::new(),
            password: String::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn per_codebase_token_overrides_are_isolated() {
        let source = PerCodebaseCredentialSource::new()
            .with_token("cb1", "tok-a")
            .with_token("cb2", "tok-b");

        assert_eq!(source.git_oauth_token("cb1").await.unwrap().as_deref(), Some("tok-a"));
        assert_eq!(source.git_oauth_token("cb2").await.unwrap().as_deref(), Some("tok-b"));
        assert_eq!(source.git_oauth_token("cb3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn static_source_passes_through_configured_token() {
        let source = StaticCredentialSource::new(Some("tok".into()), "neo4j".into(), "pw".into());
        assert_eq!(source.git_oauth_token("anything").await.unwrap().as_deref(), Some("tok"));
        let creds = source.graph_credentials().await.unwrap();
        assert_eq!(creds.user, "neo4j");
    }
}
