//! The error taxonomy shared by every component of the indexing pipeline.
//!
//! Each variant maps to one of the error kinds named in the design: the
//! orchestrator and the task framework match on [`IndexerError::kind`] to
//! decide fatality and retryability, while [`IndexerError::code`] is the
//! stable machine-readable identifier attached to job-failure records.

use thiserror::Error;

/// Coarse classification used by the orchestrator's retry/fatality policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Transport,
    Auth,
    Container,
    Parse,
    Schema,
    State,
    Timeout,
    Validation,
}

impl ErrorKind {
    /// Whether the task framework should retry an `Execute` that failed with
    /// this kind of error, budget permitting.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::Container | ErrorKind::Timeout
        )
    }
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("container error: {0}")]
    Container(String),

    #[error("parser output error: {0}")]
    Parse(String),

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("illegal state transition: {0}")]
    State(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("precondition failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Graph(#[from] neo4rs::Error),

    #[error(transparent)]
    Container2(#[from] bollard::errors::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] diesel::result::Error),
}

impl IndexerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexerError::Config(_) => ErrorKind::Config,
            IndexerError::Transport(_) | IndexerError::Graph(_) => ErrorKind::Transport,
            IndexerError::Auth(_) => ErrorKind::Auth,
            IndexerError::Container(_) | IndexerError::Container2(_) => ErrorKind::Container,
            IndexerError::Parse(_) | IndexerError::Json(_) => ErrorKind::Parse,
            IndexerError::Schema(_) => ErrorKind::Schema,
            IndexerError::State(_) => ErrorKind::State,
            IndexerError::Timeout(_) => ErrorKind::Timeout,
            IndexerError::Validation(_) => ErrorKind::Validation,
            IndexerError::Io(_) => ErrorKind::Validation,
            IndexerError::Db(_) => ErrorKind::Transport,
        }
    }

    /// Stable, machine-readable identifier surfaced on job-failure records.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Config => "E_CONFIG",
            ErrorKind::Transport => "E_TRANSPORT",
            ErrorKind::Auth => "E_AUTH",
            ErrorKind::Container => "E_CONTAINER",
            ErrorKind::Parse => "E_PARSE",
            ErrorKind::Schema => "E_SCHEMA",
            ErrorKind::State => "E_STATE",
            ErrorKind::Timeout => "E_TIMEOUT",
            ErrorKind::Validation => "E_VALIDATION",
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
