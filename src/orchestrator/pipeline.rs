//! The shape of one `Submit` request (§4.1), kept separate from
//! [`super::Orchestrator`] so the CLI can build one without reaching into
//! orchestrator internals.

use crate::config::TaskOverrides;
use crate::task::JobType;

/// `Submit(codebaseRef, jobType, baseCommit?, overrides?)` (§4.1, §10.4).
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub codebase_ref: String,
    pub job_type: JobType,
    pub base_commit: Option<String>,
    pub overrides: TaskOverrides,
}

impl SubmitRequest {
    pub fn new(codebase_ref: impl Into<String>, job_type: JobType) -> Self {
        SubmitRequest {
            codebase_ref: codebase_ref.into(),
            job_type,
            base_commit: None,
            overrides: TaskOverrides::new(),
        }
    }

    pub fn with_base_commit(mut self, base_commit: impl Into<String>) -> Self {
        self.base_commit = Some(base_commit.into());
        self
    }

    pub fn with_overrides(mut self, overrides: TaskOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}
