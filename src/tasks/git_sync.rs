//! `GIT_SYNC` (§4.3): synchronize the codebase's working copy and report
//! the set of files touched since the last indexed commit.

use async_trait::async_trait;

use crate::config::EffectiveTaskConfig;
use crate::error::IndexerError;
use crate::error::Result;
use crate::git::GitClient;
use crate::git::SyncOutcome;
use crate::storage::Storage;
use crate::task::JobContext;
use crate::task::JobType;
use crate::task::Task;
use crate::task::TaskName;
use crate::task::TaskOutput;

pub struct GitSyncTask {
    client: GitClient,
    storage: Storage,
}

impl GitSyncTask {
    pub fn new(client: GitClient, storage: Storage) -> Self {
        GitSyncTask { client, storage }
    }
}

#[async_trait]
impl Task for GitSyncTask {
    fn name(&self) -> TaskName {
        TaskName::GitSync
    }

    fn required_upstream(&self) -> &'static [TaskName] {
        &[]
    }

    async fn should_run(&self, _ctx: &JobContext) -> Result<bool> {
        Ok(true)
    }

    async fn validate(&self, ctx: &JobContext) -> Result<()> {
        if ctx.git_url.is_empty() {
            return Err(crate::error::IndexerError::Validation(
                "job context carries no git url".into(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext, config: EffectiveTaskConfig) -> Result<TaskOutput> {
        let storage_path = ctx.codebase_storage_path.clone();
        let is_full = ctx.job_type == JobType::Full || !self.client.has_existing_checkout(&storage_path);

        let mut outcome = if is_full {
            self.client
                .full_sync(&ctx.git_url, &ctx.branch, &storage_path, config.timeout)
                .await?
        } else {
            self.client
                .incremental_sync(
                    &ctx.branch,
                    &storage_path,
                    ctx.base_commit.as_deref(),
                    config.timeout,
                )
                .await?
        };

        enforce_ingress_limits(&self.storage, &storage_path, &mut outcome);

        let usage = self.storage.quota_usage(&ctx.codebase_id)?;
        if usage.is_exhausted() {
            return Err(IndexerError::Validation(format!(
                "codebase {} exceeded its {}-byte storage quota ({} bytes used)",
                ctx.codebase_id, usage.quota_bytes, usage.bytes_used
            )));
        }

        Ok(TaskOutput::GitSync {
            clone_path: outcome.clone_path,
            commit_hash: outcome.commit_hash,
            files_added: outcome.files_added,
            files_changed: outcome.files_changed,
            files_deleted: outcome.files_deleted,
        })
    }
}

/// Drops any added/changed file that fails the per-file size/extension
/// allow-list (§6 "enforced on ingress") from the sync outcome before
/// `CODE_PARSING` ever sees it, logging each rejection rather than
/// failing the whole sync over one oversized or disallowed file.
fn enforce_ingress_limits(storage: &Storage, storage_path: &std::path::Path, outcome: &mut SyncOutcome) {
    let reject = |storage: &Storage, path: &str| -> bool {
        let full_path = storage_path.join(path);
        let size = std::fs::metadata(&full_path).map(|m| m.len()).unwrap_or(0);
        if let Err(e) = storage.validate_ingress(std::path::Path::new(path), size) {
            tracing::warn!(path, error = %e, "dropping file that failed ingress validation");
            true
        } else {
            false
        }
    };

    outcome.files_added.retain(|p| !reject(storage, p));
    outcome.files_changed.retain(|p| !reject(storage, p));
}
