//! `CLEANUP` (§4.8): remove the temp directory (and the working directory,
//! if distinct), never the codebase storage itself.

use async_trait::async_trait;

use crate::config::EffectiveTaskConfig;
use crate::error::Result;
use crate::storage::Storage;
use crate::task::JobContext;
use crate::task::Task;
use crate::task::TaskName;
use crate::task::TaskOutput;

pub struct CleanupTask {
    storage: Storage,
}

impl CleanupTask {
    pub fn new(storage: Storage) -> Self {
        CleanupTask { storage }
    }
}

#[async_trait]
impl Task for CleanupTask {
    fn name(&self) -> TaskName {
        TaskName::Cleanup
    }

    fn required_upstream(&self) -> &'static [TaskName] {
        &[]
    }

    async fn should_run(&self, _ctx: &JobContext) -> Result<bool> {
        // CLEANUP always runs, even after a cancelled or failed job
        // (§4.1 "CLEANUP always runs at job end").
        Ok(true)
    }

    async fn validate(&self, _ctx: &JobContext) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &JobContext, _config: EffectiveTaskConfig) -> Result<TaskOutput> {
        let mut freed = 0u64;
        let mut files_removed = 0u64;

        files_removed += count_files(&ctx.temp_dir);
        match self.storage.remove_temp_dir(&ctx.temp_dir) {
            Ok(bytes) => freed += bytes,
            Err(e) => tracing::warn!(error = %e, "cleanup failed to remove temp directory, non-fatal"),
        }

        if ctx.working_dir != ctx.temp_dir && ctx.working_dir != ctx.codebase_storage_path {
            files_removed += count_files(&ctx.working_dir);
            match self.storage.remove_temp_dir(&ctx.working_dir) {
                Ok(bytes) => freed += bytes,
                Err(e) => tracing::warn!(error = %e, "cleanup failed to remove working directory, non-fatal"),
            }
        }

        Ok(TaskOutput::Cleanup {
            temp_files_removed: files_removed,
            disk_space_freed: freed,
        })
    }
}

/// Counts regular files under `path`, walked before removal so
/// `temp_files_removed` reports actual files rather than directories
/// (§4.8 "TaskOutput records").
fn count_files(path: &std::path::Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count() as u64
}
