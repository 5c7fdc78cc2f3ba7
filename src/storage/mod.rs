//! Storage facade (§6 "Storage layout"): scoped filesystem operations with
//! per-file size/extension validation and a per-codebase quota.

use std::path::Path;
use std::path::PathBuf;

use crate::config::StorageConfig;
use crate::error::IndexerError;
use crate::error::Result;

/// Bytes accounted for so far against one codebase's quota (§10.7
/// "Storage quota accounting").
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaUsage {
    pub bytes_used: u64,
    pub quota_bytes: u64,
}

impl QuotaUsage {
    pub fn remaining(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.bytes_used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.bytes_used >= self.quota_bytes
    }
}

/// Scoped access to `storage/{codebases,temp,cache}` (§6). Every path
/// handed out is rooted under the configured storage root; callers never
/// construct paths by hand.
#[derive(Clone)]
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        Storage { config }
    }

    pub fn codebase_dir(&self, codebase_id: &str) -> PathBuf {
        self.config.codebases_dir().join(codebase_id)
    }

    pub fn temp_dir_for(&self, job_id: &str) -> PathBuf {
        self.config.temp_dir().join(job_id)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.config.cache_dir()
    }

    /// Validates one ingress file against the size limit and extension
    /// allow-list before it is written into codebase storage (§6).
    pub fn validate_ingress(&self, path: &Path, size_bytes: u64) -> Result<()> {
        if size_bytes > *self.config.max_file_size_bytes() {
            return Err(IndexerError::Validation(format!(
                "{} is {size_bytes} bytes, exceeding the {}-byte limit",
                path.display(),
                self.config.max_file_size_bytes()
            )));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.config.allowed_extensions().iter().any(|a| a == ext) {
            return Err(IndexerError::Validation(format!(
                "{} has extension '{ext}', which is not on the allow-list",
                path.display()
            )));
        }
        Ok(())
    }

    /// Sums the on-disk size of everything under a codebase's directory,
    /// compared against the configured per-codebase quota.
    pub fn quota_usage(&self, codebase_id: &str) -> Result<QuotaUsage> {
        let root = self.codebase_dir(codebase_id);
        let bytes_used = if root.exists() {
            directory_size(&root)?
        } else {
            0
        };
        Ok(QuotaUsage {
            bytes_used,
            quota_bytes: *self.config.quota_bytes_per_codebase(),
        })
    }

    /// Removes a temp directory and reports bytes freed, for `CLEANUP`
    /// (§4.8). Never touches codebase storage.
    pub fn remove_temp_dir(&self, path: &Path) -> Result<u64> {
        if !path.starts_with(self.config.temp_dir()) {
            return Err(IndexerError::Validation(format!(
                "refusing to remove {}: outside the temp directory",
                path.display()
            )));
        }
        if !path.exists() {
            return Ok(0);
        }
        let freed = directory_size(path)?;
        std::fs::remove_dir_all(path).map_err(IndexerError::Io)?;
        Ok(freed)
    }
}

fn directory_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> Storage {
        Storage::new(StorageConfig {
            root: PathBuf::from("/tmp/codegraph-test"),
            max_file_size_bytes: 1024,
            allowed_extensions: vec!["java".into(), "ts".into()],
            quota_bytes_per_codebase: 10_000,
        })
    }

    #[test]
    fn rejects_oversized_file() {
        let s = storage();
        let err = s.validate_ingress(Path::new("Big.java"), 2048).unwrap_err();
        assert_eq!(err.code(), "E_VALIDATION");
    }

    #[test]
    fn rejects_disallowed_extension() {
        let s = storage();
        let err = s.validate_ingress(Path::new("Evil.exe"), 10).unwrap_err();
        assert_eq!(err.code(), "E_VALIDATION");
    }

    #[test]
    fn accepts_well_formed_file() {
        let s = storage();
        assert!(s.validate_ingress(Path::new("Good.java"), 10).is_ok());
    }

    #[test]
    fn quota_usage_reports_remaining() {
        let usage = QuotaUsage {
            bytes_used: 4_000,
            quota_bytes: 10_000,
        };
        assert_eq!(usage.remaining(), 6_000);
        assert!(!usage.is_exhausted());
    }
}
