//! The task framework (§4.2): a uniform capability contract plus a base
//! executor that wraps every task with timeout enforcement, retry
//! bookkeeping, duration measurement, and a write into the job context.
//!
//! Inheritance (an abstract base task with concrete subclasses) is
//! deliberately not how this is modeled (§9): each task is a discrete
//! value implementing [`Task`], and [`run_task`] is the one place the
//! uniform wrapping lives.

use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EffectiveTaskConfig;
use crate::config::TaskConfigResolver;
use crate::config::TaskOverrides;
use crate::error::IndexerError;
use crate::error::Result;
use crate::normalize::NormalizedGraph;
use crate::util::progress::Phase;
use crate::util::progress::ProgressEvent;
use crate::util::progress::ProgressSink;

/// The four pipeline tasks, in their fixed execution order (§2 "Control
/// flow").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskName {
    GitSync,
    CodeParsing,
    GraphUpdate,
    Cleanup,
}

impl TaskName {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskName::GitSync => "git_sync",
            TaskName::CodeParsing => "code_parsing",
            TaskName::GraphUpdate => "graph_update",
            TaskName::Cleanup => "cleanup",
        }
    }

    pub const PIPELINE_ORDER: [TaskName; 4] = [
        TaskName::GitSync,
        TaskName::CodeParsing,
        TaskName::GraphUpdate,
        TaskName::Cleanup,
    ];
}

impl Display for TaskName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `CODEBASE_FULL` vs `CODEBASE_INCR` (§3 "Job").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobType {
    Full,
    Incremental,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Full => "CODEBASE_FULL",
            JobType::Incremental => "CODEBASE_INCR",
        }
    }

    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "CODEBASE_FULL" => Some(JobType::Full),
            "CODEBASE_INCR" => Some(JobType::Incremental),
            _ => None,
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The contract between tasks (§3 "TaskOutput records"). Each variant
/// corresponds to exactly one [`TaskName`].
#[derive(Debug, Clone)]
pub enum TaskOutput {
    GitSync {
        clone_path: PathBuf,
        commit_hash: String,
        files_added: Vec<String>,
        files_changed: Vec<String>,
        files_deleted: Vec<String>,
    },
    CodeParsing {
        files_processed: u64,
        symbols_extracted: u64,
        parsing_results: Vec<NormalizedGraph>,
        languages_stats: HashMap<String, u64>,
    },
    GraphUpdate {
        nodes_created: u64,
        nodes_updated: u64,
        relationships_created: u64,
        nodes_deleted: u64,
        relationships_deleted: u64,
    },
    Cleanup {
        temp_files_removed: u64,
        disk_space_freed: u64,
    },
}

/// What [`run_task`] reports back to the orchestrator.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded(TaskOutput),
    Skipped,
    Failed(IndexerError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_) | TaskOutcome::Skipped)
    }
}

/// What [`run_task`] returns: the outcome plus how many retry attempts it
/// took, for the orchestrator's `task_results` bookkeeping (§10.5).
#[derive(Debug)]
pub struct TaskRun {
    pub outcome: TaskOutcome,
    pub attempts: u32,
}

/// Ephemeral per-job state threaded through every task (§3 "JobContext").
/// Only the owning task may mutate its own slot in `data`; this is
/// enforced by convention (`run_task` is the sole writer) rather than by
/// the type system, matching how the orchestrator is the sole owner of
/// job-record mutation.
pub struct JobContext {
    pub job_id: Uuid,
    pub codebase_id: String,
    pub codebase_name: String,
    pub git_url: String,
    pub branch: String,
    pub job_type: JobType,
    pub base_commit: Option<String>,
    pub working_dir: PathBuf,
    pub codebase_storage_path: PathBuf,
    pub temp_dir: PathBuf,
    pub cancellation: CancellationToken,
    data: RwLock<HashMap<TaskName, TaskOutput>>,
}

impl JobContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: Uuid,
        codebase_id: impl Into<String>,
        codebase_name: impl Into<String>,
        git_url: impl Into<String>,
        branch: impl Into<String>,
        job_type: JobType,
        base_commit: Option<String>,
        working_dir: PathBuf,
        codebase_storage_path: PathBuf,
        temp_dir: PathBuf,
    ) -> Self {
        JobContext {
            job_id,
            codebase_id: codebase_id.into(),
            codebase_name: codebase_name.into(),
            git_url: git_url.into(),
            branch: branch.into(),
            job_type,
            base_commit,
            working_dir,
            codebase_storage_path,
            temp_dir,
            cancellation: CancellationToken::new(),
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Read another task's output. Returns `None` if that task has not
    /// run yet or was skipped.
    pub fn output_of(&self, name: TaskName) -> Option<TaskOutput> {
        self.data
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&name)
            .cloned()
    }

    fn record_output(&self, name: TaskName, output: TaskOutput) {
        self.data
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(name, output);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Clone for TaskOutput {
    fn clone(&self) -> Self {
        match self {
            TaskOutput::GitSync {
                clone_path,
                commit_hash,
                files_added,
                files_changed,
                files_deleted,
            } => TaskOutput::GitSync {
                clone_path: clone_path.clone(),
                commit_hash: commit_hash.clone(),
                files_added: files_added.clone(),
                files_changed: files_changed.clone(),
                files_deleted: files_deleted.clone(),
            },
            TaskOutput::CodeParsing {
                files_processed,
                symbols_extracted,
                parsing_results,
                languages_stats,
            } => TaskOutput::CodeParsing {
                files_processed: *files_processed,
                symbols_extracted: *symbols_extracted,
                parsing_results: parsing_results.clone(),
                languages_stats: languages_stats.clone(),
            },
            TaskOutput::GraphUpdate {
                nodes_created,
                nodes_updated,
                relationships_created,
                nodes_deleted,
                relationships_deleted,
            } => TaskOutput::GraphUpdate {
                nodes_created: *nodes_created,
                nodes_updated: *nodes_updated,
                relationships_created: *relationships_created,
                nodes_deleted: *nodes_deleted,
                relationships_deleted: *relationships_deleted,
            },
            TaskOutput::Cleanup {
                temp_files_removed,
                disk_space_freed,
            } => TaskOutput::Cleanup {
                temp_files_removed: *temp_files_removed,
                disk_space_freed: *disk_space_freed,
            },
        }
    }
}

/// The uniform per-task capability contract (§4.2).
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> TaskName;

    /// Upstream tasks this task cannot run without.
    fn required_upstream(&self) -> &'static [TaskName];

    /// Upstream tasks this task reads if present, but tolerates missing.
    fn optional_upstream(&self) -> &'static [TaskName] {
        &[]
    }

    async fn should_run(&self, ctx: &JobContext) -> Result<bool>;

    async fn validate(&self, ctx: &JobContext) -> Result<()>;

    async fn execute(&self, ctx: &JobContext, config: EffectiveTaskConfig) -> Result<TaskOutput>;

    /// Always invoked after `Execute`, regardless of its outcome.
    /// Cleanup failure is logged but never changes the job's result.
    async fn cleanup(&self, ctx: &JobContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(30)
    }
}

const RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Runs one task through its full four-step contract, applying the base
/// wrapping described in §4.2: `GetConfig`, `ShouldRun` gate, `Validate`,
/// `Execute` under timeout with exponential-backoff retries, and a
/// `Cleanup` that always runs. On success the output is written into
/// `ctx.data[task.name()]`.
pub async fn run_task(
    task: &dyn Task,
    ctx: &JobContext,
    overrides: &TaskOverrides,
    resolver: &TaskConfigResolver<'_>,
    progress: &ProgressSink,
) -> TaskRun {
    let name = task.name();
    let config = resolver.resolve(name, overrides);

    let should_run = match task.should_run(ctx).await {
        Ok(v) => v,
        Err(e) => {
            return TaskRun {
                outcome: finish_with_cleanup(task, ctx, TaskOutcome::Failed(e), progress).await,
                attempts: 0,
            }
        }
    };

    if !should_run {
        progress.emit(ProgressEvent::new(
            ctx.job_id,
            name,
            Phase::Skipped,
            HashMap::new(),
        ));
        return TaskRun {
            outcome: finish_with_cleanup(task, ctx, TaskOutcome::Skipped, progress).await,
            attempts: 0,
        };
    }

    progress.emit(ProgressEvent::new(
        ctx.job_id,
        name,
        Phase::Started,
        HashMap::new(),
    ));

    if let Err(e) = task.validate(ctx).await {
        return TaskRun {
            outcome: finish_with_cleanup(task, ctx, TaskOutcome::Failed(e), progress).await,
            attempts: 0,
        };
    }

    let mut delay = RETRY_INITIAL_DELAY;
    let mut attempt = 0u32;
    let outcome = loop {
        if ctx.is_cancelled() {
            break TaskOutcome::Failed(IndexerError::State(format!(
                "job {} cancelled before {name} could complete",
                ctx.job_id
            )));
        }

        let attempt_result = tokio::time::timeout(config.timeout, task.execute(ctx, config))
            .await
            .map_err(|_| IndexerError::Timeout(format!("{name} exceeded {:?}", config.timeout)))
            .and_then(|inner| inner);

        match attempt_result {
            Ok(output) => break TaskOutcome::Succeeded(output),
            Err(e) if attempt < config.retries && e.is_retryable() => {
                tracing::warn!(task = %name, attempt, error = %e, "task execution failed, retrying");
                progress.emit(ProgressEvent::new(
                    ctx.job_id,
                    name,
                    Phase::Retrying { attempt: attempt + 1 },
                    HashMap::new(),
                ));
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(RETRY_MAX_DELAY);
                attempt += 1;
            }
            Err(e) => break TaskOutcome::Failed(e),
        }
    };

    if let TaskOutcome::Succeeded(ref output) = outcome {
        ctx.record_output(name, output.clone());
    }

    TaskRun {
        outcome: finish_with_cleanup(task, ctx, outcome, progress).await,
        attempts: attempt,
    }
}

async fn finish_with_cleanup(
    task: &dyn Task,
    ctx: &JobContext,
    outcome: TaskOutcome,
    progress: &ProgressSink,
) -> TaskOutcome {
    if let Err(e) = task.cleanup(ctx).await {
        tracing::warn!(task = %task.name(), error = %e, "task cleanup hook failed, job outcome unaffected");
    }

    let phase = match &outcome {
        TaskOutcome::Succeeded(_) => Phase::Succeeded,
        TaskOutcome::Skipped => Phase::Skipped,
        TaskOutcome::Failed(_) => Phase::Failed,
    };
    progress.emit(ProgressEvent::new(
        ctx.job_id,
        task.name(),
        phase,
        HashMap::new(),
    ));

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskDefaults;

    struct AlwaysSucceeds;

    #[async_trait]
    impl Task for AlwaysSucceeds {
        fn name(&self) -> TaskName {
            TaskName::Cleanup
        }

        fn required_upstream(&self) -> &'static [TaskName] {
            &[]
        }

        async fn should_run(&self, _ctx: &JobContext) -> Result<bool> {
            Ok(true)
        }

        async fn validate(&self, _ctx: &JobContext) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _ctx: &JobContext, _config: EffectiveTaskConfig) -> Result<TaskOutput> {
            Ok(TaskOutput::Cleanup {
                temp_files_removed: 3,
                disk_space_freed: 1024,
            })
        }
    }

    struct AlwaysTimesOut;

    #[async_trait]
    impl Task for AlwaysTimesOut {
        fn name(&self) -> TaskName {
            TaskName::GitSync
        }

        fn required_upstream(&self) -> &'static [TaskName] {
            &[]
        }

        async fn should_run(&self, _ctx: &JobContext) -> Result<bool> {
            Ok(true)
        }

        async fn validate(&self, _ctx: &JobContext) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _ctx: &JobContext, _config: EffectiveTaskConfig) -> Result<TaskOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            unreachable!("the timeout should fire first")
        }
    }

    fn sample_ctx() -> JobContext {
        JobContext::new(
            Uuid::new_v4(),
            "cb1",
            "demo",
            "https://example.invalid/demo.git",
            "main",
            JobType::Full,
            None,
            PathBuf::from("/tmp/work"),
            PathBuf::from("/tmp/store"),
            PathBuf::from("/tmp/tmp"),
        )
    }

    #[tokio::test]
    async fn successful_execute_writes_output_into_context() {
        let ctx = sample_ctx();
        let defaults = TaskDefaults::default();
        let resolver = TaskConfigResolver::new(&defaults);
        let overrides = TaskOverrides::new();
        let progress = ProgressSink::default();

        let run = run_task(&AlwaysSucceeds, &ctx, &overrides, &resolver, &progress).await;
        assert!(matches!(run.outcome, TaskOutcome::Succeeded(_)));
        assert!(matches!(
            ctx.output_of(TaskName::Cleanup),
            Some(TaskOutput::Cleanup { .. })
        ));
    }

    #[tokio::test]
    async fn timeout_is_reported_as_timeout_error() {
        let ctx = sample_ctx();
        let defaults = TaskDefaults::default();
        let resolver = TaskConfigResolver::new(&defaults);
        let overrides = TaskOverrides::new().with(
            TaskName::GitSync,
            crate::config::TaskSettings {
                timeout_secs: 0,
                retries: 0,
            },
        );
        let progress = ProgressSink::default();

        let run = run_task(&AlwaysTimesOut, &ctx, &overrides, &resolver, &progress).await;
        match run.outcome {
            TaskOutcome::Failed(e) => assert_eq!(e.kind(), crate::error::ErrorKind::Timeout),
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }
}
