//! The job orchestrator (§4.1): accepts `Submit` requests, runs each job's
//! fixed task pipeline through a bounded worker pool, persists job state,
//! and emits the progress events other components subscribe to.
//!
//! Intra-job parallelism is deliberately absent (§5 "within a job, tasks
//! are executed strictly sequentially"): the pipeline order is the single
//! fixed list from [`TaskName::PIPELINE_ORDER`], not a dependency graph to
//! schedule. What *is* concurrent is cross-job: a [`tokio::sync::Semaphore`]
//! bounds how many jobs run at once, and a per-codebase lock serializes
//! graph writes for the same codebase (§5 "at most one job writes to the
//! graph at a time") while letting different codebases proceed in parallel.

mod pipeline;

pub use pipeline::SubmitRequest;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use chrono::Utc;
use diesel::PgConnection;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::CodebaseCatalog;
use crate::catalog::CodebaseRecord;
use crate::config::Configuration;
use crate::config::TaskConfigResolver;
use crate::container::ParserRunner;
use crate::credentials::CredentialSource;
use crate::db::models::Job;
use crate::db::models::NewJob;
use crate::db::models::NewTaskResult;
use crate::db::models::TaskResult;
use crate::db::DbPool;
use crate::error::IndexerError;
use crate::error::Result;
use crate::git::GitClient;
use crate::graph::GraphSink;
use crate::storage::Storage;
use crate::task::run_task;
use crate::task::JobContext;
use crate::task::JobType;
use crate::task::Task;
use crate::task::TaskName;
use crate::task::TaskOutcome;
use crate::task::TaskOutput;
use crate::tasks::CleanupTask;
use crate::tasks::CodeParsingTask;
use crate::tasks::GitSyncTask;
use crate::tasks::GraphUpdateTask;
use crate::util::progress::ProgressSink;

/// Everything a running job needs, owned by [`Orchestrator`] and shared
/// (by `Arc`) with the background task each `submit` call spawns.
pub struct Orchestrator {
    config: Arc<Configuration>,
    db_pool: DbPool,
    catalog: Arc<dyn CodebaseCatalog>,
    credentials: Arc<dyn CredentialSource>,
    container_driver: Arc<dyn ParserRunner>,
    graph_sink: Arc<dyn GraphSink>,
    storage: Storage,
    progress: ProgressSink,
    semaphore: Arc<Semaphore>,
    codebase_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    active: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Configuration>,
        db_pool: DbPool,
        catalog: Arc<dyn CodebaseCatalog>,
        credentials: Arc<dyn CredentialSource>,
        container_driver: Arc<dyn ParserRunner>,
        graph_sink: Arc<dyn GraphSink>,
        storage: Storage,
        progress: ProgressSink,
    ) -> Arc<Self> {
        let max_concurrent = *config.worker_pool().max_concurrent_jobs();
        Arc::new(Orchestrator {
            config,
            db_pool,
            catalog,
            credentials,
            container_driver,
            graph_sink,
            storage,
            progress,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            codebase_locks: StdMutex::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
        })
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }

    /// `Submit(codebaseRef, jobType, overrides?)` (§4.1): resolves the
    /// codebase, persists a `queued` job row, and hands the job to the
    /// worker pool. Returns immediately with the new job's id; the job
    /// itself runs on a spawned task.
    pub async fn submit(self: &Arc<Self>, req: SubmitRequest) -> Result<Uuid> {
        let record = self.catalog.resolve(&req.codebase_ref).await?;
        let job_id = Uuid::new_v4();

        let base_commit = req.base_commit.clone();
        let job_type = req.job_type;
        let codebase_id = record.id.clone();
        self.with_conn(move |conn| {
            Job::create(
                conn,
                &NewJob {
                    id: job_id,
                    codebase_id: &codebase_id,
                    job_type: job_type.as_str(),
                    state: "queued",
                    base_commit: base_commit.as_deref(),
                    created_at: Utc::now(),
                },
            )
        })
        .await?;

        let token = CancellationToken::new();
        self.active.write().await.insert(job_id, token.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_job(job_id, record, req, token).await;
        });

        Ok(job_id)
    }

    /// Signals cancellation to a running job (§4.1 "Cancellation is
    /// cooperative"). A job not currently tracked as active (already
    /// finished, or never submitted here) is not an error — cancellation
    /// is advisory and idempotent.
    pub async fn cancel(&self, job_id: Uuid) -> Result<()> {
        if let Some(token) = self.active.read().await.get(&job_id) {
            token.cancel();
        }
        Ok(())
    }

    pub async fn status(&self, job_id: Uuid) -> Result<Job> {
        self.with_conn(move |conn| Job::find(conn, job_id)).await
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Job>> {
        self.with_conn(move |conn| Job::recent(conn, limit)).await
    }

    /// Runs `f` against a pooled connection on a blocking thread, so the
    /// diesel/r2d2 call never stalls the async runtime a job's container
    /// and graph I/O also rely on.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.db_pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| IndexerError::Config(format!("database pool exhausted: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| IndexerError::Config(format!("database task panicked: {e}")))?
    }

    /// The per-codebase async lock that serializes graph writes (§5
    /// "Ordering guarantees ... for a given codebase, at most one job
    /// writes to the graph at a time"). Lazily created and kept for the
    /// process lifetime; one entry per codebase ever submitted.
    fn lock_for(&self, codebase_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.codebase_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(codebase_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: Uuid,
        record: CodebaseRecord,
        req: SubmitRequest,
        token: CancellationToken,
    ) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!(job_id = %job_id, "worker pool semaphore closed, job abandoned");
                return;
            }
        };

        let codebase_lock = self.lock_for(&record.id);
        let _guard = codebase_lock.lock().await;

        if let Err(e) = self.run_job_inner(job_id, &record, &req, &token).await {
            tracing::error!(job_id = %job_id, error = %e, "job bookkeeping failed");
        }

        self.active.write().await.remove(&job_id);
    }

    async fn run_job_inner(
        &self,
        job_id: Uuid,
        record: &CodebaseRecord,
        req: &SubmitRequest,
        token: &CancellationToken,
    ) -> Result<()> {
        self.with_conn(move |conn| Job::mark_started(conn, job_id)).await?;

        let job_id_str = job_id.to_string();
        let working_dir = self.storage.temp_dir_for(&job_id_str).join("work");
        let codebase_storage_path = self.storage.codebase_dir(&record.id);
        let temp_dir = self.storage.temp_dir_for(&job_id_str);

        let mut ctx = JobContext::new(
            job_id,
            record.id.clone(),
            record.display_name.clone(),
            record.git_url.clone(),
            record.default_branch.clone(),
            req.job_type,
            req.base_commit.clone(),
            working_dir,
            codebase_storage_path,
            temp_dir,
        );
        ctx.cancellation = token.clone();

        let git_oauth_token = self.credentials.git_oauth_token(&record.id).await?;
        let git_config = self.config.git().with_oauth_token(git_oauth_token);

        let pipeline_tasks: Vec<Box<dyn Task>> = vec![
            Box::new(GitSyncTask::new(GitClient::new(git_config)?, self.storage.clone())),
            Box::new(CodeParsingTask::new(
                self.container_driver.clone(),
                self.config.container().clone(),
                *self.config.worker_pool().max_parallel_languages(),
            )),
            Box::new(GraphUpdateTask::new(self.graph_sink.clone())),
        ];
        let cleanup_task = CleanupTask::new(self.storage.clone());

        let resolver = TaskConfigResolver::new(self.config.tasks());
        let mut job_failed = false;
        let mut job_cancelled = false;
        let mut failure_code: Option<&'static str> = None;
        let mut failure_message: Option<String> = None;

        for task in &pipeline_tasks {
            if token.is_cancelled() {
                job_cancelled = true;
                break;
            }

            let started = Instant::now();
            let run = run_task(task.as_ref(), &ctx, &req.overrides, &resolver, &self.progress).await;
            let duration_ms = started.elapsed().as_millis() as i64;

            self.record_task_result(job_id, task.name(), &run.outcome, duration_ms, run.attempts as i32)
                .await?;

            if let TaskOutcome::Failed(e) = &run.outcome {
                job_failed = true;
                failure_code = Some(e.code());
                failure_message = Some(e.to_string());
                break;
            }
        }

        // CLEANUP always runs, success, failure, or cancellation (§4.1,
        // §4.8); its own failure is logged but never changes the job's
        // outcome.
        let cleanup_started = Instant::now();
        let cleanup_run = run_task(&cleanup_task, &ctx, &req.overrides, &resolver, &self.progress).await;
        let cleanup_duration_ms = cleanup_started.elapsed().as_millis() as i64;
        self.record_task_result(
            job_id,
            TaskName::Cleanup,
            &cleanup_run.outcome,
            cleanup_duration_ms,
            cleanup_run.attempts as i32,
        )
        .await?;

        let final_state = if job_cancelled {
            "cancelled"
        } else if job_failed {
            "failed"
        } else {
            "succeeded"
        };

        self.with_conn({
            let final_state = final_state.to_string();
            move |conn| {
                Job::mark_finished(conn, job_id, &final_state, failure_code, failure_message.as_deref())
            }
        })
        .await?;

        if final_state == "succeeded" {
            if let Some(TaskOutput::GitSync { commit_hash, .. }) = ctx.output_of(TaskName::GitSync) {
                self.catalog.record_indexed_commit(&record.id, &commit_hash).await?;
            }
        }

        Ok(())
    }

    async fn record_task_result(
        &self,
        job_id: Uuid,
        name: TaskName,
        outcome: &TaskOutcome,
        duration_ms: i64,
        retries_used: i32,
    ) -> Result<()> {
        let outcome_str = match outcome {
            TaskOutcome::Succeeded(_) => "succeeded",
            TaskOutcome::Skipped => "skipped",
            TaskOutcome::Failed(_) => "failed",
        };

        self.with_conn(move |conn| {
            TaskResult::record(
                conn,
                &NewTaskResult {
                    id: Uuid::new_v4(),
                    job_id,
                    task_name: name.as_str(),
                    outcome: outcome_str,
                    duration_ms,
                    retries_used,
                    created_at: Utc::now(),
                },
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A full `Orchestrator` needs a live database pool, Docker daemon, and
    // graph connection, none of which a unit test should depend on; the
    // per-codebase locking behavior is exercised directly against the same
    // map shape `lock_for` uses.
    #[tokio::test]
    async fn lock_for_returns_the_same_mutex_for_the_same_codebase() {
        let locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>> = StdMutex::new(HashMap::new());
        let get = |codebase: &str| {
            let mut guard = locks.lock().unwrap();
            guard
                .entry(codebase.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let a = get("cb1");
        let b = get("cb1");
        let c = get("cb2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        // Concurrent acquisition of the same codebase lock serializes.
        let shared = get("cb1");
        let guard = shared.lock().await;
        assert!(shared.try_lock().is_err());
        drop(guard);
    }

    #[test]
    fn submit_request_builder_sets_optional_fields() {
        let req = SubmitRequest::new("cb1", JobType::Incremental).with_base_commit("abc123");
        assert_eq!(req.codebase_ref, "cb1");
        assert_eq!(req.base_commit.as_deref(), Some("abc123"));
        assert_eq!(req.job_type, JobType::Incremental);
    }
}
