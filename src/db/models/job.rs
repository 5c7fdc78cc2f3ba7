use chrono::DateTime;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::db::schema::jobs;
use crate::db::schema::jobs::dsl;
use crate::error::IndexerError;
use crate::error::Result;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub codebase_id: String,
    pub job_type: String,
    pub state: String,
    pub base_commit: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob<'a> {
    pub id: Uuid,
    pub codebase_id: &'a str,
    pub job_type: &'a str,
    pub state: &'a str,
    pub base_commit: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn create(conn: &mut PgConnection, new_job: &NewJob) -> Result<Job> {
        tracing::trace!(job_id = %new_job.id, "inserting job record");
        diesel::insert_into(jobs::table)
            .values(new_job)
            .execute(conn)
            .map_err(IndexerError::Db)?;

        dsl::jobs
            .filter(dsl::id.eq(new_job.id))
            .first::<Job>(conn)
            .map_err(IndexerError::Db)
    }

    pub fn find(conn: &mut PgConnection, job_id: Uuid) -> Result<Job> {
        dsl::jobs.filter(dsl::id.eq(job_id)).first::<Job>(conn).map_err(IndexerError::Db)
    }

    /// Job state only ever moves forward (§3 "Job" invariant): the caller
    /// (the orchestrator) is responsible for only calling this with a
    /// state that is reachable from the current one.
    pub fn transition_state(conn: &mut PgConnection, job_id: Uuid, new_state: &str) -> Result<Job> {
        diesel::update(dsl::jobs.filter(dsl::id.eq(job_id)))
            .set(dsl::state.eq(new_state))
            .execute(conn)
            .map_err(IndexerError::Db)?;
        Job::find(conn, job_id)
    }

    pub fn mark_started(conn: &mut PgConnection, job_id: Uuid) -> Result<Job> {
        diesel::update(dsl::jobs.filter(dsl::id.eq(job_id)))
            .set((dsl::state.eq("running"), dsl::started_at.eq(Some(Utc::now()))))
            .execute(conn)
            .map_err(IndexerError::Db)?;
        Job::find(conn, job_id)
    }

    /// Most recently created jobs first, for the `list` CLI subcommand
    /// (§10.4).
    pub fn recent(conn: &mut PgConnection, limit: i64) -> Result<Vec<Job>> {
        dsl::jobs
            .order(dsl::created_at.desc())
            .limit(limit)
            .load::<Job>(conn)
            .map_err(IndexerError::Db)
    }

    pub fn mark_finished(
        conn: &mut PgConnection,
        job_id: Uuid,
        final_state: &str,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Job> {
        diesel::update(dsl::jobs.filter(dsl::id.eq(job_id)))
            .set((
                dsl::state.eq(final_state),
                dsl::finished_at.eq(Some(Utc::now())),
                dsl::error_code.eq(error_code),
                dsl::error_message.eq(error_message),
            ))
            .execute(conn)
            .map_err(IndexerError::Db)?;
        Job::find(conn, job_id)
    }
}
