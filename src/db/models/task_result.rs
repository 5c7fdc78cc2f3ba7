use chrono::DateTime;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::db::schema::task_results;
use crate::error::IndexerError;
use crate::error::Result;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = task_results)]
pub struct TaskResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub task_name: String,
    pub outcome: String,
    pub duration_ms: i64,
    pub retries_used: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = task_results)]
pub struct NewTaskResult<'a> {
    pub id: Uuid,
    pub job_id: Uuid,
    pub task_name: &'a str,
    pub outcome: &'a str,
    pub duration_ms: i64,
    pub retries_used: i32,
    pub created_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn record(conn: &mut PgConnection, new_result: &NewTaskResult) -> Result<()> {
        diesel::insert_into(task_results::table)
            .values(new_result)
            .execute(conn)
            .map_err(IndexerError::Db)?;
        Ok(())
    }
}
