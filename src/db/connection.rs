use diesel::r2d2::ConnectionManager;
use diesel::r2d2::Pool;
use diesel::PgConnection;

use crate::error::IndexerError;
use crate::error::Result;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Builds the bounded connection pool the orchestrator hands to every
/// worker (§10.5). Migrations are applied separately via `db migrate`
/// (§10.4), not implicitly on pool construction.
pub fn establish_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| IndexerError::Config(format!("failed to build database pool: {e}")))
}
