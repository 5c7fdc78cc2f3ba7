//! The four concrete pipeline tasks (§4.3–§4.8), each a thin [`Task`]
//! wrapper around a focused component (git client, container driver,
//! normalizer, graph writer).

mod cleanup;
mod code_parsing;
mod git_sync;
mod graph_update;

pub use cleanup::CleanupTask;
pub use code_parsing::CodeParsingTask;
pub use git_sync::GitSyncTask;
pub use graph_update::GraphUpdateTask;
