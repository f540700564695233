// ABOUTME: Library root for db-replicate
// ABOUTME: Count-based catch-up replication of missing rows from a source to a lagging target

pub mod config;
pub mod database;
pub mod error;
pub mod sync;
pub mod utils;
pub mod value;

pub use config::{Driver, SyncConfig};
pub use error::SyncError;
pub use sync::{RunSummary, SyncOptions};
