pub mod connection_pool;
pub mod metrics;
mod queries;
pub mod sqlite_store;

pub use connection_pool::ConnectionPool;
pub use metrics::{PassOutcome, PassTrigger, SyncMetrics, SyncMetricsSnapshot};
pub use sqlite_store::SqliteOfflineStore;
