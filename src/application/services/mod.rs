pub mod dead_letters;
pub mod mutation_queue;
pub mod offline_client;
pub mod photo_queue;
pub mod sync_service;
pub mod sync_status;

pub use dead_letters::DeadLetterBox;
pub use mutation_queue::{MutationQueue, ProcessOutcome};
pub use offline_client::{OfflineClient, OfflineResponse, QUEUED_FOR_SYNC};
pub use photo_queue::PhotoQueue;
pub use sync_service::{AuthProvider, DEFAULT_SYNC_INTERVAL, SyncService};
pub use sync_status::{StatusSubscription, SyncStatusStore};
