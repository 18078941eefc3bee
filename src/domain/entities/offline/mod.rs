pub mod dead_letter;
pub mod pending_photo;
pub mod queued_mutation;
pub mod sync_meta;
pub mod sync_result;
pub mod sync_status;

pub use dead_letter::{DeadLetter, DeadLetterEntry, MAX_RETRIES_EXCEEDED};
pub use pending_photo::{PendingPhoto, PhotoUploadRequest};
pub use queued_mutation::{MutationProcessed, MutationRequest, QueuedMutation};
pub use sync_meta::SyncMeta;
pub use sync_result::{
    DrainReport, PhotoSyncReport, RefreshReport, SYNC_IN_PROGRESS, SyncOutcome, SyncReport,
};
pub use sync_status::SyncStatus;
