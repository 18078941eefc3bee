pub mod offline;

pub use offline::{
    DeadLetter, DeadLetterEntry, MutationProcessed, MutationRequest, PendingPhoto,
    PhotoUploadRequest, QueuedMutation, SyncMeta, SyncOutcome, SyncReport, SyncStatus,
};
