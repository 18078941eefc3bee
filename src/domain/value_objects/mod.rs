pub mod offline;

pub use offline::{
    Backoff, CacheCollection, HttpMethod, MutationId, MutationKind, PhotoId, RetryPolicy,
    StoreCollection, WakeTag,
};
