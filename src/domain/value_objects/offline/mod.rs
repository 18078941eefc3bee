pub mod collection;
pub mod http_method;
pub mod mutation_id;
pub mod photo_id;
pub mod retry_policy;
pub mod wake_tag;

pub use collection::{CacheCollection, StoreCollection};
pub use http_method::{HttpMethod, MutationKind};
pub use mutation_id::MutationId;
pub use photo_id::PhotoId;
pub use retry_policy::{Backoff, RetryPolicy};
pub use wake_tag::WakeTag;
