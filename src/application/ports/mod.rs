pub mod deferred_wake;
pub mod http_transport;
pub mod offline_store;
pub mod photo_compressor;

pub use deferred_wake::{DeferredWake, WakeReceiver};
pub use http_transport::{HttpRequest, HttpResponse, HttpTransport, MultipartUpload};
pub use offline_store::{Collection, OfflineStore, StoreRecord};
pub use photo_compressor::{CompressedPhoto, CompressionOptions, PhotoCompressor};
