pub mod background;
pub mod connectivity;
pub mod http;
pub mod image;
pub mod offline;

pub use background::ChannelWake;
pub use connectivity::ConnectivityMonitor;
pub use http::ReqwestTransport;
pub use self::image::ImageCompressor;
pub use offline::{ConnectionPool, SqliteOfflineStore, SyncMetrics};
