pub mod photo_compressor;

pub use photo_compressor::{CompressionError, ImageCompressor, JPEG_CONTENT_TYPE};
