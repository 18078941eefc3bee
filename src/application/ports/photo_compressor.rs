use crate::shared::config::PhotoConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    pub max_bytes: usize,
    pub max_dimension: u32,
    pub initial_quality: u8,
    pub min_quality: u8,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
            max_dimension: 1920,
            initial_quality: 85,
            min_quality: 40,
        }
    }
}

impl From<&PhotoConfig> for CompressionOptions {
    fn from(config: &PhotoConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            max_dimension: config.max_dimension,
            initial_quality: config.initial_quality,
            min_quality: config.min_quality,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressedPhoto {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait PhotoCompressor: Send + Sync {
    async fn compress(
        &self,
        input: Vec<u8>,
        options: CompressionOptions,
    ) -> Result<CompressedPhoto, AppError>;
}
