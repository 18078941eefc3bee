use crate::application::ports::photo_compressor::{
    CompressedPhoto, CompressionOptions, PhotoCompressor,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

const QUALITY_STEP: u8 = 10;
const SCALE_STEP: f32 = 0.8;
const MIN_EDGE: u32 = 16;

#[derive(thiserror::Error, Debug)]
pub enum CompressionError {
    #[error("failed to decode photo: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode photo: {0}")]
    Encode(#[source] image::ImageError),
    #[error("invalid compression options: {0}")]
    InvalidOptions(&'static str),
}

impl From<CompressionError> for AppError {
    fn from(err: CompressionError) -> Self {
        AppError::Media(err.to_string())
    }
}

/// 長辺を抑えて JPEG に再エンコードし、品質→解像度の順に落としてサイズ上限に収める
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCompressor;

impl ImageCompressor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhotoCompressor for ImageCompressor {
    async fn compress(
        &self,
        input: Vec<u8>,
        options: CompressionOptions,
    ) -> Result<CompressedPhoto, AppError> {
        let photo =
            tokio::task::spawn_blocking(move || compress_blocking(&input, options)).await??;
        Ok(photo)
    }
}

fn compress_blocking(
    input: &[u8],
    options: CompressionOptions,
) -> Result<CompressedPhoto, CompressionError> {
    if options.max_bytes == 0 {
        return Err(CompressionError::InvalidOptions("max_bytes must be positive"));
    }
    if options.max_dimension == 0 {
        return Err(CompressionError::InvalidOptions(
            "max_dimension must be positive",
        ));
    }

    let decoded = image::load_from_memory(input).map_err(CompressionError::Decode)?;
    // JPEG はアルファを持てない
    let mut image = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let (width, height) = image.dimensions();
    if width.max(height) > options.max_dimension {
        image = image.resize(
            options.max_dimension,
            options.max_dimension,
            FilterType::Lanczos3,
        );
    }

    let floor = options.min_quality.clamp(1, 100);
    let mut quality = options.initial_quality.clamp(floor, 100);

    loop {
        let bytes = encode_jpeg(&image, quality)?;
        let (width, height) = image.dimensions();

        if bytes.len() <= options.max_bytes {
            debug!(
                target: "offline::photos",
                width,
                height,
                quality,
                bytes = bytes.len(),
                "photo compressed"
            );
            return Ok(CompressedPhoto {
                bytes,
                content_type: JPEG_CONTENT_TYPE.to_string(),
                width,
                height,
            });
        }

        if quality > floor {
            quality = quality.saturating_sub(QUALITY_STEP).max(floor);
            continue;
        }

        if width <= MIN_EDGE && height <= MIN_EDGE {
            // これ以上縮められないので上限超過のまま返す
            return Ok(CompressedPhoto {
                bytes,
                content_type: JPEG_CONTENT_TYPE.to_string(),
                width,
                height,
            });
        }

        let next_width = ((width as f32 * SCALE_STEP) as u32).max(MIN_EDGE.min(width));
        let next_height = ((height as f32 * SCALE_STEP) as u32).max(MIN_EDGE.min(height));
        image = image.resize_exact(next_width, next_height, FilterType::Triangle);
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CompressionError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(CompressionError::Encode)?;
    Ok(buffer)
}
