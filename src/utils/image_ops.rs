//! Upload image normalization
//!
//! Pure CPU work: decoding, resizing, and re-encoding happen before the
//! write admission gate so only the actual database write queues on the
//! single writer.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::errors::AppError;

/// How an uploaded image is normalized before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// Center-crop and fill to `size`×`size`
    Square,
    /// Shrink to fit a `size`×`size` bounding box; smaller images pass through
    Fit,
    /// Keep the original bytes untouched
    Original,
    /// Resize both dimensions by `scale` percent
    Scale,
}

impl ProcessMode {
    pub fn parse(value: &str) -> Self {
        match value {
            "fit" => Self::Fit,
            "original" => Self::Original,
            "scale" => Self::Scale,
            _ => Self::Square,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    pub mode: ProcessMode,
    pub size: u32,
    pub scale: u32,
    pub quality: u8,
}

/// Sniffs the magic bytes of an upload and returns the format when it is
/// one of the accepted types.
pub fn sniff_supported_format(bytes: &[u8]) -> Option<ImageFormat> {
    match image::guess_format(bytes) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif)) => Some(format),
        _ => None,
    }
}

/// MIME type for a stored blob, derived from its magic bytes.
pub fn mime_for_bytes(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png")
}

/// Resizes and re-encodes a decoded upload according to `opts`.
///
/// Returns the encoded JPEG buffer plus the final dimensions. `Original`
/// mode never reaches this function; callers pass the raw bytes through.
pub fn process_image(
    img: &DynamicImage,
    opts: &ProcessOptions,
) -> Result<(Vec<u8>, u32, u32), AppError> {
    let resized = match opts.mode {
        ProcessMode::Square => img.resize_to_fill(opts.size, opts.size, FilterType::Lanczos3),
        ProcessMode::Fit => {
            if img.width() > opts.size || img.height() > opts.size {
                img.resize(opts.size, opts.size, FilterType::Lanczos3)
            } else {
                img.clone()
            }
        }
        ProcessMode::Scale => {
            if opts.scale == 0 || opts.scale >= 100 {
                img.clone()
            } else {
                let width = (img.width() * opts.scale / 100).max(1);
                let height = (img.height() * opts.scale / 100).max(1);
                img.resize_exact(width, height, FilterType::Lanczos3)
            }
        }
        ProcessMode::Original => img.clone(),
    };

    let (width, height) = (resized.width(), resized.height());
    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
        std::io::Cursor::new(&mut buf),
        opts.quality,
    );
    resized
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| AppError::processing(e.to_string()))?;

    Ok((buf, width, height))
}

/// Reads dimensions and format from an image header without a full decode.
pub fn decode_header(bytes: &[u8]) -> Result<(u32, u32, ImageFormat), AppError> {
    let reader = image::ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::processing(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| AppError::processing("unrecognized image format"))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| AppError::processing(e.to_string()))?;
    Ok((width, height, format))
}
