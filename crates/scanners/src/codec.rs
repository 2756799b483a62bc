//! Image transcoding: decode to a pixel buffer, encode a fresh file.

use crate::{ImageCodec, ScannerError};
use image::io::{Limits, Reader as ImageReader};
use image::ImageError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_alloc_bytes: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_width: 16_384,
            max_height: 16_384,
            max_alloc_bytes: 512 * 1024 * 1024,
        }
    }
}

impl ImageLimits {
    pub fn max_pixels(&self) -> u64 {
        self.max_width as u64 * self.max_height as u64
    }

    fn to_image_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_width);
        limits.max_image_height = Some(self.max_height);
        limits.max_alloc = Some(self.max_alloc_bytes);
        limits
    }
}

#[derive(Debug, Clone, Default)]
pub struct NativeImageCodec {
    limits: ImageLimits,
}

impl NativeImageCodec {
    pub fn new(limits: ImageLimits) -> Self {
        Self { limits }
    }
}

impl ImageCodec for NativeImageCodec {
    fn reencode(&self, src: &Path, dst: &Path) -> Result<(), ScannerError> {
        let mut reader = ImageReader::open(src)?.with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| ScannerError::Unsupported("unrecognised image format".into()))?;
        reader.limits(self.limits.to_image_limits());
        let decoded = reader.decode().map_err(map_image_error)?;
        decoded
            .save_with_format(dst, format)
            .map_err(map_image_error)?;
        Ok(())
    }
}

fn map_image_error(err: ImageError) -> ScannerError {
    match err {
        ImageError::Limits(e) => ScannerError::DecompressionBomb(e.to_string()),
        ImageError::Unsupported(e) => ScannerError::Unsupported(e.to_string()),
        ImageError::IoError(e) => ScannerError::Io(e),
        other => ScannerError::Parse(other.to_string()),
    }
}
