//! Embedded metadata extraction (EXIF, PNG text chunks) into a sidecar file.

use crate::codec::ImageLimits;
use crate::{MetadataExtractor, MetadataOutcome, ScannerError};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, Write};
use std::path::Path;

/// Binary or very long tags that are not worth recording.
const SKIPPED_TAGS: &[&str] = &["JPEGThumbnail", "TIFFThumbnail", "MakerNote", "icc_profile"];

#[derive(Debug, Clone, Default)]
pub struct NativeMetadataExtractor {
    limits: ImageLimits,
}

impl NativeMetadataExtractor {
    pub fn new(limits: ImageLimits) -> Self {
        Self { limits }
    }

    fn png_text(&self, path: &Path) -> Result<BTreeMap<String, String>, ScannerError> {
        let file = fs::File::open(path)?;
        let decoder = png::Decoder::new_with_limits(
            BufReader::new(file),
            png::Limits {
                bytes: self.limits.max_alloc_bytes as usize,
            },
        );
        let reader = decoder.read_info().map_err(|e| match e {
            png::DecodingError::LimitsExceeded => {
                ScannerError::DecompressionBomb("png limits exceeded".into())
            }
            png::DecodingError::IoError(io) => ScannerError::Io(io),
            other => ScannerError::Parse(other.to_string()),
        })?;
        let info = reader.info();
        let pixels = info.width as u64 * info.height as u64;
        if info.width > self.limits.max_width
            || info.height > self.limits.max_height
            || pixels > self.limits.max_pixels()
        {
            return Err(ScannerError::DecompressionBomb(format!(
                "{}x{} exceeds image limits",
                info.width, info.height
            )));
        }

        let mut tags = BTreeMap::new();
        for chunk in &info.uncompressed_latin1_text {
            tags.insert(chunk.keyword.clone(), chunk.text.clone());
        }
        for chunk in &info.compressed_latin1_text {
            if let Ok(text) = chunk.get_text() {
                tags.insert(chunk.keyword.clone(), text);
            }
        }
        for chunk in &info.utf8_text {
            if let Ok(text) = chunk.get_text() {
                tags.insert(chunk.keyword.clone(), text);
            }
        }
        Ok(tags)
    }
}

impl MetadataExtractor for NativeMetadataExtractor {
    fn extract(
        &self,
        path: &Path,
        mimetype: &str,
        sidecar: &Path,
    ) -> Result<MetadataOutcome, ScannerError> {
        let mut tags = match mimetype {
            "image/jpeg" | "image/tiff" => exif_tags(path)?,
            // eXIf chunks are optional in PNG; text chunks are the main source.
            "image/png" => {
                let mut tags = exif_tags(path).unwrap_or_default();
                tags.extend(self.png_text(path)?);
                tags
            }
            other => return Err(ScannerError::Unsupported(other.to_string())),
        };
        tags.retain(|k, _| !SKIPPED_TAGS.contains(&k.as_str()));
        if tags.is_empty() {
            return Ok(MetadataOutcome::Empty);
        }

        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(sidecar)?;
        for (key, value) in &tags {
            writeln!(out, "Key: {}\tValue: {}", key, value)?;
        }
        Ok(MetadataOutcome::Written(tags.len()))
    }
}

fn exif_tags(path: &Path) -> Result<BTreeMap<String, String>, ScannerError> {
    let file = fs::File::open(path)?;
    let mut bufreader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(e) => e,
        Err(exif::Error::NotFound(_)) => return Ok(BTreeMap::new()),
        Err(exif::Error::Io(e)) => return Err(ScannerError::Io(e)),
        Err(e) => return Err(ScannerError::Parse(e.to_string())),
    };
    let mut tags = BTreeMap::new();
    for field in exif.fields() {
        tags.insert(
            format!("{}", field.tag),
            field.display_value().with_unit(&exif).to_string(),
        );
    }
    Ok(tags)
}
