//! Collaborator abstractions for file inspection: mimetype sniffing, office
//! and PDF structure scanning, metadata extraction, image transcoding and
//! archive unpacking.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod codec;
pub mod metadata;
pub mod office;
pub mod pdf;
pub mod sniffer;
pub mod unpack;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse failed: {0}")]
    Parse(String),
    #[error("decompression bomb: {0}")]
    DecompressionBomb(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Structural indicators reported for OLE and OOXML containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficeVerdict {
    pub parsable: bool,
    pub parsing_issues: bool,
    pub macro_present: bool,
    pub encrypted: bool,
    pub embedded_objects: bool,
    pub embedded_packages: bool,
    pub activex: bool,
    pub flash: bool,
    pub object_pool: bool,
}

impl OfficeVerdict {
    pub fn unparsable() -> Self {
        Self::default()
    }
}

/// Keyword counts found in a PDF body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfCounts {
    pub encrypt: usize,
    pub javascript: usize,
    pub openaction: usize,
    pub richmedia: usize,
    pub launch: usize,
    pub xfa: usize,
    pub objstm: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOutcome {
    /// Sidecar written with this many key/value lines.
    Written(usize),
    /// The file carried no metadata; no sidecar was written.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackOutcome {
    Success,
    Failed(Option<i32>),
    /// The container itself could not be opened or parsed.
    Unreadable(String),
    TimedOut(Duration),
    SpawnFailed(String),
}

impl UnpackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UnpackOutcome::Success)
    }
}

pub trait MimeSniffer: Send + Sync {
    /// Returns `main/sub`, or `None` when the content cannot be typed at all.
    fn sniff(&self, path: &Path) -> Option<String>;
}

pub trait OfficeScanner: Send + Sync {
    fn scan_ole(&self, path: &Path) -> OfficeVerdict;
    fn scan_ooxml(&self, path: &Path) -> OfficeVerdict;
    /// Lists entry names of a zip based container (OpenDocument).
    fn zip_entries(&self, path: &Path) -> Result<Vec<String>, ScannerError>;
}

pub trait PdfScanner: Send + Sync {
    fn scan(&self, path: &Path) -> Result<PdfCounts, ScannerError>;
}

pub trait MetadataExtractor: Send + Sync {
    fn extract(
        &self,
        path: &Path,
        mimetype: &str,
        sidecar: &Path,
    ) -> Result<MetadataOutcome, ScannerError>;
}

pub trait ImageCodec: Send + Sync {
    /// Decodes `src` and writes a freshly encoded copy of its pixels to `dst`.
    fn reencode(&self, src: &Path, dst: &Path) -> Result<(), ScannerError>;
}

pub trait Unpacker: Send + Sync {
    fn unpack(&self, archive: &Path, out_dir: &Path, timeout: Duration) -> UnpackOutcome;
}

/// The set of collaborators handed to the groomer.
#[derive(Clone)]
pub struct Scanners {
    pub sniffer: Arc<dyn MimeSniffer>,
    pub office: Arc<dyn OfficeScanner>,
    pub pdf: Arc<dyn PdfScanner>,
    pub metadata: Arc<dyn MetadataExtractor>,
    pub codec: Arc<dyn ImageCodec>,
    pub unpacker: Arc<dyn Unpacker>,
}

impl Scanners {
    /// In-process implementations for everything; archives go through the
    /// native zip unpacker.
    pub fn native(limits: codec::ImageLimits) -> Self {
        Self {
            sniffer: Arc::new(sniffer::MagicSniffer),
            office: Arc::new(office::NativeOfficeScanner),
            pdf: Arc::new(pdf::KeywordPdfScanner),
            metadata: Arc::new(metadata::NativeMetadataExtractor::new(limits.clone())),
            codec: Arc::new(codec::NativeImageCodec::new(limits)),
            unpacker: Arc::new(unpack::ZipUnpacker),
        }
    }

    pub fn with_sniffer(mut self, sniffer: Arc<dyn MimeSniffer>) -> Self {
        self.sniffer = sniffer;
        self
    }

    pub fn with_office(mut self, office: Arc<dyn OfficeScanner>) -> Self {
        self.office = office;
        self
    }

    pub fn with_pdf(mut self, pdf: Arc<dyn PdfScanner>) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataExtractor>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_unpacker(mut self, unpacker: Arc<dyn Unpacker>) -> Self {
        self.unpacker = unpacker;
        self
    }
}
