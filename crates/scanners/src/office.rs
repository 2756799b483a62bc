//! Macro and embedded object indicators for office containers.

use crate::{OfficeScanner, OfficeVerdict, ScannerError};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

const MACRO_STORAGES: &[&str] = &["macros", "_vba_project_cur", "vba"];
const ENCRYPTION_STREAMS: &[&str] = &["encryptedpackage", "encryptioninfo", "\u{6}dataspaces"];
const SWF_SIGNATURES: &[&[u8]] = &[b"FWS", b"CWS", b"ZWS"];
/// Streams larger than this are not searched for embedded flash.
const MAX_STREAM_SCAN: u64 = 16 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOfficeScanner;

impl OfficeScanner for NativeOfficeScanner {
    fn scan_ole(&self, path: &Path) -> OfficeVerdict {
        let mut comp = match cfb::open(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("not an OLE container {:?}: {}", path, e);
                return OfficeVerdict::unparsable();
            }
        };
        let mut verdict = OfficeVerdict {
            parsable: true,
            ..OfficeVerdict::default()
        };

        let mut streams: Vec<(PathBuf, u64)> = Vec::new();
        for entry in comp.walk() {
            let name = entry.name().to_lowercase();
            if MACRO_STORAGES.contains(&name.as_str()) {
                verdict.macro_present = true;
            }
            if name == "objectpool" {
                verdict.object_pool = true;
            }
            if ENCRYPTION_STREAMS.contains(&name.as_str()) {
                verdict.encrypted = true;
            }
            if entry.is_stream() {
                streams.push((entry.path().to_path_buf(), entry.len()));
            }
        }

        for (stream_path, len) in streams {
            if len > MAX_STREAM_SCAN {
                continue;
            }
            let mut data = Vec::with_capacity(len as usize);
            let read = comp
                .open_stream(&stream_path)
                .and_then(|mut s| s.read_to_end(&mut data));
            match read {
                Ok(_) => {
                    if contains_swf(&data) {
                        verdict.flash = true;
                    }
                }
                Err(e) => {
                    debug!("stream {:?} unreadable: {}", stream_path, e);
                    verdict.parsing_issues = true;
                }
            }
        }
        verdict
    }

    fn scan_ooxml(&self, path: &Path) -> OfficeVerdict {
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(_) => return OfficeVerdict::unparsable(),
        };
        let mut archive = match zip::ZipArchive::new(file) {
            Ok(a) => a,
            Err(e) => {
                debug!("invalid ooxml container {:?}: {}", path, e);
                return OfficeVerdict::unparsable();
            }
        };

        let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
        if !names.iter().any(|n| n == "[Content_Types].xml") {
            return OfficeVerdict::unparsable();
        }
        let mut verdict = OfficeVerdict {
            parsable: true,
            ..OfficeVerdict::default()
        };

        for name in &names {
            let lower = name.to_lowercase();
            if lower.ends_with("vbaproject.bin") || lower.ends_with("vbadata.xml") {
                verdict.macro_present = true;
            }
            if lower.contains("/activex/") {
                verdict.activex = true;
            }
            if lower.contains("/embeddings/") {
                let file_name = lower.rsplit('/').next().unwrap_or("");
                if file_name.starts_with("oleobject") {
                    verdict.embedded_objects = true;
                } else if !file_name.is_empty() {
                    verdict.embedded_packages = true;
                }
            }
        }

        let mut content_types = String::new();
        let read = archive
            .by_name("[Content_Types].xml")
            .map_err(|e| ScannerError::Parse(e.to_string()))
            .and_then(|mut f| {
                f.read_to_string(&mut content_types)
                    .map_err(ScannerError::from)
            });
        match read.and_then(|_| content_types_macro_enabled(&content_types)) {
            Ok(true) => verdict.macro_present = true,
            Ok(false) => {}
            Err(e) => {
                debug!("content types unreadable in {:?}: {}", path, e);
                verdict.parsing_issues = true;
            }
        }
        verdict
    }

    fn zip_entries(&self, path: &Path) -> Result<Vec<String>, ScannerError> {
        let file = fs::File::open(path)?;
        let archive =
            zip::ZipArchive::new(file).map_err(|e| ScannerError::Parse(e.to_string()))?;
        Ok(archive.file_names().map(|n| n.to_string()).collect())
    }
}

fn contains_swf(data: &[u8]) -> bool {
    data.windows(4).any(|w| {
        // Signature followed by a plausible SWF version byte.
        SWF_SIGNATURES.iter().any(|sig| &w[..3] == *sig) && (1..=50).contains(&w[3])
    })
}

fn content_types_macro_enabled(xml: &str) -> Result<bool, ScannerError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| ScannerError::Parse(e.to_string()))?;
                    if attr.key.as_ref() != b"ContentType" {
                        continue;
                    }
                    let value = attr
                        .unescape_value()
                        .map_err(|e| ScannerError::Parse(e.to_string()))?;
                    if value.to_lowercase().contains("macroenabled") {
                        return Ok(true);
                    }
                }
            }
            Ok(Event::Eof) => return Ok(false),
            Ok(_) => {}
            Err(e) => return Err(ScannerError::Parse(e.to_string())),
        }
    }
}
