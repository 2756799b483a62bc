//! PDF keyword counting in the spirit of pdfid: every name token in the raw
//! file is decoded (`#xx` escapes included) and tallied.

use crate::{PdfCounts, PdfScanner, ScannerError};
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordPdfScanner;

impl PdfScanner for KeywordPdfScanner {
    fn scan(&self, path: &Path) -> Result<PdfCounts, ScannerError> {
        let data = fs::read(path)?;
        if !data.windows(5).take(1024).any(|w| w == b"%PDF-") {
            return Err(ScannerError::Parse("missing %PDF- header".into()));
        }
        Ok(count_keywords(&data))
    }
}

pub fn count_keywords(data: &[u8]) -> PdfCounts {
    let mut counts = PdfCounts::default();
    let mut i = 0;
    while i < data.len() {
        if data[i] != b'/' {
            i += 1;
            continue;
        }
        let (name, next) = read_name(data, i + 1);
        match name.as_slice() {
            b"Encrypt" => counts.encrypt += 1,
            b"JS" | b"JavaScript" => counts.javascript += 1,
            b"AA" | b"OpenAction" => counts.openaction += 1,
            b"RichMedia" => counts.richmedia += 1,
            b"Launch" => counts.launch += 1,
            b"XFA" => counts.xfa += 1,
            b"ObjStm" => counts.objstm += 1,
            _ => {}
        }
        i = next;
    }
    counts
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace()
        || b == 0
        || matches!(b, b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%')
}

/// Reads a name starting at `start` (just after the slash) and returns it
/// decoded together with the index of the first byte after it.
fn read_name(data: &[u8], start: usize) -> (Vec<u8>, usize) {
    let mut name = Vec::new();
    let mut i = start;
    while i < data.len() && !is_delimiter(data[i]) {
        if data[i] == b'#' && i + 2 < data.len() {
            let hex = std::str::from_utf8(&data[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            if let Some(b) = hex {
                name.push(b);
                i += 3;
                continue;
            }
        }
        name.push(data[i]);
        i += 1;
    }
    (name, i)
}
