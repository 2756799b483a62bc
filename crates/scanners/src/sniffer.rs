//! Content based mimetype detection. The extension is never consulted.

use crate::MimeSniffer;
use std::fs;
use std::io::Read;
use std::path::Path;

const SNIFF_BYTES: usize = 8192;

#[derive(Debug, Default, Clone, Copy)]
pub struct MagicSniffer;

impl MimeSniffer for MagicSniffer {
    fn sniff(&self, path: &Path) -> Option<String> {
        let meta = fs::symlink_metadata(path).ok()?;
        if meta.file_type().is_symlink() {
            return Some("inode/symlink".to_string());
        }
        if meta.is_dir() {
            return Some("inode/directory".to_string());
        }
        if meta.len() == 0 {
            return Some("inode/x-empty".to_string());
        }

        let mut file = fs::File::open(path).ok()?;
        let mut buf = vec![0u8; SNIFF_BYTES];
        let n = read_up_to(&mut file, &mut buf).ok()?;
        Some(sniff_bytes(&buf[..n]))
    }
}

/// Classifies the leading bytes of a file.
pub fn sniff_bytes(head: &[u8]) -> String {
    if head.is_empty() {
        return "inode/x-empty".to_string();
    }
    if let Some(kind) = infer::get(head) {
        return normalize(kind.mime_type()).to_string();
    }
    if looks_like_text(head) {
        let trimmed = trim_text_start(head);
        if trimmed.starts_with(b"<?xml") {
            return "text/xml".to_string();
        }
        if trimmed.starts_with(b"{\\rtf") {
            return "text/rtf".to_string();
        }
        return "text/plain".to_string();
    }
    "application/octet-stream".to_string()
}

fn normalize(mime: &'static str) -> &'static str {
    match mime {
        "application/vnd.microsoft.portable-executable" => "application/x-dosexec",
        "application/rtf" => "text/rtf",
        other => other,
    }
}

fn read_up_to(file: &mut fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn trim_text_start(head: &[u8]) -> &[u8] {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    &head[start..]
}

fn looks_like_text(head: &[u8]) -> bool {
    let text = match std::str::from_utf8(head) {
        Ok(t) => t,
        // A multi-byte sequence cut by the sniff window is still text.
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => {
            match std::str::from_utf8(&head[..e.valid_up_to()]) {
                Ok(t) => t,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c' | '\x1b'))
}
