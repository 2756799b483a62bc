#![allow(dead_code)]

use groomer_core::config::{GroomerConfig, IntegrityConfig, UnpackerKind};
use groomer_core::{GroomSummary, Groomer, MemoryAuditLog};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scanners::sniffer::MagicSniffer;
use scanners::unpack::ZipUnpacker;
use scanners::{MimeSniffer, Scanners};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use zip::write::FileOptions;

pub fn config() -> GroomerConfig {
    let mut cfg = GroomerConfig::default();
    cfg.integrity = IntegrityConfig::without_delay();
    cfg.archive.unpacker = UnpackerKind::Zip;
    cfg
}

pub fn native_scanners() -> Scanners {
    Scanners::native(Default::default()).with_unpacker(Arc::new(ZipUnpacker))
}

/// Fixed mimetypes per file name, content sniffing for everything else.
pub struct MapSniffer(pub HashMap<String, String>);

impl MapSniffer {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl MimeSniffer for MapSniffer {
    fn sniff(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        match self.0.get(&name) {
            Some(m) => Some(m.clone()),
            None => MagicSniffer.sniff(path),
        }
    }
}

pub fn groom_with(
    src: &Path,
    dst: &Path,
    cfg: GroomerConfig,
    scanners: Scanners,
) -> (GroomSummary, MemoryAuditLog) {
    let mut groomer = Groomer::new(src, dst, cfg, scanners, MemoryAuditLog::new())
        .unwrap()
        .with_rng(StdRng::seed_from_u64(7));
    let summary = groomer.run().unwrap();
    (summary, groomer.into_log())
}

pub fn groom(src: &Path, dst: &Path) -> (GroomSummary, MemoryAuditLog) {
    groom_with(src, dst, config(), native_scanners())
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    fs::write(path, zip_bytes(entries)).unwrap();
}
