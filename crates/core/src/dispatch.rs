//! Per-type handlers selected from the record's mimetype.

use crate::fs_apply;
use crate::models::{FileRecord, SafetyState};
use crate::policy;
use scanners::{MetadataOutcome, ScannerError, Scanners};
use std::path::Path;
use tracing::{debug, warn};

const MIMES_RTF: &[&str] = &["rtf", "richtext"];
const MIMES_OOXML: &[&str] = &["vnd.openxmlformats-officedocument."];
const MIMES_CSV: &[&str] = &["csv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainType {
    Text,
    Audio,
    Image,
    Video,
    Application,
    Message,
    Model,
    Multipart,
    Inode,
    Example,
    Other,
}

impl MainType {
    pub fn parse(maintype: &str) -> Self {
        match maintype {
            "text" => MainType::Text,
            "audio" => MainType::Audio,
            "image" => MainType::Image,
            "video" => MainType::Video,
            "application" => MainType::Application,
            "message" => MainType::Message,
            "model" => MainType::Model,
            "multipart" => MainType::Multipart,
            "inode" => MainType::Inode,
            "example" => MainType::Example,
            _ => MainType::Other,
        }
    }
}

/// Families of `application/*` subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    Office,
    Ooxml,
    Rtf,
    LibreOffice,
    Pdf,
    Xml,
    Csv,
    Executable,
    Compressed,
    Binary,
    Audio,
}

// Order matters: the first entry with a substring of the subtype wins.
const APP_SUBTYPES: &[(&[&str], AppKind)] = &[
    (&["msword", "vnd.ms-"], AppKind::Office),
    (MIMES_OOXML, AppKind::Ooxml),
    (MIMES_RTF, AppKind::Rtf),
    (&["vnd.oasis.opendocument"], AppKind::LibreOffice),
    (&["pdf", "postscript"], AppKind::Pdf),
    (&["xml"], AppKind::Xml),
    (MIMES_CSV, AppKind::Csv),
    (&["dosexec", "msdos-program"], AppKind::Executable),
    (
        &[
            "zip", "rar", "x-rar", "bzip2", "lzip", "lzma", "lzop", "xz", "compress", "gzip",
            "tar",
        ],
        AppKind::Compressed,
    ),
    (&["octet-stream"], AppKind::Binary),
    (&["ogg"], AppKind::Audio),
];

pub fn app_kind(subtype: &str) -> Option<AppKind> {
    APP_SUBTYPES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| subtype.contains(n)))
        .map(|(_, kind)| *kind)
}

/// Handlers that only inspect and add danger reasons. They also run on
/// records an earlier validation step already marked dangerous.
fn inspects_only(main: MainType, app: Option<AppKind>) -> bool {
    match main {
        MainType::Message | MainType::Model => true,
        MainType::Application => matches!(
            app,
            None | Some(AppKind::Office)
                | Some(AppKind::Ooxml)
                | Some(AppKind::LibreOffice)
                | Some(AppKind::Pdf)
                | Some(AppKind::Executable)
        ),
        _ => false,
    }
}

/// Routes the record to its type handler. Handlers that rename, transcode
/// or skip the record only run while it is still `Normal`.
pub fn dispatch(record: &mut FileRecord, scanners: &Scanners, scratch_root: Option<&Path>) {
    let main = MainType::parse(record.maintype());
    let app = match main {
        MainType::Application => app_kind(record.subtype()),
        _ => None,
    };
    if record.state() != SafetyState::Normal && !inspects_only(main, app) {
        debug!(
            "{} already {}, skipping {:?} handler",
            record.filename,
            record.state(),
            main
        );
        return;
    }

    match main {
        MainType::Text => text(record, scanners),
        MainType::Audio => audio(record),
        MainType::Image => image(record, scanners, scratch_root),
        MainType::Video => video(record),
        MainType::Application => application(record, scanners, app),
        MainType::Message => record.make_dangerous("Message file - should not be found on USB key"),
        MainType::Model => record.make_dangerous("Model file - should not be found on USB key"),
        MainType::Multipart => {
            record.should_copy = false;
            record.add_description("Multipart file - usually found in web apps");
        }
        MainType::Inode => inode(record),
        MainType::Example => {
            record.should_copy = false;
            record.add_description("Example file");
        }
        MainType::Other => unknown(record),
    }
}

fn application(record: &mut FileRecord, scanners: &Scanners, app: Option<AppKind>) {
    match app {
        Some(AppKind::Office) => winoffice(record, scanners),
        Some(AppKind::Ooxml) => ooxml(record, scanners),
        Some(AppKind::Rtf) | Some(AppKind::Xml) | Some(AppKind::Csv) => text(record, scanners),
        Some(AppKind::LibreOffice) => libreoffice(record, scanners),
        Some(AppKind::Pdf) => pdf(record, scanners),
        Some(AppKind::Executable) => record.make_dangerous("Executable file"),
        Some(AppKind::Compressed) => {
            record.add_description("Archive");
            record.should_copy = false;
            record.is_archive = true;
        }
        Some(AppKind::Binary) => {
            record.add_description("Binary file");
            record.make_binary();
        }
        Some(AppKind::Audio) => audio(record),
        None => record.make_dangerous("Unknown application file"),
    }
}

fn text(record: &mut FileRecord, scanners: &Scanners) {
    let subtype = record.subtype().to_string();
    if MIMES_RTF.iter().any(|m| subtype.contains(m)) {
        record.add_description("Rich Text (rtf) file");
        record.force_ext("txt");
        return;
    }
    if MIMES_OOXML.iter().any(|m| subtype.contains(m)) {
        ooxml(record, scanners);
        return;
    }
    if MIMES_CSV.iter().any(|m| subtype.contains(m)) {
        record.add_description("CSV file");
        return;
    }
    record.add_description("Plain text file");
    record.force_ext("txt");
}

fn winoffice(record: &mut FileRecord, scanners: &Scanners) {
    let verdict = scanners.office.scan_ole(&record.src_path);
    if !verdict.parsable {
        record.make_dangerous("Unparsable WinOffice file");
    } else {
        if verdict.parsing_issues {
            record.make_dangerous("Parsing issues with WinOffice file");
        }
        if verdict.macro_present {
            record.make_dangerous("WinOffice file containing a macro");
        }
        if verdict.object_pool {
            record.make_dangerous("WinOffice file containing an object pool");
        }
        if verdict.flash {
            record.make_dangerous("WinOffice file with embedded flash");
        }
        if verdict.encrypted {
            record.make_dangerous("Encrypted WinOffice file");
        }
    }
    if !record.is_dangerous() {
        record.add_description("WinOffice file");
    }
}

fn ooxml(record: &mut FileRecord, scanners: &Scanners) {
    record.add_description("OOXML (openoffice) file");
    let verdict = scanners.office.scan_ooxml(&record.src_path);
    if !verdict.parsable {
        record.make_dangerous("Invalid ooxml file");
        return;
    }
    if verdict.macro_present {
        record.make_dangerous("Ooxml file containing macro");
    }
    if verdict.activex {
        record.make_dangerous("Ooxml file with activex");
    }
    if verdict.embedded_objects {
        record.make_dangerous("Ooxml file with embedded objects");
    }
    if verdict.embedded_packages {
        record.make_dangerous("Ooxml file with embedded packages");
    }
}

fn libreoffice(record: &mut FileRecord, scanners: &Scanners) {
    match scanners.office.zip_entries(&record.src_path) {
        Ok(names) => {
            let executable = names.iter().any(|name| {
                let lower = name.to_lowercase();
                lower.starts_with("script")
                    || lower.starts_with("basic")
                    || lower.starts_with("object")
                    || lower.ends_with(".bin")
            });
            if executable {
                record.make_dangerous("Libreoffice file containing executable code");
            }
        }
        Err(e) => {
            record.add_error("libreoffice", e.to_string());
            record.make_dangerous("Invalid libreoffice file");
        }
    }
    if !record.is_dangerous() {
        record.add_description("Libreoffice file");
    }
}

fn pdf(record: &mut FileRecord, scanners: &Scanners) {
    let counts = match scanners.pdf.scan(&record.src_path) {
        Ok(c) => c,
        Err(e) => {
            record.add_error("pdf", e.to_string());
            record.make_dangerous("Unreadable pdf file");
            return;
        }
    };
    if counts.encrypt > 0 {
        record.make_dangerous("Encrypted pdf");
    }
    if counts.javascript > 0 {
        record.make_dangerous("Pdf with embedded javascript");
    }
    if counts.openaction > 0 {
        record.make_dangerous("Pdf with openaction(s)");
    }
    if counts.richmedia > 0 {
        record.make_dangerous("Pdf containing flash");
    }
    if counts.launch > 0 {
        record.make_dangerous("Pdf with launch action(s)");
    }
    if counts.xfa > 0 {
        record.make_dangerous("Pdf with XFA structures");
    }
    if counts.objstm > 0 {
        record.make_dangerous("Pdf with ObjectStream structures");
    }
    if !record.is_dangerous() {
        record.add_description("Pdf file");
    }
}

fn audio(record: &mut FileRecord) {
    record.add_description("Audio file");
    record.add_description("Media file");
}

fn video(record: &mut FileRecord) {
    record.add_description("Video file");
    record.add_description("Media file");
}

fn inode(record: &mut FileRecord) {
    record.should_copy = false;
    match record.symlink_target.clone() {
        Some(target) => {
            record.add_description(format!("File is a symlink to {}", target.display()))
        }
        None => record.add_description("File is an inode (empty file)"),
    }
}

fn unknown(record: &mut FileRecord) {
    record.make_unknown();
    record.add_description("Unknown mimetype");
    record.should_copy = false;
}

fn image(record: &mut FileRecord, scanners: &Scanners, scratch_root: Option<&Path>) {
    let mimetype = record.mimetype.clone().unwrap_or_default();
    if policy::METADATA_MIMETYPES.contains(&mimetype.as_str()) {
        extract_metadata(record, scanners, &mimetype);
    }
    if record.is_dangerous() {
        return;
    }

    let scratch = match fs_apply::scratch_dir(scratch_root, "groomer-image-") {
        Ok(dir) => dir,
        Err(e) => {
            warn!("no scratch space for {}: {}", record.filename, e);
            record.add_error("scratch", e.to_string());
            record.add_description("Image file could not be transcoded");
            record.should_copy = false;
            return;
        }
    };

    let out = scratch.path().join(&record.filename);
    match scanners.codec.reencode(&record.src_path, &out) {
        Ok(()) => {
            debug!("re-encoded {} into {:?}", record.filename, out);
            record.src_path = out;
            record.scratch = Some(scratch);
            record.samples.clear();
            record.add_description("Image file");
        }
        Err(ScannerError::DecompressionBomb(msg)) => {
            record.add_error(
                "image",
                format!("possible decompression bomb in {}: {}", record.filename, msg),
            );
            record.make_dangerous("Image file containing decompression bomb");
        }
        Err(e) => {
            record.add_error(
                "image",
                format!("failed to translate {}: {}", record.filename, e),
            );
            record.make_dangerous("Unparsable image file");
        }
    }
}

fn extract_metadata(record: &mut FileRecord, scanners: &Scanners, mimetype: &str) {
    let Some(sidecar) = record.metadata_sidecar_path(".metadata.txt") else {
        return;
    };
    match scanners.metadata.extract(&record.src_path, mimetype, &sidecar) {
        Ok(MetadataOutcome::Written(n)) => {
            debug!("wrote {} metadata entries to {:?}", n, sidecar)
        }
        Ok(MetadataOutcome::Empty) => {}
        Err(ScannerError::DecompressionBomb(msg)) => {
            record.add_error(
                "metadata",
                format!("exception processing metadata for {}: {}", record.filename, msg),
            );
            record.make_dangerous("exception processing metadata");
        }
        Err(e) => {
            record.add_error(
                "metadata",
                format!("failed to get metadata for {}: {}", record.filename, e),
            );
        }
    }
}
