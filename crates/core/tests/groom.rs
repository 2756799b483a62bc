mod common;

use common::{config, groom, groom_with, native_scanners, write_zip, zip_bytes, MapSniffer};
use groomer_core::audit::{AuditEntry, AuditLog, FileReport, MemoryAuditLog, TextAuditLog};
use groomer_core::config::UnpackerKind;
use groomer_core::integrity::MISMATCH_REASON;
use groomer_core::pipeline::build_scanners;
use groomer_core::Groomer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use scanners::{ImageCodec, PdfCounts, PdfScanner, ScannerError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

fn layout() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let temp = tempdir().unwrap();
    let src = temp.path().join("usb");
    let dst = temp.path().join("clean");
    fs::create_dir_all(&src).unwrap();
    fs::create_dir_all(&dst).unwrap();
    (temp, src, dst)
}

const CONTENT_TYPES: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="xml" ContentType="application/xml"/>
</Types>"#;

#[test]
fn plain_text_is_copied_as_is() {
    let (_t, src, dst) = layout();
    fs::write(src.join("hello.txt"), "hello world\n").unwrap();

    let (summary, log) = groom(&src, &dst);
    let report = log.file("hello.txt").unwrap();
    assert_eq!(report.category, "Normal");
    assert!(report.copied);
    assert!(report.description.contains(&"Plain text file".to_string()));
    assert_eq!(fs::read_to_string(dst.join("hello.txt")).unwrap(), "hello world\n");
    assert_eq!(summary.copied, 1);
    assert_eq!(summary.integrity_failures, 0);
}

#[test]
fn macro_enabled_ooxml_collects_both_reasons() {
    let (_t, src, dst) = layout();
    write_zip(
        &src.join("report.docm"),
        &[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("word/document.xml", b"<w:document/>"),
            ("word/activeX/activeX1.xml", b"<ax/>"),
        ],
    );
    let sniffer = MapSniffer::with(&[(
        "report.docm",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    )]);
    let (_, log) = groom_with(&src, &dst, config(), native_scanners().with_sniffer(Arc::new(sniffer)));

    let report = log.file("report.docm").unwrap();
    assert!(report.is_dangerous());
    assert!(report
        .description
        .contains(&"Extension identifies file as potentially dangerous".to_string()));
    assert!(report
        .description
        .contains(&"Ooxml file with activex".to_string()));
    assert!(dst.join("DANGEROUS_report.docm_DANGEROUS").exists());
}

#[test]
fn pdf_with_javascript_is_copied_under_mangled_name() {
    let (_t, src, dst) = layout();
    fs::write(
        src.join("invoice.pdf"),
        b"%PDF-1.4\n1 0 obj << /OpenActio#6e 2 0 R >> endobj\n2 0 obj << /S /JavaScript /JS (x) >> endobj\n%%EOF\n",
    )
    .unwrap();

    let (summary, log) = groom(&src, &dst);
    let report = log.file("invoice.pdf").unwrap();
    assert!(report.is_dangerous());
    assert!(report
        .description
        .contains(&"Pdf with embedded javascript".to_string()));
    assert!(report.description.contains(&"Pdf with openaction(s)".to_string()));
    assert!(report.copied);
    assert!(dst.join("DANGEROUS_invoice.pdf_DANGEROUS").exists());
    assert!(!dst.join("invoice.pdf").exists());
    assert_eq!(summary.dangerous, 1);
}

#[test]
fn empty_csv_takes_the_inode_path() {
    let (_t, src, dst) = layout();
    fs::write(src.join("data.csv"), b"").unwrap();

    let (_, log) = groom(&src, &dst);
    let report = log.file("data.csv").unwrap();
    assert_eq!(report.category, "Normal");
    assert!(!report.copied);
    assert!(report
        .description
        .contains(&"File is an inode (empty file)".to_string()));
    assert!(!dst.join("data.csv").exists());
}

fn nested_archives(src: &Path) {
    let inner = zip_bytes(&[("secret.txt", b"deep inside")]);
    let middle = zip_bytes(&[("inner.zip", &inner), ("middle.txt", b"middle layer")]);
    write_zip(&src.join("outer.zip"), &[("middle.zip", &middle), ("outer.txt", b"top")]);
}

#[test]
fn archive_recursion_stops_at_configured_depth() {
    let (_t, src, dst) = layout();
    nested_archives(&src);
    let mut cfg = config();
    cfg.archive.max_depth = 3;

    let (summary, log) = groom_with(&src, &dst, cfg, native_scanners());
    assert_eq!(summary.archives_extracted, 2);
    assert_eq!(summary.archive_bombs, 1);

    let inner = log.file("inner.zip").unwrap();
    assert!(inner.is_dangerous());
    assert!(inner.description.contains(&"Archive bomb".to_string()));
    assert!(log.file("secret.txt").is_none());
    assert!(log.file("middle.txt").unwrap().copied);

    assert_eq!(
        fs::read_to_string(dst.join("outer.zip/outer.txt")).unwrap(),
        "top"
    );
    assert_eq!(
        fs::read_to_string(dst.join("outer.zip/middle.zip/middle.txt")).unwrap(),
        "middle layer"
    );
    assert!(dst
        .join("outer.zip/middle.zip/DANGEROUS_inner.zip_DANGEROUS")
        .exists());
}

#[test]
fn default_depth_extracts_one_level() {
    let (_t, src, dst) = layout();
    nested_archives(&src);

    let (summary, log) = groom(&src, &dst);
    assert_eq!(summary.archives_extracted, 1);
    assert_eq!(summary.archive_bombs, 1);
    assert!(log.file("middle.zip").unwrap().is_dangerous());
    assert!(log.file("middle.txt").is_none());
    assert!(dst.join("outer.zip/DANGEROUS_middle.zip_DANGEROUS").exists());
}

#[test]
fn archive_contents_are_logged_one_level_deeper() {
    let (_t, src, dst) = layout();
    write_zip(&src.join("bundle.zip"), &[("a.txt", b"a")]);

    let (_, log) = groom(&src, &dst);
    let depth_of = |name: &str| {
        log.entries.iter().find_map(|e| match e {
            AuditEntry::File { report, depth } if report.filename == name => Some(*depth),
            _ => None,
        })
    };
    assert_eq!(depth_of("bundle.zip"), Some(0));
    assert_eq!(depth_of("a.txt"), Some(1));
    let bundle = log.file("bundle.zip").unwrap();
    assert!(!bundle.copied);
    assert!(bundle.description.contains(&"Archive".to_string()));
}

#[test]
fn right_to_left_override_name_is_sanitised() {
    let (_t, src, dst) = layout();
    fs::write(src.join("photo\u{202E}gpj.txt"), "not a picture").unwrap();

    let (_, log) = groom(&src, &dst);
    let report = log.file("photogpj.txt").unwrap();
    assert!(report.is_dangerous());
    assert!(dst.join("DANGEROUS_photogpj.txt_DANGEROUS").exists());
}

/// Rewrites the file while it is being inspected, standing in for another
/// process writing to the same medium.
struct SwappingPdfScanner;

impl PdfScanner for SwappingPdfScanner {
    fn scan(&self, path: &Path) -> Result<PdfCounts, ScannerError> {
        let len = fs::metadata(path)?.len() as usize;
        fs::write(path, vec![b'Z'; len])?;
        Ok(PdfCounts::default())
    }
}

#[test]
fn source_swapped_after_inspection_is_not_kept() {
    let (_t, src, dst) = layout();
    let mut body = b"%PDF-1.4\n".to_vec();
    body.extend(std::iter::repeat(b'a').take(600));
    fs::write(src.join("form.pdf"), &body).unwrap();

    let (summary, log) = groom_with(
        &src,
        &dst,
        config(),
        native_scanners().with_pdf(Arc::new(SwappingPdfScanner)),
    );
    let report = log.file("form.pdf").unwrap();
    assert!(report.is_dangerous());
    assert!(!report.copied);
    assert!(report.description.contains(&MISMATCH_REASON.to_string()));
    assert!(!dst.join("form.pdf").exists());
    assert!(!dst.join("DANGEROUS_form.pdf_DANGEROUS").exists());
    assert_eq!(summary.integrity_failures, 1);
}

#[test]
fn images_are_reencoded_with_metadata_sidecar() {
    let (_t, src, dst) = layout();
    {
        let file = fs::File::create(src.join("photo.png")).unwrap();
        let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), 2, 2);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .add_text_chunk("Author".to_string(), "Mallory".to_string())
            .unwrap();
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[200u8; 12]).unwrap();
    }

    let (_, log) = groom(&src, &dst);
    let report = log.file("photo.png").unwrap();
    assert_eq!(report.category, "Normal");
    assert!(report.copied);
    assert!(report.description.contains(&"Image file".to_string()));

    let copy = image::open(dst.join("photo.png")).unwrap().to_rgb8();
    assert_eq!(copy.dimensions(), (2, 2));
    let sidecar = fs::read_to_string(dst.join("photo.png.metadata.txt")).unwrap();
    assert!(sidecar.contains("Key: Author\tValue: Mallory"));
}

#[test]
fn broken_image_is_dangerous() {
    let (_t, src, dst) = layout();
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(&[0u8; 64]);
    fs::write(src.join("broken.png"), data).unwrap();

    let (_, log) = groom(&src, &dst);
    let report = log.file("broken.png").unwrap();
    assert!(report.is_dangerous());
}

#[test]
fn opaque_binary_gets_bin_suffix() {
    let (_t, src, dst) = layout();
    fs::write(src.join("payload.zzq"), [0u8, 159, 146, 150, 1, 2, 3]).unwrap();

    let (summary, log) = groom(&src, &dst);
    let report = log.file("payload.zzq").unwrap();
    assert_eq!(report.category, "Binary");
    assert!(dst.join("payload.zzq.bin").exists());
    assert_eq!(summary.binary, 1);
}

#[test]
fn unknown_maintype_is_not_copied() {
    let (_t, src, dst) = layout();
    fs::write(src.join("molecule.zzq"), "ATOM 1").unwrap();
    let sniffer = MapSniffer::with(&[("molecule.zzq", "chemical/x-zzq")]);
    let (_, log) = groom_with(&src, &dst, config(), native_scanners().with_sniffer(Arc::new(sniffer)));

    let report = log.file("molecule.zzq").unwrap();
    assert_eq!(report.category, "Unknown");
    assert!(!report.copied);
    assert!(!dst.join("UNKNOWN_molecule.zzq").exists());
}

#[test]
fn message_types_are_dangerous() {
    let (_t, src, dst) = layout();
    fs::write(src.join("mail.eml"), "From: a@b\n\nhi").unwrap();
    let sniffer = MapSniffer::with(&[("mail.eml", "message/rfc822")]);
    let (_, log) = groom_with(&src, &dst, config(), native_scanners().with_sniffer(Arc::new(sniffer)));

    let report = log.file("mail.eml").unwrap();
    assert!(report.is_dangerous());
    assert!(report
        .description
        .contains(&"Message file - should not be found on USB key".to_string()));
}

#[test]
fn skip_list_and_directories() {
    let (_t, src, dst) = layout();
    fs::create_dir_all(src.join("Docs/Sub")).unwrap();
    fs::write(src.join("Docs/Sub/b.txt"), "b").unwrap();
    fs::write(src.join("a.txt"), "a").unwrap();
    fs::write(src.join(".DS_Store"), "junk").unwrap();
    fs::write(src.join("._a.txt"), "resource fork").unwrap();

    let (summary, log) = groom(&src, &dst);
    let names: Vec<&str> = log.files().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert_eq!(summary.directories, 2);
    assert!(dst.join("Docs/Sub/b.txt").exists());
    assert!(!dst.join(".DS_Store").exists());

    let dir_depths: Vec<usize> = log
        .entries
        .iter()
        .filter_map(|e| match e {
            AuditEntry::Dir { depth, .. } => Some(*depth),
            _ => None,
        })
        .collect();
    assert_eq!(dir_depths, vec![0, 1]);
}

#[cfg(unix)]
#[test]
fn symlinks_are_logged_but_not_followed() {
    let (_t, src, dst) = layout();
    fs::create_dir_all(src.join("real")).unwrap();
    fs::write(src.join("real/file.txt"), "x").unwrap();
    std::os::unix::fs::symlink(src.join("real"), src.join("loop")).unwrap();

    let (_, log) = groom(&src, &dst);
    let link = log.file("loop").unwrap();
    assert!(!link.copied);
    assert!(link.symlink.is_some());
    assert_eq!(log.files().filter(|r| r.filename == "file.txt").count(), 1);
    assert!(!dst.join("loop").exists());
}

#[test]
fn every_entry_is_logged_once() {
    let (_t, src, dst) = layout();
    fs::write(src.join("one.txt"), "1").unwrap();
    fs::write(src.join("two.pdf"), "%PDF-1.4\n%%EOF\n").unwrap();
    write_zip(&src.join("three.zip"), &[("four.txt", b"4")]);

    let (summary, log) = groom(&src, &dst);
    let mut names: Vec<&str> = log.files().map(|r| r.filename.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["four.txt", "one.txt", "three.zip", "two.pdf"]);
    assert_eq!(summary.files, 4);
}

#[test]
fn unreadable_archive_is_copied_as_dangerous() {
    let (_t, src, dst) = layout();
    let mut data = b"PK\x03\x04".to_vec();
    data.extend(std::iter::repeat(0xA5u8).take(200));
    fs::write(src.join("bad.zip"), data).unwrap();

    let (summary, log) = groom(&src, &dst);
    let report = log.file("bad.zip").unwrap();
    assert!(report.is_dangerous());
    assert!(report.description.contains(&"Unreadable archive".to_string()));
    assert!(report.errors["unpack"].starts_with("unreadable archive"));
    assert!(report.copied);
    assert!(dst.join("DANGEROUS_bad.zip_DANGEROUS").exists());
    assert_eq!(summary.archives_extracted, 0);
}

/// Fails to decode, after replacing the source with something else.
struct SwappingCodec;

impl ImageCodec for SwappingCodec {
    fn reencode(&self, src: &Path, _dst: &Path) -> Result<(), ScannerError> {
        fs::write(src, b"MZ swapped payload after inspection")?;
        Err(ScannerError::Parse("not an image".into()))
    }
}

#[test]
fn dangerous_image_swapped_before_copy_is_removed() {
    let (_t, src, dst) = layout();
    image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]))
        .save(src.join("pic.png"))
        .unwrap();

    let (summary, log) = groom_with(
        &src,
        &dst,
        config(),
        native_scanners().with_codec(Arc::new(SwappingCodec)),
    );
    let report = log.file("pic.png").unwrap();
    assert!(report.is_dangerous());
    assert!(!report.copied);
    assert!(report.description.contains(&MISMATCH_REASON.to_string()));
    assert!(!dst.join("DANGEROUS_pic.png_DANGEROUS").exists());
    assert_eq!(summary.integrity_failures, 1);
}

#[test]
fn source_entries_cannot_reach_the_log_directory() {
    let (_t, src, dst) = layout();
    fs::write(src.join("a.txt"), "first").unwrap();
    fs::create_dir_all(src.join("logs")).unwrap();
    fs::write(src.join("logs/groomer_log.txt"), "forged audit trail").unwrap();
    fs::write(src.join("z.txt"), "last").unwrap();

    let cfg = config();
    let log = TextAuditLog::create(&dst, &cfg.log).unwrap();
    let log_path = log.path().to_path_buf();
    let mut groomer = Groomer::new(&src, &dst, cfg, native_scanners(), log)
        .unwrap()
        .with_rng(StdRng::seed_from_u64(7));
    let summary = groomer.run().unwrap();
    drop(groomer);

    let text = fs::read_to_string(&log_path).unwrap();
    assert!(text.starts_with("Groomer run started"));
    assert!(!text.contains("forged audit trail"));
    assert!(text.contains("+- a.txt"));
    assert!(text.contains("+- logs/"));
    assert!(text.contains("NOT COPIED: groomer_log.txt"));
    assert!(text.contains("+- z.txt"));
    assert_eq!(summary.dangerous, 1);
    assert!(dst.join("a.txt").exists());
    assert!(dst.join("z.txt").exists());
}

/// Rejects reports for one file name and records everything else.
struct FlakyLog {
    inner: MemoryAuditLog,
    reject: &'static str,
}

impl AuditLog for FlakyLog {
    fn add_root(&mut self, root: &Path) -> anyhow::Result<()> {
        self.inner.add_root(root)
    }

    fn add_dir(&mut self, dir: &Path, depth: usize) -> anyhow::Result<()> {
        self.inner.add_dir(dir, depth)
    }

    fn add_file(&mut self, report: &FileReport, depth: usize) -> anyhow::Result<()> {
        if report.filename == self.reject {
            anyhow::bail!("disk full");
        }
        self.inner.add_file(report, depth)
    }
}

#[test]
fn audit_failure_for_one_file_does_not_stop_the_walk() {
    let (_t, src, dst) = layout();
    fs::write(src.join("a.txt"), "a").unwrap();
    fs::write(src.join("b.txt"), "b").unwrap();
    fs::write(src.join("c.txt"), "c").unwrap();

    let log = FlakyLog {
        inner: MemoryAuditLog::new(),
        reject: "b.txt",
    };
    let mut groomer = Groomer::new(&src, &dst, config(), native_scanners(), log)
        .unwrap()
        .with_rng(StdRng::seed_from_u64(7));
    let summary = groomer.run().unwrap();

    assert_eq!(summary.files, 3);
    assert_eq!(summary.audit_failures, 1);
    let log = groomer.into_log().inner;
    assert!(log.file("a.txt").is_some());
    assert!(log.file("b.txt").is_none());
    assert!(log.file("c.txt").is_some());
    assert!(dst.join("c.txt").exists());
}

#[test]
fn logged_hash_describes_the_copy() {
    let (_t, src, dst) = layout();
    image::RgbImage::from_pixel(4, 4, image::Rgb([9, 9, 9]))
        .save(src.join("pic.png"))
        .unwrap();

    let (_, log) = groom(&src, &dst);
    let report = log.file("pic.png").unwrap();
    assert!(report.copied);
    let copy = blake3::hash(&fs::read(dst.join("pic.png")).unwrap()).to_hex();
    assert_eq!(report.hash, &copy[..6]);
}

#[test]
fn rtf_documents_are_kept_as_text() {
    let (_t, src, dst) = layout();
    fs::write(src.join("letter.rtf"), "{\\rtf1\\ansi hello}").unwrap();

    let (_, log) = groom(&src, &dst);
    let report = log.file("letter.rtf").unwrap();
    assert_eq!(report.category, "Normal");
    assert!(report.description.contains(&"Rich Text (rtf) file".to_string()));
    assert!(report.copied);
}

#[cfg(unix)]
fn fake_7z(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake7z");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
fn groom_with_7z(body: &str, timeout_secs: u64) -> (tempfile::TempDir, PathBuf, MemoryAuditLog) {
    let (t, src, dst) = layout();
    write_zip(&src.join("a.zip"), &[("inside.txt", b"inside")]);
    fs::write(src.join("after.txt"), "after").unwrap();

    let mut cfg = config();
    cfg.archive.unpacker = UnpackerKind::SevenZip;
    cfg.archive.sevenzip_path = fake_7z(t.path(), body);
    cfg.archive.timeout_secs = timeout_secs;
    let scanners = build_scanners(&cfg);
    let (_, log) = groom_with(&src, &dst, cfg, scanners);
    (t, dst, log)
}

#[cfg(unix)]
#[test]
fn sevenzip_failure_keeps_partial_output_and_continues() {
    let script = r##"for a in "$@"; do case "$a" in -o*) out="${a#-o}";; esac; done
echo partial > "$out/partial.txt"
exit 2"##;
    let (_t, dst, log) = groom_with_7z(script, 10);

    let archive = log.file("a.zip").unwrap();
    assert_eq!(archive.errors["unpack"], "exit status 2");
    assert!(!archive.is_dangerous());
    assert!(log.file("partial.txt").unwrap().copied);
    assert_eq!(
        fs::read_to_string(dst.join("a.zip/partial.txt")).unwrap(),
        "partial\n"
    );
    assert!(log.file("after.txt").unwrap().copied);
}

#[cfg(unix)]
#[test]
fn sevenzip_timeout_is_recorded_and_walk_continues() {
    let (_t, dst, log) = groom_with_7z("exec sleep 5", 1);

    let archive = log.file("a.zip").unwrap();
    assert_eq!(archive.errors["unpack"], "timed out after 1s");
    assert!(log.file("inside.txt").is_none());
    assert!(dst.join("after.txt").exists());
}
