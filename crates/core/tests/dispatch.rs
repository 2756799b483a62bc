mod common;

use common::{native_scanners, write_zip};
use groomer_core::dispatch::dispatch;
use groomer_core::FileRecord;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

const ODT: &str = "application/vnd.oasis.opendocument.text";

fn dispatched(path: &Path, mimetype: &str) -> FileRecord {
    let dst = path.with_extension("out");
    let mut record = FileRecord::new(path.to_path_buf(), dst, Some(mimetype.into()));
    dispatch(&mut record, &native_scanners(), None);
    record
}

#[test]
fn libreoffice_with_basic_macros_is_dangerous() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("report.odt");
    write_zip(
        &path,
        &[("content.xml", b"<c/>"), ("Basic/Standard/Module1.xml", b"<m/>")],
    );
    let record = dispatched(&path, ODT);
    assert!(record.is_dangerous());
    assert!(record
        .description()
        .contains(&"Libreoffice file containing executable code".to_string()));
}

#[test]
fn libreoffice_with_binary_part_is_dangerous() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sheet.odt");
    write_zip(&path, &[("content.xml", b"<c/>"), ("Pictures/blob.bin", b"\x00\x01")]);
    assert!(dispatched(&path, ODT).is_dangerous());
}

#[test]
fn plain_libreoffice_is_kept() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.odt");
    write_zip(&path, &[("content.xml", b"<c/>"), ("styles.xml", b"<s/>")]);
    let record = dispatched(&path, ODT);
    assert!(!record.is_dangerous());
    assert!(record.description().contains(&"Libreoffice file".to_string()));
}

#[test]
fn unopenable_libreoffice_is_invalid() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.odt");
    fs::write(&path, b"this is not a zip container").unwrap();
    let record = dispatched(&path, ODT);
    assert!(record.is_dangerous());
    assert!(record
        .description()
        .contains(&"Invalid libreoffice file".to_string()));
    assert!(record.errors().contains_key("libreoffice"));
}

#[test]
fn winoffice_with_macros_is_dangerous() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("invoice.doc");
    {
        let mut comp = cfb::create(&path).unwrap();
        comp.create_storage("/Macros").unwrap();
        comp.create_stream("/Macros/Module1")
            .unwrap()
            .write_all(b"Sub AutoOpen()")
            .unwrap();
        comp.create_stream("/WordDocument")
            .unwrap()
            .write_all(b"body")
            .unwrap();
        comp.flush().unwrap();
    }
    let record = dispatched(&path, "application/msword");
    assert!(record.is_dangerous());
    assert!(record
        .description()
        .contains(&"WinOffice file containing a macro".to_string()));
}

#[test]
fn clean_winoffice_is_kept() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("letter.doc");
    {
        let mut comp = cfb::create(&path).unwrap();
        comp.create_stream("/WordDocument")
            .unwrap()
            .write_all(b"body")
            .unwrap();
        comp.flush().unwrap();
    }
    let record = dispatched(&path, "application/msword");
    assert!(!record.is_dangerous());
    assert!(record.description().contains(&"WinOffice file".to_string()));
}

#[test]
fn garbage_winoffice_is_unparsable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fake.doc");
    fs::write(&path, b"definitely not OLE").unwrap();
    let record = dispatched(&path, "application/msword");
    assert!(record
        .description()
        .contains(&"Unparsable WinOffice file".to_string()));
}
