//! Audit trail of every visited entry.

use crate::config::LogConfig;
use crate::fs_apply;
use crate::models::FileRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Snapshot of a finished record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub filename: String,
    pub path: PathBuf,
    pub dst_path: PathBuf,
    pub hash: String,
    pub size: u64,
    pub maintype: String,
    pub subtype: String,
    pub category: String,
    pub description: Vec<String>,
    pub copied: bool,
    pub errors: BTreeMap<String, String>,
    pub symlink: Option<PathBuf>,
}

impl FileReport {
    pub fn from_record(record: &FileRecord) -> Self {
        Self {
            filename: record.filename.clone(),
            path: record.original_path().to_path_buf(),
            dst_path: record.dst_path.clone(),
            hash: hash_prefix(hashed_path(record), record.is_symlink()),
            size: record.size,
            maintype: record.maintype().to_string(),
            subtype: record.subtype().to_string(),
            category: record.state().label().to_string(),
            description: record.description().to_vec(),
            copied: record.copied,
            errors: record.errors().clone(),
            symlink: record.symlink_target.clone(),
        }
    }

    pub fn description_string(&self) -> String {
        self.description.join(", ")
    }

    pub fn is_dangerous(&self) -> bool {
        self.category == "Dangerous"
    }
}

/// The bytes that reached the destination when copied, else the source.
fn hashed_path(record: &FileRecord) -> &Path {
    if record.copied {
        &record.dst_path
    } else {
        &record.src_path
    }
}

/// First six hex digits of the content hash, `directory` for directories and
/// `------` when the file cannot be read. Links are never followed.
pub fn hash_prefix(path: &Path, is_symlink: bool) -> String {
    if is_symlink {
        return "------".into();
    }
    if path.is_dir() {
        return "directory".into();
    }
    match hash_file(path) {
        Ok(hex) => hex[..6].to_string(),
        Err(_) => "------".into(),
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

pub trait AuditLog {
    fn add_root(&mut self, root: &Path) -> Result<()>;
    fn add_dir(&mut self, dir: &Path, depth: usize) -> Result<()>;
    fn add_file(&mut self, report: &FileReport, depth: usize) -> Result<()>;
}

impl<L: AuditLog + ?Sized> AuditLog for Box<L> {
    fn add_root(&mut self, root: &Path) -> Result<()> {
        (**self).add_root(root)
    }

    fn add_dir(&mut self, dir: &Path, depth: usize) -> Result<()> {
        (**self).add_dir(dir, depth)
    }

    fn add_file(&mut self, report: &FileReport, depth: usize) -> Result<()> {
        (**self).add_file(report, depth)
    }
}

/// Tree shaped text log written under the destination root.
#[derive(Debug)]
pub struct TextAuditLog {
    path: PathBuf,
    file: fs::File,
}

impl TextAuditLog {
    /// Recreates `<dst_root>/<dir_name>` and starts a fresh log file in it.
    pub fn create(dst_root: &Path, config: &LogConfig) -> Result<Self> {
        let dir = dst_root.join(&config.dir_name);
        fs_apply::reset_dir(&dir).with_context(|| format!("create log dir {:?}", dir))?;
        let path = dir.join(&config.file_name);
        let mut file =
            fs::File::create(&path).with_context(|| format!("create log file {:?}", path))?;
        writeln!(
            file,
            "Groomer run started {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str, depth: usize) -> Result<()> {
        let padding = format!("   {}", "|  ".repeat(depth));
        writeln!(self.file, "{}{}", padding, line)?;
        Ok(())
    }
}

impl AuditLog for TextAuditLog {
    fn add_root(&mut self, root: &Path) -> Result<()> {
        writeln!(self.file, "{}/", display_name(root))?;
        Ok(())
    }

    fn add_dir(&mut self, dir: &Path, depth: usize) -> Result<()> {
        self.write_line(&format!("+- {}/", display_name(dir)), depth)
    }

    fn add_file(&mut self, report: &FileReport, depth: usize) -> Result<()> {
        let line = render_file_line(report);
        self.write_line(&line, depth)
    }
}

pub fn render_file_line(report: &FileReport) -> String {
    let mut line = match &report.symlink {
        Some(target) => format!(
            "+- NOT COPIED: symbolic link to {} ({})",
            target.display(),
            report.hash
        ),
        None => format!(
            "+- {}{} ({}): {}, type: {}/{}. {}: {}",
            if report.copied { "" } else { "NOT COPIED: " },
            report.filename,
            report.hash,
            format_size(report.size),
            report.maintype,
            report.subtype,
            report.category,
            report.description_string()
        ),
    };
    if !report.errors.is_empty() {
        let kinds: Vec<&str> = report.errors.keys().map(|k| k.as_str()).collect();
        line.push_str(" Errors: ");
        line.push_str(&kinds.join(", "));
    }
    line
}

pub fn format_size(size: u64) -> String {
    let mut value = size;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024 {
            return format!("{}{}", value, unit);
        }
        value /= 1024;
    }
    format!("{}GB", value)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEntry {
    Root(PathBuf),
    Dir { path: PathBuf, depth: usize },
    File { report: FileReport, depth: usize },
}

/// Keeps entries in memory, in the order they were logged.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    pub entries: Vec<AuditEntry>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileReport> {
        self.entries.iter().filter_map(|e| match e {
            AuditEntry::File { report, .. } => Some(report),
            _ => None,
        })
    }

    /// First report whose (possibly sanitised) filename equals `name`.
    pub fn file(&self, name: &str) -> Option<&FileReport> {
        self.files().find(|r| r.filename == name)
    }
}

impl AuditLog for MemoryAuditLog {
    fn add_root(&mut self, root: &Path) -> Result<()> {
        self.entries.push(AuditEntry::Root(root.to_path_buf()));
        Ok(())
    }

    fn add_dir(&mut self, dir: &Path, depth: usize) -> Result<()> {
        self.entries.push(AuditEntry::Dir {
            path: dir.to_path_buf(),
            depth,
        });
        Ok(())
    }

    fn add_file(&mut self, report: &FileReport, depth: usize) -> Result<()> {
        self.entries.push(AuditEntry::File {
            report: report.clone(),
            depth,
        });
        Ok(())
    }
}
