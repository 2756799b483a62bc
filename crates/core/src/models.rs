use crate::policy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyState {
    #[default]
    Normal,
    Unknown,
    Binary,
    Dangerous,
}

impl SafetyState {
    /// Transitions only ever move up this ranking.
    fn rank(self) -> u8 {
        match self {
            SafetyState::Normal => 0,
            SafetyState::Unknown => 1,
            SafetyState::Binary => 2,
            SafetyState::Dangerous => 3,
        }
    }

    /// Whether a record in `self` may move to `next`.
    pub fn can_transition_to(self, next: SafetyState) -> bool {
        next.rank() > self.rank()
    }

    pub fn label(self) -> &'static str {
        match self {
            SafetyState::Normal => "Normal",
            SafetyState::Unknown => "Unknown",
            SafetyState::Binary => "Binary",
            SafetyState::Dangerous => "Dangerous",
        }
    }
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A byte range hashed before the copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySample {
    pub offset: u64,
    pub len: usize,
    pub hash: String,
}

/// One filesystem entry under inspection.
#[derive(Debug)]
pub struct FileRecord {
    pub src_path: PathBuf,
    pub dst_path: PathBuf,
    pub filename: String,
    pub mimetype: Option<String>,
    pub main_type: Option<String>,
    pub sub_type: Option<String>,
    pub extension: Option<String>,
    pub size: u64,
    pub symlink_target: Option<PathBuf>,
    pub should_copy: bool,
    pub is_archive: bool,
    pub copied: bool,
    pub samples: Vec<IntegritySample>,
    /// Scratch space for transcoded output; removed when the record drops.
    pub scratch: Option<TempDir>,
    /// The path as found on the source medium; `src_path` may be redirected.
    original_path: PathBuf,
    state: SafetyState,
    description: Vec<String>,
    errors: BTreeMap<String, String>,
}

impl FileRecord {
    /// Builds a record for `src_path`; `mimetype` is the sniffer's verdict.
    pub fn new(src_path: PathBuf, dst_path: PathBuf, mimetype: Option<String>) -> Self {
        let filename = src_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = src_path
            .extension()
            .and_then(|e| e.to_str())
            .map(policy::normalize_extension)
            .filter(|e| !e.is_empty());
        let link_meta = fs::symlink_metadata(&src_path).ok();
        let symlink_target = link_meta
            .as_ref()
            .filter(|m| m.file_type().is_symlink())
            .and_then(|_| fs::read_link(&src_path).ok());
        let size = link_meta.map(|m| m.len()).unwrap_or(0);

        let mut record = Self {
            original_path: src_path.clone(),
            src_path,
            dst_path,
            filename,
            mimetype: None,
            main_type: None,
            sub_type: None,
            extension,
            size,
            symlink_target,
            should_copy: true,
            is_archive: false,
            copied: false,
            samples: Vec::new(),
            scratch: None,
            state: SafetyState::Normal,
            description: Vec::new(),
            errors: BTreeMap::new(),
        };
        record.set_mimetype(mimetype);
        record
    }

    pub fn set_mimetype(&mut self, mimetype: Option<String>) {
        let mimetype = mimetype.map(|m| m.trim().to_lowercase());
        let (main, sub) = match mimetype.as_deref().and_then(|m| m.split_once('/')) {
            Some((main, sub)) if !main.is_empty() && !sub.is_empty() && !sub.contains('/') => {
                (Some(main.to_string()), Some(sub.to_string()))
            }
            _ => (None, None),
        };
        self.mimetype = mimetype;
        self.main_type = main;
        self.sub_type = sub;
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    pub fn has_mimetype(&self) -> bool {
        self.main_type.is_some() && self.sub_type.is_some()
    }

    pub fn has_extension(&self) -> bool {
        self.extension.is_some()
    }

    pub fn is_symlink(&self) -> bool {
        self.symlink_target.is_some()
    }

    pub fn maintype(&self) -> &str {
        self.main_type.as_deref().unwrap_or("")
    }

    pub fn subtype(&self) -> &str {
        self.sub_type.as_deref().unwrap_or("")
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn is_dangerous(&self) -> bool {
        self.state == SafetyState::Dangerous
    }

    pub fn is_unknown(&self) -> bool {
        self.state == SafetyState::Unknown
    }

    pub fn is_binary(&self) -> bool {
        self.state == SafetyState::Binary
    }

    pub fn description(&self) -> &[String] {
        &self.description
    }

    pub fn description_string(&self) -> String {
        self.description.join(", ")
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn add_description(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.description.contains(&text) {
            self.description.push(text);
        }
    }

    pub fn add_error(&mut self, kind: impl Into<String>, context: impl Into<String>) {
        let kind = kind.into();
        let context = context.into();
        debug!("{}: {} ({})", self.filename, kind, context);
        self.errors.insert(kind, context);
    }

    /// The single entry point for safety state changes. Returns whether the
    /// state changed; the destination name is mangled only on a change, so
    /// repeated markings never stack.
    pub fn transition(&mut self, next: SafetyState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        match next {
            SafetyState::Dangerous => self.rename_dst(|n| format!("DANGEROUS_{}_DANGEROUS", n)),
            SafetyState::Binary => self.rename_dst(|n| format!("{}.bin", n)),
            SafetyState::Unknown => self.rename_dst(|n| format!("UNKNOWN_{}", n)),
            SafetyState::Normal => {}
        }
        true
    }

    /// Records `reason` and marks the record dangerous. Reasons keep
    /// accumulating after the first marking.
    pub fn make_dangerous(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.transition(SafetyState::Dangerous) {
            info!("{} marked dangerous: {}", self.src_path.display(), reason);
        } else {
            debug!("{} additional reason: {}", self.src_path.display(), reason);
        }
        self.add_description(reason);
    }

    pub fn make_unknown(&mut self) {
        self.transition(SafetyState::Unknown);
    }

    pub fn make_binary(&mut self) {
        self.transition(SafetyState::Binary);
    }

    /// Appends `.ext` to the destination unless it already ends with it.
    pub fn force_ext(&mut self, ext: &str) {
        let ext = policy::normalize_extension(ext);
        let suffix = format!(".{}", ext);
        let current = self.dst_path.to_string_lossy().into_owned();
        if !current.ends_with(&suffix) {
            self.dst_path = PathBuf::from(format!("{}{}", current, suffix));
        }
        self.extension = Some(ext);
    }

    /// Drops the forbidden character from the display name and destination.
    pub fn strip_forbidden_chars(&mut self) {
        self.filename = policy::strip_forbidden_chars(&self.filename);
        self.rename_dst(policy::strip_forbidden_chars);
    }

    /// Sidecar path for extracted metadata next to the destination file.
    /// Refuses to reuse a path that already exists.
    pub fn metadata_sidecar_path(&mut self, ext: &str) -> Option<PathBuf> {
        let sidecar = PathBuf::from(format!("{}{}", self.dst_path.to_string_lossy(), ext));
        if sidecar.exists() {
            self.add_error(
                "metadata",
                format!(
                    "could not create metadata file for {}: {} already exists",
                    self.filename,
                    sidecar.display()
                ),
            );
            return None;
        }
        Some(sidecar)
    }

    /// Runs every validation step; each may mark the record dangerous and
    /// none of them stops the others.
    pub fn check(&mut self) {
        self.check_malicious_extension();
        if self.is_symlink() {
            // Links are logged, never followed or copied.
            self.should_copy = false;
        } else {
            self.check_mimetype();
            self.check_extension();
        }
        self.check_filename();
    }

    fn check_malicious_extension(&mut self) {
        if let Some(ext) = &self.extension {
            if policy::is_malicious_extension(ext) {
                self.make_dangerous("Extension identifies file as potentially dangerous");
            }
        }
    }

    fn check_mimetype(&mut self) {
        let Some(mimetype) = self.mimetype.clone().filter(|_| self.has_mimetype()) else {
            self.make_dangerous("File has no mimetype");
            return;
        };
        let expected = policy::expected_extensions_for(&mimetype);
        if expected.is_empty() {
            return;
        }
        if let Some(ext) = self.extension.clone() {
            if policy::is_known_extension(&ext) && !expected.contains(&ext) {
                self.make_dangerous(format!(
                    "Extension does not match expected extensions ({}) for this mimetype",
                    expected.join(", ")
                ));
            }
        }
    }

    fn check_extension(&mut self) {
        let Some(ext) = self.extension.clone() else {
            self.make_dangerous("File has no extension");
            return;
        };
        if self.size == 0 || !policy::is_known_extension(&ext) {
            return;
        }
        let Some(mimetype) = self.mimetype.clone().filter(|_| self.has_mimetype()) else {
            return;
        };
        let expected = policy::expected_mimetypes_for(&ext);
        if !expected.contains(&mimetype) {
            self.make_dangerous(format!(
                "Mimetype does not match expected mimetypes ({}) for this extension",
                expected.join(", ")
            ));
        }
    }

    fn check_filename(&mut self) {
        if policy::is_os_metadata_file(&self.filename) {
            self.add_description(
                "MacOS metadata file, added by MacOS to USB drives and some directories",
            );
            self.should_copy = false;
        }
        if policy::has_forbidden_char(&self.filename) {
            self.make_dangerous("Filename contains dangerous character");
            self.strip_forbidden_chars();
        }
    }

    fn rename_dst<F>(&mut self, f: F)
    where
        F: FnOnce(&str) -> String,
    {
        let name = match self.dst_path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => return,
        };
        self.dst_path.set_file_name(f(&name));
    }
}
