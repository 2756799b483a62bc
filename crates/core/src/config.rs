use scanners::codec::ImageLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroomerConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub image: ImageLimits,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UnpackerKind {
    #[default]
    #[serde(rename = "7z")]
    SevenZip,
    #[serde(rename = "zip")]
    Zip,
}

impl std::str::FromStr for UnpackerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7z" | "sevenzip" => Ok(UnpackerKind::SevenZip),
            "zip" => Ok(UnpackerKind::Zip),
            other => anyhow::bail!("unknown unpacker: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub unpacker: UnpackerKind,
    #[serde(default = "default_sevenzip_path")]
    pub sevenzip_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ArchiveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            unpacker: UnpackerKind::default(),
            sevenzip_path: default_sevenzip_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityConfig {
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl IntegrityConfig {
    /// No sleeping between samples.
    pub fn without_delay() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            max_samples: default_max_samples(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Glob patterns matched against entry names; matches are never visited.
    #[serde(default = "default_skip")]
    pub skip: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip: default_skip(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir_name: String,
    #[serde(default = "default_log_file")]
    pub file_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir_name: default_log_dir(),
            file_name: default_log_file(),
        }
    }
}

fn default_max_depth() -> usize {
    2
}

fn default_sevenzip_path() -> PathBuf {
    PathBuf::from("/usr/bin/7z")
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_min_samples() -> usize {
    3
}

fn default_max_samples() -> usize {
    6
}

fn default_min_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    500
}

fn default_skip() -> Vec<String> {
    [
        ".Trashes",
        "._*",
        ".DS_Store",
        ".fseventsd",
        ".Spotlight-V100",
        "System Volume Information",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_log_dir() -> String {
    "logs".into()
}

fn default_log_file() -> String {
    "groomer_log.txt".into()
}

/// Reads `path` (or `config/groomer` when present) and `GROOMER__*`
/// environment overrides, e.g. `GROOMER__ARCHIVE__MAX_DEPTH=4`.
pub fn load(path: Option<&str>) -> anyhow::Result<GroomerConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/groomer").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("GROOMER")
            .prefix_separator("__")
            .separator("__"),
    );
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}
