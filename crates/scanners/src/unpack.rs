//! Archive unpacking. Extraction is best effort: whatever lands on disk is
//! processed even when the tool fails.

use crate::{UnpackOutcome, Unpacker};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs the external 7z executable.
#[derive(Debug, Clone)]
pub struct SevenZipUnpacker {
    pub binary: PathBuf,
}

impl SevenZipUnpacker {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for SevenZipUnpacker {
    fn default() -> Self {
        Self::new("/usr/bin/7z")
    }
}

impl Unpacker for SevenZipUnpacker {
    fn unpack(&self, archive: &Path, out_dir: &Path, timeout: Duration) -> UnpackOutcome {
        // -p1: dummy password so encrypted archives never prompt,
        // -bd: no progress indicator, -aoa: overwrite existing files.
        let mut out_arg = std::ffi::OsString::from("-o");
        out_arg.push(out_dir.as_os_str());
        let spawned = Command::new(&self.binary)
            .arg("-p1")
            .arg("x")
            .arg(archive)
            .arg(out_arg)
            .arg("-bd")
            .arg("-aoa")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(c) => c,
            Err(e) => return UnpackOutcome::SpawnFailed(e.to_string()),
        };

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return UnpackOutcome::Success,
                Ok(Some(status)) => return UnpackOutcome::Failed(status.code()),
                Ok(None) if started.elapsed() >= timeout => {
                    warn!("unpacking {:?} timed out after {:?}", archive, timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return UnpackOutcome::TimedOut(timeout);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return UnpackOutcome::SpawnFailed(e.to_string()),
            }
        }
    }
}

/// In-process zip extraction. Entries whose names escape the output
/// directory are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipUnpacker;

impl Unpacker for ZipUnpacker {
    fn unpack(&self, archive: &Path, out_dir: &Path, timeout: Duration) -> UnpackOutcome {
        let file = match fs::File::open(archive) {
            Ok(f) => f,
            Err(e) => return UnpackOutcome::SpawnFailed(e.to_string()),
        };
        let mut zip = match zip::ZipArchive::new(file) {
            Ok(z) => z,
            Err(e) => {
                debug!("not a zip archive {:?}: {}", archive, e);
                return UnpackOutcome::Unreadable(e.to_string());
            }
        };

        let started = Instant::now();
        let mut failed = false;
        for i in 0..zip.len() {
            if started.elapsed() >= timeout {
                return UnpackOutcome::TimedOut(timeout);
            }
            let mut entry = match zip.by_index(i) {
                Ok(e) => e,
                Err(_) => {
                    failed = true;
                    continue;
                }
            };
            let relative = match entry.enclosed_name() {
                Some(p) => p.to_path_buf(),
                None => {
                    warn!("skipping unsafe entry name {:?} in {:?}", entry.name(), archive);
                    failed = true;
                    continue;
                }
            };
            let target = out_dir.join(relative);
            let written = if entry.is_dir() {
                fs::create_dir_all(&target)
            } else {
                target
                    .parent()
                    .map(fs::create_dir_all)
                    .unwrap_or(Ok(()))
                    .and_then(|_| fs::File::create(&target))
                    .and_then(|mut out| std::io::copy(&mut entry, &mut out).map(|_| ()))
            };
            if let Err(e) = written {
                debug!("failed to extract {:?}: {}", target, e);
                failed = true;
            }
        }

        if failed {
            UnpackOutcome::Failed(None)
        } else {
            UnpackOutcome::Success
        }
    }
}
