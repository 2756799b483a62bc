use crate::archive::{self, ArchiveDepth, ArchiveState};
use crate::audit::{AuditLog, FileReport, TextAuditLog};
use crate::config::{GroomerConfig, UnpackerKind};
use crate::models::{FileRecord, SafetyState};
use crate::{dispatch, fs_apply, integrity};
use anyhow::{bail, Context};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scanners::unpack::{SevenZipUnpacker, ZipUnpacker};
use scanners::Scanners;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GroomSummary {
    pub directories: usize,
    pub files: usize,
    pub normal: usize,
    pub dangerous: usize,
    pub unknown: usize,
    pub binary: usize,
    pub copied: usize,
    pub archives_extracted: usize,
    pub archive_bombs: usize,
    pub integrity_failures: usize,
    pub audit_failures: usize,
}

impl GroomSummary {
    fn record(&mut self, record: &FileRecord) {
        self.files += 1;
        match record.state() {
            SafetyState::Normal => self.normal += 1,
            SafetyState::Dangerous => self.dangerous += 1,
            SafetyState::Unknown => self.unknown += 1,
            SafetyState::Binary => self.binary += 1,
        }
        if record.copied {
            self.copied += 1;
        }
    }
}

/// Native scanners, with the archive unpacker picked from configuration.
pub fn build_scanners(config: &GroomerConfig) -> Scanners {
    let scanners = Scanners::native(config.image.clone());
    match config.archive.unpacker {
        UnpackerKind::SevenZip => scanners.with_unpacker(Arc::new(SevenZipUnpacker::new(
            config.archive.sevenzip_path.clone(),
        ))),
        UnpackerKind::Zip => scanners.with_unpacker(Arc::new(ZipUnpacker)),
    }
}

pub fn build_skip_set(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("bad skip pattern {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Walks a source tree and writes the sanitised copy to a destination.
pub struct Groomer<L: AuditLog> {
    src_root: PathBuf,
    dst_root: PathBuf,
    config: GroomerConfig,
    scanners: Scanners,
    log: L,
    rng: StdRng,
    skip: GlobSet,
    summary: GroomSummary,
}

impl<L: AuditLog> Groomer<L> {
    pub fn new(
        src_root: impl Into<PathBuf>,
        dst_root: impl Into<PathBuf>,
        config: GroomerConfig,
        scanners: Scanners,
        log: L,
    ) -> anyhow::Result<Self> {
        let skip = build_skip_set(&config.scan.skip)?;
        Ok(Self {
            src_root: src_root.into(),
            dst_root: dst_root.into(),
            config,
            scanners,
            log,
            rng: StdRng::from_entropy(),
            skip,
            summary: GroomSummary::default(),
        })
    }

    /// Replaces the sampling RNG, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn into_log(self) -> L {
        self.log
    }

    pub fn summary(&self) -> &GroomSummary {
        &self.summary
    }

    pub fn run(&mut self) -> anyhow::Result<GroomSummary> {
        if !self.src_root.is_dir() {
            bail!("source {:?} is not a directory", self.src_root);
        }
        info!(
            "Grooming {:?} into {:?} (archive depth {})",
            self.src_root, self.dst_root, self.config.archive.max_depth
        );
        self.log.add_root(&self.src_root)?;
        let mut depth = ArchiveDepth::new(self.config.archive.max_depth);
        let (src, dst) = (self.src_root.clone(), self.dst_root.clone());
        self.process_dir(&src, &dst, 0, &mut depth)?;
        debug_assert_eq!(depth.current(), 0);
        info!(
            "Groom complete. {} files, {} copied, {} dangerous.",
            self.summary.files, self.summary.copied, self.summary.dangerous
        );
        Ok(self.summary.clone())
    }

    /// Visits every entry below `src_dir` in case-insensitive name order.
    /// Files land at the same relative path under `dst_dir`.
    pub fn process_dir(
        &mut self,
        src_dir: &Path,
        dst_dir: &Path,
        log_depth: usize,
        depth: &mut ArchiveDepth,
    ) -> anyhow::Result<()> {
        let skip = self.skip.clone();
        let walker = WalkDir::new(src_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by(|a, b| {
                a.file_name()
                    .to_string_lossy()
                    .to_lowercase()
                    .cmp(&b.file_name().to_string_lossy().to_lowercase())
            })
            .into_iter()
            .filter_entry(move |e| {
                let skipped = skip.is_match(Path::new(e.file_name()));
                if skipped {
                    debug!("SKIPPING: {}", e.path().display());
                }
                !skipped
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("cannot read entry under {:?}: {}", src_dir, e);
                    continue;
                }
            };
            let relative = match entry.path().strip_prefix(src_dir) {
                Ok(r) => r.to_path_buf(),
                Err(_) => continue,
            };
            let entry_depth = log_depth + entry.depth() - 1;
            if entry.file_type().is_dir() {
                self.summary.directories += 1;
                if let Err(e) = self.log.add_dir(entry.path(), entry_depth) {
                    warn!("audit log rejected {:?}: {:#}", entry.path(), e);
                }
                continue;
            }
            let mimetype = self.scanners.sniffer.sniff(entry.path());
            let record = FileRecord::new(
                entry.path().to_path_buf(),
                dst_dir.join(&relative),
                mimetype,
            );
            self.process_file(record, entry_depth, depth)?;
        }
        Ok(())
    }

    /// Validation, sampling, type handling, then copy or recursion.
    pub fn process_file(
        &mut self,
        mut record: FileRecord,
        log_depth: usize,
        depth: &mut ArchiveDepth,
    ) -> anyhow::Result<()> {
        record.check();
        if record.dst_path.starts_with(self.log_dir()) {
            warn!("{:?} maps into the log directory, not copying", record.src_path);
            record.make_dangerous("File would be written into the groomer log directory");
            self.finish(record, log_depth);
            return Ok(());
        }
        if let Err(e) = integrity::capture(&mut record, &self.config.integrity, &mut self.rng) {
            record.add_error("integrity", format!("sampling failed: {}", e));
        }
        dispatch::dispatch(
            &mut record,
            &self.scanners,
            self.config.scratch_dir.as_deref(),
        );

        if record.is_archive {
            return self.process_archive(record, log_depth, depth);
        }
        if record.should_copy {
            self.copy_record(&mut record);
        }
        self.finish(record, log_depth);
        Ok(())
    }

    fn process_archive(
        &mut self,
        mut record: FileRecord,
        log_depth: usize,
        depth: &mut ArchiveDepth,
    ) -> anyhow::Result<()> {
        let state = ArchiveState::Inspecting.step(depth);
        debug!(
            "{} -> {:?} at depth {}/{}",
            record.filename,
            state,
            depth.current(),
            depth.max()
        );
        let result = match state {
            ArchiveState::Bomb => {
                record.make_dangerous("Archive bomb");
                record.should_copy = true;
                self.summary.archive_bombs += 1;
                self.copy_record(&mut record);
                self.finish(record, log_depth);
                Ok(())
            }
            _ => self.extract_archive(record, log_depth, depth),
        };
        let state = state.step(depth);
        debug_assert_eq!(state, ArchiveState::Done);
        result
    }

    fn extract_archive(
        &mut self,
        mut record: FileRecord,
        log_depth: usize,
        depth: &mut ArchiveDepth,
    ) -> anyhow::Result<()> {
        let scratch =
            match fs_apply::scratch_dir(self.config.scratch_dir.as_deref(), "groomer-archive-") {
                Ok(dir) => dir,
                Err(e) => {
                    warn!("no scratch space for {}: {}", record.filename, e);
                    record.add_error("scratch", e.to_string());
                    self.finish(record, log_depth);
                    return Ok(());
                }
            };
        let outcome = self.scanners.unpacker.unpack(
            &record.src_path,
            scratch.path(),
            self.config.archive.timeout(),
        );
        match archive::describe_outcome(&outcome) {
            Some(msg) => {
                warn!("unpacking {} was incomplete: {}", record.filename, msg);
                record.add_error("unpack", msg);
            }
            None => debug!("unpacked {} into {:?}", record.filename, scratch.path()),
        }
        if archive::is_unreadable(&outcome, scratch.path()) {
            record.make_dangerous("Unreadable archive");
            record.should_copy = true;
            self.copy_record(&mut record);
            if let Err(e) = scratch.close() {
                warn!("failed to remove scratch dir: {}", e);
            }
            self.finish(record, log_depth);
            return Ok(());
        }
        self.summary.archives_extracted += 1;

        let archive_dst = record.dst_path.clone();
        self.finish(record, log_depth);
        let result = self.process_dir(scratch.path(), &archive_dst, log_depth + 1, depth);
        if let Err(e) = scratch.close() {
            warn!("failed to remove scratch dir: {}", e);
        }
        result
    }

    fn copy_record(&mut self, record: &mut FileRecord) {
        match fs_apply::safe_copy(&record.src_path, &record.dst_path) {
            Ok(()) => {
                record.copied = true;
                if !integrity::verify_copy(record) {
                    self.summary.integrity_failures += 1;
                }
            }
            Err(e) => {
                warn!("copy of {} failed: {}", record.filename, e);
                record.add_error("copy", e.to_string());
                record.copied = false;
            }
        }
    }

    /// Counts and logs a finished record. A failing audit sink is reported
    /// for that entry and the walk goes on.
    fn finish(&mut self, record: FileRecord, log_depth: usize) {
        self.summary.record(&record);
        let report = FileReport::from_record(&record);
        if let Err(e) = self.log.add_file(&report, log_depth) {
            warn!("audit log rejected {}: {:#}", report.filename, e);
            self.summary.audit_failures += 1;
        }
    }

    fn log_dir(&self) -> PathBuf {
        self.dst_root.join(&self.config.log.dir_name)
    }
}

/// Grooms `src` into `dst` with the text audit log, off the async runtime.
pub async fn run(
    src: PathBuf,
    dst: PathBuf,
    config: GroomerConfig,
) -> anyhow::Result<GroomSummary> {
    let scanners = build_scanners(&config);
    tokio::task::spawn_blocking(move || {
        let log = TextAuditLog::create(&dst, &config.log)?;
        let mut groomer = Groomer::new(src, dst, config, scanners, log)?;
        groomer.run()
    })
    .await
    .context("groom task panicked")?
}
