//! Random-offset sampling of a file before its copy, compared against the
//! destination afterwards to catch the source being swapped in between.

use crate::config::IntegrityConfig;
use crate::models::{FileRecord, IntegritySample};
use rand::Rng;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const MISMATCH_REASON: &str = "The copied file is different from the one checked, removing.";

const MIN_BLOCK: u64 = 16;
const MAX_BLOCK: u64 = 128;
const WHOLE_FILE_BELOW: u64 = 64;

/// Whether the record is sampled at all: existing regular files. Samples
/// are dropped again when the copy source is replaced by transcoded output.
pub fn applies_to(record: &FileRecord) -> bool {
    fs::symlink_metadata(&record.src_path)
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Block length for a file of `size` bytes. Never longer than the file.
pub fn block_length<R: Rng + ?Sized>(size: u64, rng: &mut R) -> u64 {
    if size < WHOLE_FILE_BELOW {
        size
    } else if size < MAX_BLOCK {
        rng.gen_range(MIN_BLOCK..=size)
    } else {
        rng.gen_range(MIN_BLOCK..=MAX_BLOCK)
    }
}

/// Records hashes of a few randomly placed blocks of the source file,
/// sleeping a random interval between reads.
pub fn capture<R: Rng + ?Sized>(
    record: &mut FileRecord,
    config: &IntegrityConfig,
    rng: &mut R,
) -> io::Result<()> {
    record.samples.clear();
    if !applies_to(record) {
        return Ok(());
    }
    let size = fs::metadata(&record.src_path)?.len();
    if size == 0 {
        return Ok(());
    }

    let len = block_length(size, rng);
    let (lo, hi) = ordered(config.min_samples as u64, config.max_samples as u64);
    let count = rng.gen_range(lo..=hi);
    let (delay_lo, delay_hi) = ordered(config.min_delay_ms, config.max_delay_ms);

    let mut file = fs::File::open(&record.src_path)?;
    for _ in 0..count {
        let offset = rng.gen_range(0..=size - len);
        let hash = hash_block(&mut file, offset, len)?;
        record.samples.push(IntegritySample {
            offset,
            len: len as usize,
            hash,
        });
        let delay = rng.gen_range(delay_lo..=delay_hi);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }
    }
    debug!(
        "captured {} samples of {} bytes from {}",
        record.samples.len(),
        len,
        record.filename
    );
    Ok(())
}

/// Re-reads every sample from `dst`. Returns `false` on the first mismatch.
pub fn verify(samples: &[IntegritySample], dst: &Path) -> io::Result<bool> {
    if samples.is_empty() {
        return Ok(true);
    }
    let mut file = fs::File::open(dst)?;
    for sample in samples {
        if hash_block(&mut file, sample.offset, sample.len as u64)? != sample.hash {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Checks the copied destination of `record`; on a mismatch the copy is
/// removed and the record marked dangerous. Returns whether the copy stands.
pub fn verify_copy(record: &mut FileRecord) -> bool {
    let verdict = match verify(&record.samples, &record.dst_path) {
        Ok(v) => v,
        Err(e) => {
            record.add_error("integrity", format!("cannot re-read destination: {}", e));
            false
        }
    };
    if verdict {
        return true;
    }

    warn!(
        "integrity check failed for {}, removing {:?}",
        record.filename, record.dst_path
    );
    if let Err(e) = fs::remove_file(&record.dst_path) {
        if e.kind() != io::ErrorKind::NotFound {
            record.add_error("remove", e.to_string());
        }
    }
    record.copied = false;
    record.make_dangerous(MISMATCH_REASON);
    false
}

fn hash_block(file: &mut fs::File, offset: u64, len: u64) -> io::Result<String> {
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(len as usize);
    file.by_ref().take(len).read_to_end(&mut buf)?;
    Ok(blake3::hash(&buf).to_hex().to_string())
}

fn ordered(a: u64, b: u64) -> (u64, u64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
