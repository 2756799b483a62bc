use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Resolves both roots and refuses layouts where one contains the other;
/// the walk would otherwise pick up its own output.
pub fn validate_roots(src: &Path, dst: &Path) -> Result<(PathBuf, PathBuf)> {
    if !src.is_dir() {
        bail!("source {} is not a directory", src.display());
    }
    let src = src.canonicalize()?;
    std::fs::create_dir_all(dst)?;
    let dst = dst.canonicalize()?;
    if dst.starts_with(&src) || src.starts_with(&dst) {
        bail!(
            "source {} and destination {} must not contain each other",
            src.display(),
            dst.display()
        );
    }
    Ok((src, dst))
}
