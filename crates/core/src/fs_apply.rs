use anyhow::Result;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::TempDir;

/// Copies `src` to `dst`, creating parent directories, and clears every
/// executable bit on the result.
pub fn safe_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    strip_exec_bits(dst)?;
    Ok(())
}

#[cfg(unix)]
pub fn strip_exec_bits(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() & !0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn strip_exec_bits(_path: &Path) -> Result<()> {
    Ok(())
}

/// Creates (or empties) `dir`.
pub fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Scratch directory under `root`, or the system temp dir.
pub fn scratch_dir(root: Option<&Path>, prefix: &str) -> io::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    match root {
        Some(r) => builder.tempdir_in(r),
        None => builder.tempdir(),
    }
}
