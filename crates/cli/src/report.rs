use anyhow::Result;
use groomer_core::config::{GroomerConfig, UnpackerKind};
use groomer_core::GroomSummary;

/// Applies command line overrides on top of the loaded configuration.
pub fn apply_overrides(
    mut cfg: GroomerConfig,
    max_depth: Option<usize>,
    unpacker: Option<UnpackerKind>,
) -> GroomerConfig {
    if let Some(depth) = max_depth {
        cfg.archive.max_depth = depth;
    }
    if let Some(kind) = unpacker {
        cfg.archive.unpacker = kind;
    }
    cfg
}

pub fn render_summary(summary: &GroomSummary, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(summary)?);
    }
    let mut out = String::new();
    out.push_str(&format!(
        "Files: {} (dirs: {})\n",
        summary.files, summary.directories
    ));
    out.push_str(&format!(
        "Normal: {}  Dangerous: {}  Unknown: {}  Binary: {}\n",
        summary.normal, summary.dangerous, summary.unknown, summary.binary
    ));
    out.push_str(&format!("Copied: {}\n", summary.copied));
    out.push_str(&format!(
        "Archives extracted: {}  Archive bombs: {}\n",
        summary.archives_extracted, summary.archive_bombs
    ));
    if summary.integrity_failures > 0 {
        out.push_str(&format!(
            "Integrity failures: {}\n",
            summary.integrity_failures
        ));
    }
    if summary.audit_failures > 0 {
        out.push_str(&format!("Audit log failures: {}\n", summary.audit_failures));
    }
    Ok(out)
}
