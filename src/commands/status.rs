use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::ExtractRunManifest;

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_dir = args.output_dir.join("manifests");

    let Some(latest) = latest_manifest_path(&manifest_dir)? else {
        warn!(path = %manifest_dir.display(), "no run manifests found");
        return Ok(());
    };

    let raw =
        fs::read(&latest).with_context(|| format!("failed to read {}", latest.display()))?;
    let manifest: ExtractRunManifest = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", latest.display()))?;

    info!(
        run_id = %manifest.run_id,
        status = %manifest.status,
        started_at = %manifest.started_at,
        updated_at = %manifest.updated_at,
        quality_threshold = manifest.quality_threshold,
        ocr_mode = %manifest.ocr_mode,
        documents_total = manifest.counts.documents_total,
        accepted = manifest.counts.accepted,
        rejected_low_quality = manifest.counts.rejected_low_quality,
        extraction_failures = manifest.counts.extraction_failures,
        ocr_fallbacks_attempted = manifest.counts.ocr_fallbacks_attempted,
        ocr_fallback_recoveries = manifest.counts.ocr_fallback_recoveries,
        "latest extraction run"
    );

    for warning in &manifest.warnings {
        warn!(warning = %warning, "run warning");
    }

    Ok(())
}

/// Run manifests embed a compact UTC timestamp, so the lexicographically
/// greatest filename is the most recent run.
fn latest_manifest_path(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.exists() {
        return Ok(None);
    }

    let entries = fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?;

    let mut manifests = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();

        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("extract_run_") && name.ends_with(".json"))
            .unwrap_or(false);
        if is_run_manifest {
            manifests.push(path);
        }
    }

    Ok(manifests.into_iter().max())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_manifest_path_prefers_newest_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir created");
        fs::write(dir.path().join("extract_run_20260101T000000Z.json"), b"{}")
            .expect("file written");
        fs::write(dir.path().join("extract_run_20260301T120000Z.json"), b"{}")
            .expect("file written");
        fs::write(dir.path().join("unrelated.json"), b"{}").expect("file written");

        let latest = latest_manifest_path(dir.path())
            .expect("listing succeeds")
            .expect("manifest found");
        assert!(
            latest
                .file_name()
                .and_then(|name| name.to_str())
                .expect("utf-8 name")
                .contains("20260301T120000Z")
        );
    }

    #[test]
    fn latest_manifest_path_is_none_for_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir created");
        let missing = dir.path().join("does-not-exist");

        assert!(
            latest_manifest_path(&missing)
                .expect("missing directory is not an error")
                .is_none()
        );
    }
}
