use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::{ExtractArgs, OcrMode};
use crate::config;
use crate::events::TracingEvents;
use crate::extract::{PdftotextExtractor, TesseractOcr, collect_tool_versions};
use crate::model::{DocumentReport, ExtractCounts, ExtractRunManifest, RunPaths};
use crate::pipeline::{
    CancellationFlag, DocumentOutcome, DocumentPipeline, DocumentSource, OcrEngine,
};
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
};

pub fn run(args: ExtractArgs) -> Result<()> {
    run_with_cancellation(args, &CancellationFlag::new())
}

/// Batch driver. Cancellation is cooperative: the current document is
/// finished, remaining documents are skipped and counted.
pub fn run_with_cancellation(args: ExtractArgs, cancellation: &CancellationFlag) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let mut config = config::load_config(args.config_path.as_deref())?;
    config::apply_threshold_override(&mut config, args.quality_threshold)?;

    ensure_directory(&args.output_dir)?;
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.output_dir.join("manifests").join(format!(
            "extract_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });

    let tool_versions = collect_tool_versions()?;

    info!(
        input_dir = %args.input_dir.display(),
        run_id = %run_id,
        threshold = config.quality_threshold,
        ocr_mode = args.ocr_mode.as_str(),
        "starting extraction run"
    );

    let source = DirectorySource::new(args.input_dir.clone());
    let documents: Vec<PathBuf> = source.iter()?.collect();
    if documents.is_empty() {
        bail!("no PDFs found in {}", args.input_dir.display());
    }

    let extractor = PdftotextExtractor::new(args.max_pages_per_doc);
    let ocr_engine = match args.ocr_mode {
        OcrMode::Off => None,
        OcrMode::Auto => Some(TesseractOcr::new(
            args.ocr_lang.clone(),
            Duration::from_secs(args.ocr_timeout_secs),
            args.max_pages_per_doc,
        )),
    };
    let ocr = ocr_engine.as_ref().map(|engine| engine as &dyn OcrEngine);

    let events = TracingEvents;
    let pipeline = DocumentPipeline::new(&config, &extractor, ocr, &events);

    let mut counts = ExtractCounts {
        documents_total: documents.len(),
        ..ExtractCounts::default()
    };
    let mut reports = Vec::with_capacity(documents.len());
    let mut warnings = Vec::new();

    for path in &documents {
        if cancellation.is_cancelled() {
            counts.skipped_by_cancellation = documents.len() - reports.len();
            warnings.push(format!(
                "run cancelled; {} documents skipped",
                counts.skipped_by_cancellation
            ));
            warn!(
                skipped = counts.skipped_by_cancellation,
                "cancellation requested, stopping before next document"
            );
            break;
        }

        let report = process_document(
            &pipeline,
            path,
            &args.output_dir,
            &mut counts,
            &mut warnings,
        )?;
        reports.push(report);
    }

    let status = if cancellation.is_cancelled() {
        "cancelled"
    } else {
        "completed"
    };

    let manifest = ExtractRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        quality_threshold: config.quality_threshold,
        ocr_mode: args.ocr_mode.as_str().to_string(),
        tool_versions,
        paths: RunPaths {
            input_dir: args.input_dir.display().to_string(),
            output_dir: args.output_dir.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        counts,
        documents: reports,
        warnings,
    };

    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote extraction run manifest");
    info!(
        accepted = counts.accepted,
        rejected = counts.rejected_low_quality,
        failures = counts.extraction_failures,
        fallbacks = counts.ocr_fallbacks_attempted,
        "extraction run {status}"
    );

    Ok(())
}

fn process_document(
    pipeline: &DocumentPipeline,
    path: &Path,
    output_dir: &Path,
    counts: &mut ExtractCounts,
    warnings: &mut Vec<String>,
) -> Result<DocumentReport> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
    let source_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename.as_str())
        .to_string();

    let sha256 = match sha256_file(path) {
        Ok(digest) => digest,
        Err(error) => {
            counts.extraction_failures += 1;
            warn!(source_id = %source_id, error = %error, "unreadable source document");
            warnings.push(format!("{source_id}: {error}"));
            return Ok(failure_report(&source_id, &filename, String::new(), &error));
        }
    };

    match pipeline.process(&source_id, path) {
        Ok(document) => {
            if document.ocr_fallback_used {
                counts.ocr_fallbacks_attempted += 1;
            }
            if let Some(error) = &document.fallback_error {
                warnings.push(format!("{source_id}: {error}"));
            }

            let output_path = match document.outcome {
                DocumentOutcome::Accepted => {
                    counts.accepted += 1;
                    if document.ocr_fallback_used {
                        counts.ocr_fallback_recoveries += 1;
                    }

                    let output_path = output_text_path(output_dir, &source_id);
                    fs::write(&output_path, document.cleaned_text.as_deref().unwrap_or(""))
                        .with_context(|| {
                            format!("failed to write {}", output_path.display())
                        })?;
                    info!(
                        source_id = %source_id,
                        path = %output_path.display(),
                        "persisted cleaned text"
                    );
                    Some(output_path)
                }
                DocumentOutcome::RejectedLowQuality => {
                    counts.rejected_low_quality += 1;
                    None
                }
            };

            Ok(DocumentReport {
                source_id: document.source_id.clone(),
                filename,
                sha256,
                outcome: document.outcome.as_str().to_string(),
                quality_score: Some(document.quality_score),
                first_pass_score: Some(document.first_pass_score),
                ocr_fallback_used: document.ocr_fallback_used,
                reason: document.rejection_reason.map(|reason| reason.as_str().to_string()),
                output_path: output_path.map(|path| path.display().to_string()),
            })
        }
        Err(error) => {
            counts.extraction_failures += 1;
            warn!(source_id = %source_id, error = %error, "extraction failed");
            warnings.push(format!("{source_id}: {error}"));
            Ok(failure_report(&source_id, &filename, sha256, &error))
        }
    }
}

fn failure_report(
    source_id: &str,
    filename: &str,
    sha256: String,
    error: &dyn std::fmt::Display,
) -> DocumentReport {
    DocumentReport {
        source_id: source_id.to_string(),
        filename: filename.to_string(),
        sha256,
        outcome: "extraction_failed".to_string(),
        quality_score: None,
        first_pass_score: None,
        ocr_fallback_used: false,
        reason: Some(error.to_string()),
        output_path: None,
    }
}

/// Deterministic artifact name: source extension replaced with `.txt`.
fn output_text_path(output_dir: &Path, source_id: &str) -> PathBuf {
    output_dir.join(format!("{source_id}.txt"))
}

/// Sorted, fresh directory listing on every call.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl DocumentSource for DirectorySource {
    fn iter(&self) -> Result<Box<dyn Iterator<Item = PathBuf>>> {
        let mut pdfs = Vec::new();

        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed to read {}", self.root.display()))?;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read entry in {}", self.root.display()))?;
            let path = entry.path();

            if !entry
                .file_type()
                .with_context(|| format!("failed to inspect file type: {}", path.display()))?
                .is_file()
            {
                continue;
            }

            let is_pdf = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if is_pdf {
                pdfs.push(path);
            }
        }

        pdfs.sort();
        Ok(Box::new(pdfs.into_iter()))
    }
}
