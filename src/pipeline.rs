use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::events::PipelineEvents;
use crate::quality::{clean_text, count_words, repair_text};

/// The source document could not be read or parsed at all. Fatal for that
/// document only; the batch records it and moves on.
#[derive(Debug, Error)]
#[error("failed to extract text from {path}: {reason}")]
pub struct ExtractionError {
    pub path: PathBuf,
    pub reason: String,
}

/// Fallback extraction failures. Both variants terminate the document as
/// rejected; neither is fatal to the batch.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("ocr engine unavailable: {0}")]
    Unavailable(String),
    #[error("ocr timed out after {0:?}")]
    Timeout(Duration),
}

/// Produces ordered per-page text for one document.
pub trait PageExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError>;
}

/// Fallback text producer for documents whose text layer fails the quality
/// threshold.
pub trait OcrEngine {
    fn ocr_extract(&self, path: &Path) -> Result<String, OcrError>;
}

/// Finite, restartable producer of input documents. Every call to `iter`
/// yields a fresh listing; the pipeline never scans directories itself.
pub trait DocumentSource {
    fn iter(&self) -> anyhow::Result<Box<dyn Iterator<Item = PathBuf>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOutcome {
    Accepted,
    RejectedLowQuality,
}

impl DocumentOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::RejectedLowQuality => "rejected_low_quality",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPass {
    TextLayer,
    OcrFallback,
}

impl ExtractionPass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextLayer => "text_layer",
            Self::OcrFallback => "ocr_fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    LowQuality,
    OcrUnavailable,
    OcrTimeout,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowQuality => "low_quality",
            Self::OcrUnavailable => "ocr_unavailable",
            Self::OcrTimeout => "ocr_timeout",
        }
    }
}

/// Terminal per-document result. `cleaned_text` is present iff the
/// document was accepted.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub source_id: String,
    pub outcome: DocumentOutcome,
    pub quality_score: f64,
    pub first_pass_score: f64,
    pub cleaned_text: Option<String>,
    pub ocr_fallback_used: bool,
    pub rejection_reason: Option<RejectionReason>,
    pub fallback_error: Option<String>,
}

/// Cooperative cancellation between documents: the batch finishes the
/// current document and stops before starting the next.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

struct Evaluation {
    repaired_text: String,
    score: f64,
}

/// Per-document flow: extract -> repair -> score -> accept/fallback/reject.
/// The OCR fallback runs at most once per document; with no engine
/// configured, a failing document is rejected directly.
pub struct DocumentPipeline<'a> {
    config: &'a PipelineConfig,
    extractor: &'a dyn PageExtractor,
    ocr: Option<&'a dyn OcrEngine>,
    events: &'a dyn PipelineEvents,
}

impl<'a> DocumentPipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        extractor: &'a dyn PageExtractor,
        ocr: Option<&'a dyn OcrEngine>,
        events: &'a dyn PipelineEvents,
    ) -> Self {
        Self {
            config,
            extractor,
            ocr,
            events,
        }
    }

    pub fn process(
        &self,
        source_id: &str,
        path: &Path,
    ) -> Result<ProcessedDocument, ExtractionError> {
        let pages = self.extractor.extract_pages(path)?;
        let raw_text = join_pages(&pages);

        let first = self.evaluate(source_id, ExtractionPass::TextLayer, &raw_text);
        if self.passes(&first) {
            return Ok(self.accept(source_id, first.score, &first, false));
        }

        let Some(ocr) = self.ocr else {
            return Ok(self.reject(
                source_id,
                first.score,
                first.score,
                false,
                RejectionReason::LowQuality,
                None,
            ));
        };

        self.events.fallback_started(source_id);
        match ocr.ocr_extract(path) {
            Ok(fallback_raw) => {
                let second = self.evaluate(source_id, ExtractionPass::OcrFallback, &fallback_raw);
                if self.passes(&second) {
                    Ok(self.accept(source_id, first.score, &second, true))
                } else {
                    Ok(self.reject(
                        source_id,
                        first.score,
                        second.score,
                        true,
                        RejectionReason::LowQuality,
                        None,
                    ))
                }
            }
            Err(error) => {
                let reason = match &error {
                    OcrError::Unavailable(_) => RejectionReason::OcrUnavailable,
                    OcrError::Timeout(_) => RejectionReason::OcrTimeout,
                };
                Ok(self.reject(
                    source_id,
                    first.score,
                    first.score,
                    true,
                    reason,
                    Some(error.to_string()),
                ))
            }
        }
    }

    fn evaluate(&self, source_id: &str, pass: ExtractionPass, raw_text: &str) -> Evaluation {
        let repaired_text = repair_text(self.config, raw_text);
        let counts = count_words(&self.config.policy, &repaired_text, self.events);
        let score = counts.score();
        self.events.document_scored(source_id, pass.as_str(), score);

        Evaluation {
            repaired_text,
            score,
        }
    }

    // Strict greater-than: a score equal to the threshold is rejected.
    fn passes(&self, evaluation: &Evaluation) -> bool {
        evaluation.score > self.config.quality_threshold
    }

    fn accept(
        &self,
        source_id: &str,
        first_pass_score: f64,
        evaluation: &Evaluation,
        ocr_fallback_used: bool,
    ) -> ProcessedDocument {
        let cleaned = clean_text(&self.config.policy, &evaluation.repaired_text);
        self.events.document_accepted(source_id, evaluation.score);

        ProcessedDocument {
            source_id: source_id.to_string(),
            outcome: DocumentOutcome::Accepted,
            quality_score: evaluation.score,
            first_pass_score,
            cleaned_text: Some(cleaned),
            ocr_fallback_used,
            rejection_reason: None,
            fallback_error: None,
        }
    }

    fn reject(
        &self,
        source_id: &str,
        first_pass_score: f64,
        quality_score: f64,
        ocr_fallback_used: bool,
        reason: RejectionReason,
        fallback_error: Option<String>,
    ) -> ProcessedDocument {
        self.events
            .document_rejected(source_id, quality_score, reason.as_str());

        ProcessedDocument {
            source_id: source_id.to_string(),
            outcome: DocumentOutcome::RejectedLowQuality,
            quality_score,
            first_pass_score,
            cleaned_text: None,
            ocr_fallback_used,
            rejection_reason: Some(reason),
            fallback_error,
        }
    }
}

/// Pages arrive in page order; the joined document keeps one newline
/// between consecutive pages.
fn join_pages(pages: &[String]) -> String {
    pages.join("\n")
}
