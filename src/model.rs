use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersions {
    pub pdftotext: String,
    pub pdftoppm: Option<String>,
    pub tesseract: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPaths {
    pub input_dir: String,
    pub output_dir: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExtractCounts {
    pub documents_total: usize,
    pub accepted: usize,
    pub rejected_low_quality: usize,
    pub extraction_failures: usize,
    pub ocr_fallbacks_attempted: usize,
    pub ocr_fallback_recoveries: usize,
    pub skipped_by_cancellation: usize,
}

/// One entry per input document, terminal outcomes only; nothing is
/// silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source_id: String,
    pub filename: String,
    pub sha256: String,
    pub outcome: String,
    pub quality_score: Option<f64>,
    pub first_pass_score: Option<f64>,
    pub ocr_fallback_used: bool,
    pub reason: Option<String>,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub quality_threshold: f64,
    pub ocr_mode: String,
    pub tool_versions: ToolVersions,
    pub paths: RunPaths,
    pub counts: ExtractCounts,
    pub documents: Vec<DocumentReport>,
    pub warnings: Vec<String>,
}
