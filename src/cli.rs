use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "papertext",
    version,
    about = "Scientific PDF text extraction with quality gating"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract and quality-gate a directory of PDFs
    Extract(ExtractArgs),
    /// Score a single extracted text file
    Score(ScoreArgs),
    /// Summarize the most recent extraction run
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub config_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub quality_threshold: Option<f64>,

    #[arg(long)]
    pub max_pages_per_doc: Option<usize>,

    #[arg(long, value_enum, default_value_t = OcrMode::Auto)]
    pub ocr_mode: OcrMode,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long, default_value_t = 120)]
    pub ocr_timeout_secs: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrMode {
    Off,
    Auto,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long)]
    pub text_path: PathBuf,

    #[arg(long)]
    pub config_path: Option<PathBuf>,

    #[arg(long)]
    pub quality_threshold: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long)]
    pub output_dir: PathBuf,
}
