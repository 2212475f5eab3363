use std::fs;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cli::ScoreArgs;
use crate::config;
use crate::events::TracingEvents;
use crate::quality::{count_words, repair_text};

#[derive(Debug, Serialize)]
struct ScoreReport {
    path: String,
    words_total: usize,
    invalid_words: usize,
    quality_score: f64,
    quality_threshold: f64,
    would_accept: bool,
}

/// Scores one already-extracted text file and prints a JSON report. Useful
/// for tuning the threshold against a known corpus.
pub fn run(args: ScoreArgs) -> Result<()> {
    let mut config = config::load_config(args.config_path.as_deref())?;
    config::apply_threshold_override(&mut config, args.quality_threshold)?;

    let raw = fs::read(&args.text_path)
        .with_context(|| format!("failed to read {}", args.text_path.display()))?;
    // Malformed byte sequences are recovered, not fatal.
    let text = String::from_utf8_lossy(&raw);

    let repaired = repair_text(&config, &text);
    let counts = count_words(&config.policy, &repaired, &TracingEvents);
    let score = counts.score();

    let report = ScoreReport {
        path: args.text_path.display().to_string(),
        words_total: counts.total(),
        invalid_words: counts.invalid,
        quality_score: score,
        quality_threshold: config.quality_threshold,
        would_accept: score > config.quality_threshold,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
