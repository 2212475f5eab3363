use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::model::ToolVersions;
use crate::pipeline::{ExtractionError, OcrEngine, OcrError, PageExtractor};

/// Text-layer extraction through `pdftotext`. Produces one string per
/// page, in page order.
pub struct PdftotextExtractor {
    max_pages: Option<usize>,
}

impl PdftotextExtractor {
    pub fn new(max_pages: Option<usize>) -> Self {
        Self { max_pages }
    }
}

impl PageExtractor for PdftotextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractionError> {
        let mut command = Command::new("pdftotext");
        command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
        if let Some(max_pages) = self.max_pages {
            command.arg("-l").arg(max_pages.to_string());
        }
        command.arg(path).arg("-");

        let output = command.output().map_err(|error| ExtractionError {
            path: path.to_path_buf(),
            reason: format!("failed to execute pdftotext: {error}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError {
                path: path.to_path_buf(),
                reason: format!("pdftotext exited with {}: {}", output.status, stderr.trim()),
            });
        }

        // Malformed byte sequences are recovered lossily at this boundary,
        // never surfaced as faults; the replacement characters they leave
        // behind are scored like any other invalid character.
        let raw = String::from_utf8_lossy(&output.stdout);
        let mut pages: Vec<String> = raw
            .split('\u{000C}')
            .map(|chunk| chunk.replace('\u{0000}', ""))
            .collect();

        while let Some(last_page) = pages.last() {
            if last_page.trim().is_empty() {
                pages.pop();
                continue;
            }
            break;
        }

        Ok(pages)
    }
}

/// Fallback re-extraction through `pdftoppm` + `tesseract`, all pages
/// under one global deadline.
pub struct TesseractOcr {
    lang: String,
    timeout: Duration,
    max_pages: Option<usize>,
}

impl TesseractOcr {
    pub fn new(lang: impl Into<String>, timeout: Duration, max_pages: Option<usize>) -> Self {
        Self {
            lang: lang.into(),
            timeout,
            max_pages,
        }
    }

    fn rasterize_pages(
        &self,
        path: &Path,
        raster_dir: &Path,
        deadline: Instant,
    ) -> Result<Vec<PathBuf>, OcrError> {
        let output_root = raster_dir.join("page");

        let mut command = Command::new("pdftoppm");
        command.arg("-png").arg("-f").arg("1");
        if let Some(max_pages) = self.max_pages {
            command.arg("-l").arg(max_pages.to_string());
        }
        command.arg(path).arg(&output_root);

        let output = run_until(command, deadline, self.timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Unavailable(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let mut rasters = Vec::new();
        let entries = std::fs::read_dir(raster_dir).map_err(|error| {
            OcrError::Unavailable(format!("failed to list raster directory: {error}"))
        })?;
        for entry in entries {
            let entry = entry.map_err(|error| {
                OcrError::Unavailable(format!("failed to read raster entry: {error}"))
            })?;
            let raster = entry.path();
            if raster.extension().and_then(|ext| ext.to_str()) == Some("png") {
                rasters.push(raster);
            }
        }
        rasters.sort();

        Ok(rasters)
    }
}

impl OcrEngine for TesseractOcr {
    fn ocr_extract(&self, path: &Path) -> Result<String, OcrError> {
        if !command_available("pdftoppm") || !command_available("tesseract") {
            return Err(OcrError::Unavailable(
                "pdftoppm/tesseract not found on PATH".to_string(),
            ));
        }

        let deadline = Instant::now() + self.timeout;
        let raster_dir = TempDir::new().map_err(|error| {
            OcrError::Unavailable(format!("failed to create scratch directory: {error}"))
        })?;

        let rasters = self.rasterize_pages(path, raster_dir.path(), deadline)?;
        if rasters.is_empty() {
            return Err(OcrError::Unavailable(format!(
                "pdftoppm produced no page images for {}",
                path.display()
            )));
        }

        let mut page_texts = Vec::with_capacity(rasters.len());
        for raster in rasters {
            let mut command = Command::new("tesseract");
            command.arg(&raster).arg("stdout").arg("-l").arg(&self.lang);

            let output = run_until(command, deadline, self.timeout)?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(OcrError::Unavailable(format!(
                    "tesseract exited with {} on {}: {}",
                    output.status,
                    raster.display(),
                    stderr.trim()
                )));
            }

            page_texts.push(
                String::from_utf8_lossy(&output.stdout)
                    .replace('\u{0000}', "")
                    .trim()
                    .to_string(),
            );
        }

        Ok(page_texts.join("\n"))
    }
}

/// Runs a child process, killing it once the deadline passes.
fn run_until(
    mut command: Command,
    deadline: Instant,
    timeout: Duration,
) -> Result<Output, OcrError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let program = command.get_program().to_string_lossy().to_string();
    let mut child = command
        .spawn()
        .map_err(|error| OcrError::Unavailable(format!("failed to spawn {program}: {error}")))?;

    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OcrError::Timeout(timeout));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OcrError::Unavailable(format!(
                    "failed to poll {program}: {error}"
                )));
            }
        }
    }

    child
        .wait_with_output()
        .map_err(|error| OcrError::Unavailable(format!("failed to collect {program}: {error}")))
}

pub fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

pub fn collect_tool_versions() -> Result<ToolVersions> {
    Ok(ToolVersions {
        pdftotext: command_version("pdftotext", &["-v"])?,
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        tesseract: command_version_optional("tesseract", &["--version"]),
    })
}

fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    first_version_line(&output)
}

fn command_version(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to run {} {}", program, args.join(" ")))?;

    match first_version_line(&output) {
        Some(line) => Ok(line.to_string()),
        None => bail!("{} reported no version", program),
    }
}

// Version banners land on stdout or stderr depending on the tool.
fn first_version_line(output: &Output) -> Option<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr
    } else {
        stdout
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_available_is_false_for_missing_programs() {
        assert!(!command_available("papertext-no-such-tool"));
    }

    #[test]
    fn run_until_collects_output_of_fast_commands() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("echo ready");

        let deadline = Instant::now() + Duration::from_secs(10);
        let output = run_until(command, deadline, Duration::from_secs(10)).expect("command runs");

        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ready");
    }

    #[test]
    fn run_until_kills_commands_past_the_deadline() {
        let mut command = Command::new("sh");
        command.arg("-c").arg("sleep 30");

        let deadline = Instant::now() + Duration::from_millis(100);
        let error = run_until(command, deadline, Duration::from_millis(100))
            .expect_err("deadline fires");

        assert!(matches!(error, OcrError::Timeout(_)));
    }
}
