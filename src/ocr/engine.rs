use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

use super::setup::{self, TesseractPaths};
use crate::config::OcrConfig;

/// Text recognition for one image region.
///
/// Implementations return an empty string when recognition fails; callers
/// treat that as "no data", never as an error.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, region: &RgbaImage) -> String;
}

/// Runs the Tesseract CLI on each region.
///
/// Region images are written to a scratch directory owned by the engine;
/// the directory is removed when the engine is dropped.
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: PathBuf,
    language: String,
    page_seg_mode: u8,
    scratch: TempDir,
}

impl TesseractEngine {
    /// Locates Tesseract and its language data, then creates the scratch directory.
    pub fn locate(config: &OcrConfig) -> Result<Self> {
        let TesseractPaths {
            executable,
            tessdata,
        } = setup::ensure_tesseract(config)?;

        Self::new(executable, tessdata, &config.language, config.page_seg_mode)
    }

    pub fn new(
        executable: PathBuf,
        tessdata: PathBuf,
        language: &str,
        page_seg_mode: u8,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("clonehero-ocr-")
            .tempdir()
            .context("Failed to create OCR scratch directory")?;

        tracing::info!(
            "OCR engine ready: {} (tessdata: {}, lang: {}, psm: {})",
            executable.display(),
            tessdata.display(),
            language,
            page_seg_mode
        );

        Ok(Self {
            executable,
            tessdata,
            language: language.to_string(),
            page_seg_mode,
            scratch,
        })
    }

    #[cfg(test)]
    pub fn scratch_dir(&self) -> &std::path::Path {
        self.scratch.path()
    }

    fn run(&self, region: &RgbaImage) -> Result<String> {
        // Unique file per call, recognition may run on several workers at once
        let input = tempfile::Builder::new()
            .prefix("region-")
            .suffix(".png")
            .tempfile_in(self.scratch.path())
            .context("Failed to create region image file")?;
        region
            .save_with_format(input.path(), ImageFormat::Png)
            .context("Failed to encode region image")?;

        let output = Command::new(&self.executable)
            .arg(input.path())
            .arg("stdout")
            .arg("--tessdata-dir")
            .arg(&self.tessdata)
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.page_seg_mode.to_string())
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Tesseract failed: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, region: &RgbaImage) -> String {
        let (width, height) = region.dimensions();
        if width == 0 || height == 0 {
            tracing::warn!("OCR called with an empty region");
            return String::new();
        }

        match self.run(region) {
            Ok(text) => {
                if text.trim().is_empty() {
                    tracing::warn!("OCR returned empty text for {}x{} region", width, height);
                } else {
                    tracing::debug!("OCR extracted {} bytes: {:?}", text.len(), preview(&text));
                }
                text
            }
            Err(e) => {
                tracing::error!("OCR failed for {}x{} region: {:#}", width, height, e);
                String::new()
            }
        }
    }
}

/// First 100 characters of recognized text, for log lines.
fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 100;
    let mut preview: String = text.chars().take(MAX_CHARS).collect();
    if text.chars().count() > MAX_CHARS {
        preview.push_str("...");
    }
    preview
}
