//! Configuration types for ingestion.
//!
//! Loads settings from config.json at startup, then applies environment
//! overrides. Every field has a default so a partial or missing file works.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::paths;

/// Environment variable naming an explicit config file.
const CONFIG_PATH_VAR: &str = "CLONEHERO_CONFIG";

/// Tesseract settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit Tesseract executable; searched for when unset
    pub tesseract_path: Option<PathBuf>,
    /// Explicit directory holding `<language>.traineddata`
    pub tessdata_dir: Option<PathBuf>,
    pub language: String,
    /// Tesseract page segmentation mode (6 = single uniform block of text)
    pub page_seg_mode: u8,
    /// Fetch missing language data from the tessdata repository
    pub download_tessdata: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            page_seg_mode: 6,
            download_tessdata: true,
        }
    }
}

/// Complete ingestion configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory Clone Hero writes screenshots to
    pub watch_dir: PathBuf,
    /// Successfully ingested files move here; left in place when unset
    pub processed_dir: Option<PathBuf>,
    /// Files that failed ingestion move here; left in place when unset
    pub failed_dir: Option<PathBuf>,
    /// CSV file scores are appended to
    pub score_log: PathBuf,
    pub max_image_width: u32,
    pub max_image_height: u32,
    /// Directory listing interval (milliseconds)
    pub poll_interval_ms: u64,
    /// Delay between detecting a file and reading it (milliseconds)
    pub debounce_ms: u64,
    /// Number of files processed concurrently
    pub workers: usize,
    /// Files waiting for a worker before discovery blocks
    pub queue_capacity: usize,
    pub ocr: OcrConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            watch_dir: paths::default_screenshots_dir(),
            processed_dir: None,
            failed_dir: None,
            score_log: paths::default_score_log(),
            max_image_width: 1920,
            max_image_height: 1080,
            poll_interval_ms: 5000,
            debounce_ms: 500,
            workers: 2,
            queue_capacity: 64,
            ocr: OcrConfig::default(),
        }
    }
}

impl IngestConfig {
    /// Applies overrides from `lookup` (normally the process environment).
    /// Unparsable numbers are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("WATCH_DIR").filter(|v| !v.is_empty()) {
            self.watch_dir = PathBuf::from(dir);
        }
        // Empty string unsets the optional directories
        if let Some(dir) = lookup("PROCESSED_DIR") {
            self.processed_dir = non_empty_path(dir);
        }
        if let Some(dir) = lookup("FAILED_DIR") {
            self.failed_dir = non_empty_path(dir);
        }
        if let Some(path) = lookup("SCORE_LOG").filter(|v| !v.is_empty()) {
            self.score_log = PathBuf::from(path);
        }

        override_number(&lookup, "MAX_IMAGE_WIDTH", &mut self.max_image_width);
        override_number(&lookup, "MAX_IMAGE_HEIGHT", &mut self.max_image_height);
        override_number(&lookup, "POLL_INTERVAL_MS", &mut self.poll_interval_ms);
        override_number(&lookup, "DEBOUNCE_MS", &mut self.debounce_ms);
        override_number(&lookup, "WORKERS", &mut self.workers);

        if let Some(path) = lookup("TESSERACT_PATH") {
            self.ocr.tesseract_path = non_empty_path(path);
        }
        if let Some(dir) = lookup("TESSDATA_DIR") {
            self.ocr.tessdata_dir = non_empty_path(dir);
        }
        if let Some(language) = lookup("OCR_LANGUAGE").filter(|v| !v.is_empty()) {
            self.ocr.language = language;
        }
    }

    /// Makes every directory and file path absolute and lexically clean.
    pub fn normalize_paths(&mut self) {
        self.watch_dir = paths::normalize_path(&self.watch_dir);
        self.processed_dir = self.processed_dir.as_deref().map(paths::normalize_path);
        self.failed_dir = self.failed_dir.as_deref().map(paths::normalize_path);
        self.score_log = paths::normalize_path(&self.score_log);
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn override_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!("Ignoring {}={:?}: not a valid number", name, raw),
    }
}

/// Reads a config file, falling back to defaults when it is missing or
/// unparsable.
pub fn load_config_file(config_path: &Path) -> IngestConfig {
    tracing::info!("Looking for config at: {}", config_path.display());

    if !config_path.exists() {
        tracing::info!("config.json not found. Using default config.");
        return IngestConfig::default();
    }

    match fs::read_to_string(config_path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Config loaded from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}. Using defaults.", config_path.display(), e);
                IngestConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read {}: {}. Using defaults.", config_path.display(), e);
            IngestConfig::default()
        }
    }
}

/// Loads the effective configuration: config file, then environment
/// overrides, then path normalization.
pub fn load_config() -> IngestConfig {
    let config_path = std::env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .or_else(|| paths::config_candidates().into_iter().find(|p| p.exists()))
        .unwrap_or_else(|| paths::get_exe_dir().join("config.json"));

    let mut config = load_config_file(&config_path);
    config.apply_env_overrides(|name| std::env::var(name).ok());
    config.normalize_paths();
    config
}
