//! Screenshot to [`ScoreRecord`] pipeline.

use chrono::{DateTime, Utc};
use image::{ImageFormat, ImageReader, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::record::ScoreRecord;
use super::timestamp::resolve_created_at;
use crate::ocr::extract::{parse_center, parse_top_left};
use crate::ocr::players::parse_players;
use crate::ocr::preprocess::{crop_region, downscale_to_fit, segment, Region};
use crate::ocr::OcrEngine;

/// Failures that make a screenshot unusable. Missing OCR fields are not
/// errors; they produce a degraded record instead.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a PNG image (detected {detected})")]
    UnsupportedFormat { path: PathBuf, detected: String },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Turns results screenshots into score records using an OCR engine.
pub struct ScoreExtractor<E: OcrEngine> {
    engine: E,
    max_width: u32,
    max_height: u32,
}

impl<E: OcrEngine> ScoreExtractor<E> {
    /// Images larger than `max_width` x `max_height` are scaled down before
    /// recognition. A zero maximum disables scaling.
    pub fn new(engine: E, max_width: u32, max_height: u32) -> Self {
        Self {
            engine,
            max_width,
            max_height,
        }
    }

    #[cfg(test)]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Reads one screenshot from disk and extracts its score record.
    pub fn extract(&self, path: &Path) -> Result<ScoreRecord, ExtractError> {
        let io_error = |source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        };

        let created_at = resolve_created_at(path).map_err(io_error)?;

        // Sniff the content; the extension alone is not trusted
        let file = File::open(path).map_err(io_error)?;
        let reader = ImageReader::new(BufReader::new(file))
            .with_guessed_format()
            .map_err(io_error)?;
        match reader.format() {
            Some(ImageFormat::Png) => {}
            other => {
                return Err(ExtractError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    detected: other
                        .map(|f| format!("{:?}", f))
                        .unwrap_or_else(|| "unknown".to_string()),
                });
            }
        }

        let img = reader
            .decode()
            .map_err(|source| ExtractError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();

        tracing::debug!(
            "Decoded {} ({}x{})",
            path.display(),
            img.width(),
            img.height()
        );

        let img = downscale_to_fit(img, self.max_width, self.max_height);
        Ok(self.extract_from_image(&img, created_at))
    }

    /// Extracts a score record from pixels already in memory.
    pub fn extract_from_image(&self, img: &RgbaImage, created_at: DateTime<Utc>) -> ScoreRecord {
        let regions = segment(img.width(), img.height());

        let top_left = parse_top_left(&self.read_region(img, &regions.top_left, "top-left"));
        let center = parse_center(&self.read_region(img, &regions.center, "center"));
        let players = parse_players(&self.read_region(img, &regions.players, "players"));

        let record = ScoreRecord {
            artist: top_left.artist,
            song_name: top_left.song_name,
            charter: top_left.charter,
            total_score: center.total_score,
            stars_achieved: center.stars,
            players,
            created_at,
        };

        if record.is_degraded() {
            tracing::warn!(
                "OCR could not read most fields (missing: {}), check image quality",
                record.missing_fields().join(", ")
            );
        }

        record
    }

    fn read_region(&self, img: &RgbaImage, region: &Region, label: &str) -> String {
        if region.is_empty() {
            tracing::debug!("Skipping empty {} region", label);
            return String::new();
        }
        let cropped = crop_region(img, region);
        let text = self.engine.recognize(&cropped);
        tracing::debug!("{} region text: {:?}", label, text);
        text
    }
}
