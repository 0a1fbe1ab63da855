//! Screenshot ingestion: extraction plus persistence.

pub mod extractor;
pub mod record;
pub mod timestamp;

pub use extractor::ScoreExtractor;

use anyhow::{Context, Result};
use std::path::Path;

use crate::ocr::OcrEngine;
use crate::store::ScoreStore;
use crate::watcher::FileHandler;

/// Watcher handler that extracts each screenshot and stores the result.
pub struct IngestHandler<E: OcrEngine, S: ScoreStore> {
    extractor: ScoreExtractor<E>,
    store: S,
}

impl<E: OcrEngine, S: ScoreStore> IngestHandler<E, S> {
    pub fn new(extractor: ScoreExtractor<E>, store: S) -> Self {
        Self { extractor, store }
    }
}

impl<E: OcrEngine, S: ScoreStore> FileHandler for IngestHandler<E, S> {
    fn handle(&self, path: &Path) -> Result<()> {
        let record = self
            .extractor
            .extract(path)
            .with_context(|| format!("Failed to extract score from {}", path.display()))?;

        let id = self
            .store
            .create_score(&record)
            .with_context(|| format!("Failed to store score from {}", path.display()))?;

        tracing::info!(
            "Stored score {}: {} - {} (total {}, {} players)",
            id,
            if record.artist.is_empty() { "?" } else { &record.artist },
            if record.song_name.is_empty() { "?" } else { &record.song_name },
            record
                .total_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "?".to_string()),
            record.players.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, RgbaImage};
    use std::sync::Mutex;
    use tempfile::tempdir;

    use crate::ingest::record::ScoreRecord;
    use crate::store::StoreError;

    struct ScriptedEngine;

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, region: &RgbaImage) -> String {
            match region.dimensions() {
                (60, 20) => "Artist\nSong".to_string(),
                (80, 25) => "1000".to_string(),
                _ => String::new(),
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<ScoreRecord>>,
        fail: bool,
    }

    impl ScoreStore for MemoryStore {
        fn create_score(&self, record: &ScoreRecord) -> Result<i64, StoreError> {
            if self.fail {
                return Err(StoreError::Io {
                    path: "memory".into(),
                    source: std::io::Error::other("store offline"),
                });
            }
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(records.len() as i64)
        }
    }

    fn write_screenshot(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("clonehero-20251212052231.png");
        let img: RgbaImage = ImageBuffer::new(200, 100);
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_handler_stores_extracted_record() {
        let dir = tempdir().unwrap();
        let path = write_screenshot(dir.path());

        let handler = IngestHandler::new(
            ScoreExtractor::new(ScriptedEngine, 1920, 1080),
            MemoryStore::default(),
        );
        handler.handle(&path).unwrap();

        let records = handler.store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].artist, "Artist");
        assert_eq!(records[0].song_name, "Song");
        assert_eq!(records[0].total_score, Some(1000));
    }

    #[test]
    fn test_handler_reports_store_failure() {
        let dir = tempdir().unwrap();
        let path = write_screenshot(dir.path());

        let handler = IngestHandler::new(
            ScoreExtractor::new(ScriptedEngine, 1920, 1080),
            MemoryStore {
                fail: true,
                ..Default::default()
            },
        );
        let err = handler.handle(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("store offline"));
    }

    #[test]
    fn test_handler_reports_extract_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"plain text").unwrap();

        let handler = IngestHandler::new(
            ScoreExtractor::new(ScriptedEngine, 1920, 1080),
            MemoryStore::default(),
        );
        assert!(handler.handle(&path).is_err());
        assert!(handler.store.records.lock().unwrap().is_empty());
    }
}
