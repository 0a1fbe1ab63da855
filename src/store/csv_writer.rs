//! CSV score log.
//!
//! One row per player, with the score columns repeated on every row of the
//! same score. A score without players is written as a single row with
//! empty player columns. The file is append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{ScoreStore, StoreError, StoredScore};
use crate::ingest::record::{Difficulty, PlayerRecord, ScoreRecord};

/// Column order of the score log.
const CSV_HEADER: [&str; 16] = [
    "id",
    "created_at",
    "artist",
    "song_name",
    "charter",
    "total_score",
    "stars_achieved",
    "player_index",
    "player_name",
    "instrument",
    "difficulty",
    "player_score",
    "accuracy",
    "misses",
    "best_streak",
    "rank",
];

/// One line of the score log.
#[derive(Debug, Serialize, Deserialize)]
struct ScoreRow {
    id: i64,
    created_at: DateTime<Utc>,
    artist: String,
    song_name: String,
    charter: Option<String>,
    total_score: Option<i64>,
    stars_achieved: Option<u32>,
    player_index: Option<usize>,
    player_name: Option<String>,
    instrument: Option<String>,
    difficulty: Option<Difficulty>,
    player_score: Option<i64>,
    accuracy: Option<f64>,
    misses: Option<u32>,
    best_streak: Option<u32>,
    rank: Option<u32>,
}

impl ScoreRow {
    fn new(id: i64, record: &ScoreRecord, player: Option<(usize, &PlayerRecord)>) -> Self {
        let player_record = player.map(|(_, p)| p);
        Self {
            id,
            created_at: record.created_at,
            artist: record.artist.clone(),
            song_name: record.song_name.clone(),
            charter: record.charter.clone(),
            total_score: record.total_score,
            stars_achieved: record.stars_achieved,
            player_index: player.map(|(index, _)| index),
            player_name: player_record.map(|p| p.name.clone()),
            instrument: player_record.and_then(|p| p.instrument.clone()),
            difficulty: player_record.and_then(|p| p.difficulty),
            player_score: player_record.and_then(|p| p.score),
            accuracy: player_record.and_then(|p| p.accuracy),
            misses: player_record.and_then(|p| p.misses),
            best_streak: player_record.and_then(|p| p.best_streak),
            rank: player_record.and_then(|p| p.rank),
        }
    }

    fn player(&self) -> Option<PlayerRecord> {
        let name = self.player_name.clone()?;
        Some(PlayerRecord {
            name,
            instrument: self.instrument.clone(),
            difficulty: self.difficulty,
            score: self.player_score,
            accuracy: self.accuracy,
            misses: self.misses,
            best_streak: self.best_streak,
            rank: self.rank,
        })
    }

    fn into_stored(self) -> StoredScore {
        let players = self.player().into_iter().collect();
        StoredScore {
            id: self.id,
            record: ScoreRecord {
                artist: self.artist,
                song_name: self.song_name,
                charter: self.charter,
                total_score: self.total_score,
                stars_achieved: self.stars_achieved,
                players,
                created_at: self.created_at,
            },
        }
    }
}

/// Score store backed by an append-only CSV file.
pub struct CsvScoreStore {
    path: PathBuf,
    /// Next id to assign; the lock also serializes appends
    next_id: Mutex<i64>,
}

impl CsvScoreStore {
    /// Opens the score log, creating it with a header if it is missing or
    /// empty. Ids continue after the highest id already in the file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let io_error = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let is_empty = match fs::metadata(path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(io_error(e)),
        };

        if is_empty {
            let mut writer = csv::Writer::from_path(path).map_err(|source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            writer.write_record(CSV_HEADER).map_err(|source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            writer.flush().map_err(io_error)?;
            tracing::info!("Created score log: {}", path.display());
        }

        let store = Self {
            path: path.to_path_buf(),
            next_id: Mutex::new(1),
        };
        let last_id = store
            .list_scores()?
            .iter()
            .map(|score| score.id)
            .max()
            .unwrap_or(0);
        *store.lock_next_id() = last_id + 1;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every stored score in file order. Malformed rows are skipped
    /// with a warning.
    pub fn list_scores(&self) -> Result<Vec<StoredScore>, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|source| StoreError::Csv {
                path: self.path.clone(),
                source,
            })?;

        let mut scores: Vec<StoredScore> = Vec::new();
        for (index, result) in reader.deserialize::<ScoreRow>().enumerate() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed row {} in {}: {}",
                        index + 2,
                        self.path.display(),
                        e
                    );
                    continue;
                }
            };

            match scores.last_mut() {
                Some(last) if last.id == row.id => {
                    if let Some(player) = row.player() {
                        last.record.players.push(player);
                    }
                }
                _ => scores.push(row.into_stored()),
            }
        }

        Ok(scores)
    }

    fn lock_next_id(&self) -> std::sync::MutexGuard<'_, i64> {
        // A panic while holding the lock cannot leave a half-written id
        self.next_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn serialize_rows(&self, id: i64, record: &ScoreRecord) -> Result<Vec<u8>, StoreError> {
        let csv_error = |source| StoreError::Csv {
            path: self.path.clone(),
            source,
        };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        if record.players.is_empty() {
            writer
                .serialize(ScoreRow::new(id, record, None))
                .map_err(csv_error)?;
        } else {
            for (index, player) in record.players.iter().enumerate() {
                writer
                    .serialize(ScoreRow::new(id, record, Some((index, player))))
                    .map_err(csv_error)?;
            }
        }

        writer
            .into_inner()
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: e.into_error(),
            })
    }
}

impl ScoreStore for CsvScoreStore {
    fn create_score(&self, record: &ScoreRecord) -> Result<i64, StoreError> {
        let mut next_id = self.lock_next_id();
        let id = *next_id;

        let bytes = self.serialize_rows(id, record)?;
        append_or_rollback(&self.path, |file| {
            file.write_all(&bytes)?;
            file.sync_data()
        })
        .map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        *next_id += 1;
        tracing::debug!(
            "Stored score {} ({} player rows) in {}",
            id,
            record.players.len().max(1),
            self.path.display()
        );
        Ok(id)
    }
}

/// Runs `write` against the file opened for append. If it fails, the file
/// is truncated back to its previous length so no partial rows remain.
fn append_or_rollback(
    path: &Path,
    write: impl FnOnce(&mut File) -> io::Result<()>,
) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let prior_len = file.metadata()?.len();

    if let Err(e) = write(&mut file) {
        if let Err(truncate_err) = file.set_len(prior_len) {
            tracing::error!(
                "Failed to roll back partial write to {}: {}",
                path.display(),
                truncate_err
            );
        }
        return Err(e);
    }
    Ok(())
}
