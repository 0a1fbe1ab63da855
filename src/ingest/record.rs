//! Score data extracted from one results screenshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chart difficulty shown next to each player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Keyword checks in priority order. "expert" wins over "hard" so that
    /// a line mentioning both resolves to the harder chart.
    const KEYWORDS: [(&'static str, Difficulty); 4] = [
        ("expert", Difficulty::Expert),
        ("hard", Difficulty::Hard),
        ("medium", Difficulty::Medium),
        ("easy", Difficulty::Easy),
    ];

    /// Finds a difficulty keyword anywhere in the text, case-insensitively.
    pub fn detect(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, difficulty)| *difficulty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
            Difficulty::Expert => "Expert",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One player's stats from the results screen.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    /// Never filled by OCR; kept for manual corrections downstream.
    pub instrument: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub score: Option<i64>,
    /// Note hit percentage (0.0 to 100.0)
    pub accuracy: Option<f64>,
    pub misses: Option<u32>,
    pub best_streak: Option<u32>,
    /// Never filled by OCR; kept for manual corrections downstream.
    pub rank: Option<u32>,
}

/// Structured output of one extraction run.
///
/// Empty `artist`/`song_name` strings are a valid degraded result, not an
/// error. `created_at` is always set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub artist: String,
    pub song_name: String,
    pub charter: Option<String>,
    pub total_score: Option<i64>,
    pub stars_achieved: Option<u32>,
    pub players: Vec<PlayerRecord>,
    pub created_at: DateTime<Utc>,
}

impl ScoreRecord {
    /// Names of the headline fields OCR failed to produce.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.artist.trim().is_empty() {
            missing.push("artist");
        }
        if self.song_name.trim().is_empty() {
            missing.push("song name");
        }
        if self.total_score.is_none() {
            missing.push("total score");
        }
        if self.players.is_empty() {
            missing.push("players");
        }
        missing
    }

    /// True when extraction found nothing useful or most headline fields
    /// are missing. Degraded records are still persisted.
    pub fn is_degraded(&self) -> bool {
        // "Nothing at all" is four missing fields, so the threshold covers it.
        self.missing_fields().len() >= 3
    }
}
