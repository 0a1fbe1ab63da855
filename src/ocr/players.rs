//! Player block parsing.
//!
//! OCR of the player panels yields one line per stat. Lines are fed in
//! order into an accumulator; each line is classified by the first rule in
//! [`RULES`] whose predicate accepts it. Separator lines and the end of the
//! stream close the current block.

use regex::Regex;
use std::sync::LazyLock;

use super::extract::{
    digits_only, first_integer, is_numeric, is_player_separator, normalize_difficulty,
};
use crate::ingest::record::{Difficulty, PlayerRecord};

/// A decimal immediately followed by a percent sign: `81.0%`, `100%`.
static ACCURACY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)%").expect("valid accuracy pattern"));

/// Scores are large numbers; short digit runs are usually noise.
const MIN_SCORE_DIGITS: usize = 4;

/// Line classification rules, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rule {
    Name,
    Difficulty,
    Score,
    Accuracy,
    Misses,
    Streak,
}

const RULES: [Rule; 6] = [
    Rule::Name,
    Rule::Difficulty,
    Rule::Score,
    Rule::Accuracy,
    Rule::Misses,
    Rule::Streak,
];

impl Rule {
    fn matches(self, line: &str, lower: &str, player: &PlayerRecord) -> bool {
        match self {
            Rule::Name => player.name.is_empty() && !is_numeric(line),
            Rule::Difficulty => Difficulty::detect(lower).is_some(),
            Rule::Score => is_numeric(line) && digits_only(line).len() >= MIN_SCORE_DIGITS,
            Rule::Accuracy => line.contains('%'),
            Rule::Misses => lower.contains("miss"),
            Rule::Streak => lower.contains("combo") || lower.contains("streak"),
        }
    }

    fn apply(self, line: &str, lower: &str, player: &mut PlayerRecord) {
        match self {
            Rule::Name => player.name = line.to_string(),
            Rule::Difficulty => {
                if player.difficulty.is_none() {
                    player.difficulty = Difficulty::detect(lower);
                } else {
                    tracing::trace!(
                        "{} already has a difficulty, ignoring {}",
                        player.name,
                        normalize_difficulty(line)
                    );
                }
            }
            Rule::Score => {
                if player.score.is_none() {
                    player.score = digits_only(line).parse().ok();
                }
            }
            Rule::Accuracy => {
                if let Some(accuracy) = ACCURACY_PATTERN
                    .captures(line)
                    .and_then(|caps| caps[1].parse().ok())
                {
                    player.accuracy = Some(accuracy);
                }
            }
            Rule::Misses => {
                if let Some(misses) = first_integer(line) {
                    player.misses = Some(misses);
                }
            }
            Rule::Streak => {
                if let Some(streak) = first_integer(line) {
                    player.best_streak = Some(streak);
                }
            }
        }
    }
}

/// Parses the player panel text into player records, in screen order.
///
/// Blocks without a name are dropped.
pub fn parse_players(text: &str) -> Vec<PlayerRecord> {
    let mut players = Vec::new();
    let mut current = PlayerRecord::default();

    for line in text.trim().lines().map(str::trim) {
        if is_player_separator(line) {
            if !current.name.is_empty() {
                players.push(std::mem::take(&mut current));
            }
            continue;
        }

        let lower = line.to_lowercase();
        match RULES.iter().find(|rule| rule.matches(line, &lower, &current)) {
            Some(rule) => rule.apply(line, &lower, &mut current),
            None => tracing::trace!("Ignoring player line: {:?}", line),
        }
    }

    if !current.name.is_empty() {
        players.push(current);
    }

    players
}
