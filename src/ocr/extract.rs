//! Field extraction for the song header and the total score area.
//!
//! Everything here works on raw OCR text and never fails: missing or
//! garbled lines simply leave fields unset.

use regex::Regex;
use std::sync::LazyLock;

use crate::ingest::record::Difficulty;

/// Digits with optional comma or space grouping: `68508`, `1,234`, `1 234 567`.
static NUMERIC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+([,\s]\d+)*$").expect("valid numeric pattern"));

static INTEGER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid integer pattern"));

static CHARTER_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^charter\s*:\s*").expect("valid charter pattern"));

/// Artist, song and charter read from the top-left corner.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopLeftFields {
    pub artist: String,
    pub song_name: String,
    pub charter: Option<String>,
}

/// Total score and star rating read from the center area.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CenterFields {
    pub total_score: Option<i64>,
    pub stars: Option<u32>,
}

/// Splits OCR text into trimmed, non-empty lines.
pub fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Parses the top-left area: line 1 is the artist, line 2 the song and
/// line 3 the charter (with an optional "Charter:" label).
pub fn parse_top_left(text: &str) -> TopLeftFields {
    let lines = non_empty_lines(text);
    let mut fields = TopLeftFields::default();

    if let Some(artist) = lines.first() {
        fields.artist = artist.to_string();
    }
    if let Some(song) = lines.get(1) {
        fields.song_name = song.to_string();
    }
    if let Some(charter) = lines.get(2) {
        let charter = CHARTER_LABEL.replace(charter, "");
        let charter = charter.trim();
        if !charter.is_empty() {
            fields.charter = Some(charter.to_string());
        }
    }

    if !fields.artist.is_empty() && fields.song_name.is_empty() {
        tracing::warn!(
            "Extracted artist '{}' but no song name, OCR may have only detected one line",
            fields.artist
        );
    }

    fields
}

/// Parses the center area.
///
/// The first line holding any digits is the total score. Stars come from
/// the first "Stars: N" style line; failing that, a lone digit 0-7 is taken
/// as the star count. That fallback can misfire on unrelated single digits
/// and is a heuristic, not a guarantee.
pub fn parse_center(text: &str) -> CenterFields {
    let lines = non_empty_lines(text);

    let total_score = lines
        .iter()
        .find_map(|line| digits_only(line).parse::<i64>().ok());

    let stars = lines
        .iter()
        .filter(|line| line.to_lowercase().contains("star"))
        .find_map(|line| first_integer::<u32>(line))
        .or_else(|| lines.iter().find_map(|line| lone_star_digit(line)));

    CenterFields { total_score, stars }
}

/// A line consisting of exactly one digit between 0 and 7.
fn lone_star_digit(line: &str) -> Option<u32> {
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => c.to_digit(10).filter(|value| *value <= 7),
        _ => None,
    }
}

/// Removes every non-digit character. Applying it twice changes nothing.
pub fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True for digit groups separated by commas or whitespace, nothing else.
pub fn is_numeric(text: &str) -> bool {
    NUMERIC_PATTERN.is_match(text.trim())
}

/// Parses the first run of digits in the text.
pub fn first_integer<T: std::str::FromStr>(text: &str) -> Option<T> {
    INTEGER_PATTERN
        .find(text)
        .and_then(|m| m.as_str().parse::<T>().ok())
}

/// Maps any text mentioning a difficulty to its canonical name.
/// Text without a difficulty keyword is returned unchanged.
pub fn normalize_difficulty(text: &str) -> String {
    match Difficulty::detect(text) {
        Some(difficulty) => difficulty.as_str().to_string(),
        None => text.to_string(),
    }
}

/// Blank lines and lines starting with "---" separate player blocks.
pub fn is_player_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("---")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_lines() {
        assert!(non_empty_lines("").is_empty());
        assert!(non_empty_lines("  \n\t\n   ").is_empty());
        assert_eq!(non_empty_lines("\nhello\n  \n world \n\t"), vec!["hello", "world"]);
    }

    #[test]
    fn test_parse_top_left_full() {
        let fields = parse_top_left("Dave Matthews Band\nTripping Billies\nCharter: Custom\n");
        assert_eq!(fields.artist, "Dave Matthews Band");
        assert_eq!(fields.song_name, "Tripping Billies");
        assert_eq!(fields.charter.as_deref(), Some("Custom"));
    }

    #[test]
    fn test_parse_top_left_charter_label_case_insensitive() {
        let fields = parse_top_left("A\nB\nCHARTER:   Harmonix");
        assert_eq!(fields.charter.as_deref(), Some("Harmonix"));

        let fields = parse_top_left("A\nB\nJohn Doe");
        assert_eq!(fields.charter.as_deref(), Some("John Doe"));

        let fields = parse_top_left("A\nB\ncharter:");
        assert_eq!(fields.charter, None);
    }

    #[test]
    fn test_parse_top_left_missing_lines() {
        let fields = parse_top_left("\n  Only Artist \n");
        assert_eq!(fields.artist, "Only Artist");
        assert_eq!(fields.song_name, "");
        assert_eq!(fields.charter, None);

        assert_eq!(parse_top_left(""), TopLeftFields::default());
    }

    #[test]
    fn test_parse_center() {
        let fields = parse_center("447253\nStars: 4");
        assert_eq!(fields.total_score, Some(447253));
        assert_eq!(fields.stars, Some(4));
    }

    #[test]
    fn test_parse_center_score_with_grouping() {
        let fields = parse_center("SCORE\n1,234,567\n");
        assert_eq!(fields.total_score, Some(1234567));
        assert_eq!(fields.stars, None);
    }

    #[test]
    fn test_parse_center_lone_digit_stars() {
        let fields = parse_center("98765\n5\n");
        assert_eq!(fields.total_score, Some(98765));
        assert_eq!(fields.stars, Some(5));

        // 8 is outside the star range
        let fields = parse_center("98765\n8\n");
        assert_eq!(fields.stars, None);
    }

    #[test]
    fn test_parse_center_star_line_beats_lone_digit() {
        let fields = parse_center("98765\n3\n6 stars");
        assert_eq!(fields.stars, Some(6));
    }

    #[test]
    fn test_parse_center_empty() {
        assert_eq!(parse_center(""), CenterFields::default());
    }

    #[test]
    fn test_digits_only_idempotent() {
        for input in ["", "abc", "1,234", "Score: 447 253!", "81.0%", "٣12"] {
            let once = digits_only(input);
            assert_eq!(digits_only(&once), once);
        }
        assert_eq!(digits_only("Score: 447 253!"), "447253");
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("123"));
        assert!(is_numeric("1,234"));
        assert!(is_numeric("1 234"));
        assert!(is_numeric("1,234,567"));
        assert!(is_numeric("  68508 "));
        assert!(!is_numeric("hello"));
        assert!(!is_numeric("123abc"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("   "));
        assert!(!is_numeric("123.45"));
    }

    #[test]
    fn test_is_numeric_accepts_cleaned_digits() {
        for input in ["1,234", "9 999", "42"] {
            assert!(is_numeric(&digits_only(input)));
        }
    }

    #[test]
    fn test_first_integer() {
        assert_eq!(first_integer::<u32>("Misses: 12 of 300"), Some(12));
        assert_eq!(first_integer::<u32>("no digits"), None);
        assert_eq!(first_integer::<u32>("99999999999"), None);
    }

    #[test]
    fn test_normalize_difficulty() {
        assert_eq!(normalize_difficulty("expert"), "Expert");
        assert_eq!(normalize_difficulty("ExPeRt"), "Expert");
        assert_eq!(normalize_difficulty("hard"), "Hard");
        assert_eq!(normalize_difficulty("medium"), "Medium");
        assert_eq!(normalize_difficulty("easy"), "Easy");
        assert_eq!(normalize_difficulty("played on expert mode"), "Expert");
        assert_eq!(normalize_difficulty("unknown"), "unknown");
        assert_eq!(normalize_difficulty(""), "");
    }

    #[test]
    fn test_is_player_separator() {
        assert!(is_player_separator(""));
        assert!(is_player_separator("   "));
        assert!(is_player_separator("---"));
        assert!(is_player_separator("---separator---"));
        assert!(is_player_separator("  ---  "));
        assert!(!is_player_separator("Player 1"));
        assert!(!is_player_separator("Player-1"));
    }
}
