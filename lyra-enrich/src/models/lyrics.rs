//! Lyrics and time-coded lyric lines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lyrics attached one-to-one to a song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lyrics {
    pub id: Uuid,
    pub song_id: Uuid,
    /// Always present, even when no timed lines exist
    pub full_text: String,
    /// AI-authored (true) or user-authored (false)
    pub is_generated: bool,
    /// Human-reviewed
    pub is_verified: bool,
    /// Lines ordered by `order_index`
    pub lines: Vec<LyricLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Lyrics {
    /// Short label stored alongside the lyrics vector record
    pub fn preview(&self) -> String {
        let first = self
            .full_text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        first.chars().take(80).collect()
    }
}

/// One displayable line of lyrics
///
/// `order_index` is authoritative for display order; after a full resync the
/// indices of one Lyrics form the contiguous sequence `0..N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub text: String,
    /// Seconds from track start, never negative
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub order_index: i64,
}

/// Text with a time span, as produced by providers and estimators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedText {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// Convert provider/estimator output into lines numbered in sequence order
pub fn lines_from_timed(items: &[TimedText]) -> Vec<LyricLine> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| LyricLine {
            text: item.text.trim().to_string(),
            start_time: item.start_time.max(0.0),
            end_time: Some(item.end_time.max(item.start_time.max(0.0))),
            order_index: i as i64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_from_timed_preserves_order_and_clamps() {
        let timed = vec![
            TimedText {
                text: " first ".into(),
                start_time: -0.2,
                end_time: 1.5,
            },
            TimedText {
                text: "second".into(),
                start_time: 1.5,
                end_time: 1.0,
            },
        ];

        let lines = lines_from_timed(&timed);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "first");
        assert_eq!(lines[0].start_time, 0.0);
        assert_eq!(lines[0].order_index, 0);
        assert_eq!(lines[1].order_index, 1);
        assert_eq!(lines[1].end_time, Some(1.5));
    }

    #[test]
    fn test_preview_uses_first_non_blank_line() {
        let lyrics = Lyrics {
            id: Uuid::new_v4(),
            song_id: Uuid::new_v4(),
            full_text: "\n\n  Hello darkness  \nmy old friend".into(),
            is_generated: true,
            is_verified: false,
            lines: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            embedding: None,
        };
        assert_eq!(lyrics.preview(), "Hello darkness");
    }
}
