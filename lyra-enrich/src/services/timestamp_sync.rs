//! Lyric line timing
//!
//! Turns raw lyric text plus a track duration into timed [`LyricLine`]s, and
//! optionally snaps line starts onto externally supplied beat times.
//!
//! **Allocation order:**
//! 1. Line-timing estimator (when configured)
//! 2. Even baseline split of the duration (estimator absent, failed, or
//!    answered with the wrong number of lines)

use lyra_common::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::LyricLine;
use crate::services::providers::LineTimingEstimator;
use crate::utils::cancellable;

/// Duration assumed when the caller and the provider both have none
pub const DEFAULT_DURATION_SECONDS: f64 = 180.0;

pub struct TimestampSynchronizer {
    estimator: Option<Arc<dyn LineTimingEstimator>>,
    default_duration: f64,
}

impl TimestampSynchronizer {
    pub fn new(estimator: Option<Arc<dyn LineTimingEstimator>>, default_duration: f64) -> Self {
        let default_duration = if default_duration.is_finite() && default_duration > 0.0 {
            default_duration
        } else {
            DEFAULT_DURATION_SECONDS
        };

        Self {
            estimator,
            default_duration,
        }
    }

    /// Baseline-only synchronizer
    pub fn baseline_only() -> Self {
        Self::new(None, DEFAULT_DURATION_SECONDS)
    }

    fn effective_duration(&self, duration: Option<f64>) -> f64 {
        match duration {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => self.default_duration,
        }
    }

    /// Even split: line `i` of `N` spans `[i·D/N, (i+1)·D/N)`
    pub fn baseline(&self, full_text: &str, duration: Option<f64>) -> Vec<LyricLine> {
        allocate_evenly(&split_lines(full_text), self.effective_duration(duration))
    }

    /// Time every non-blank line of `full_text`
    ///
    /// Estimator failures fall back to the baseline; only cancellation is
    /// reported as an error.
    pub async fn synchronize(
        &self,
        full_text: &str,
        duration: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<LyricLine>> {
        let lines = split_lines(full_text);
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let duration = self.effective_duration(duration);

        let Some(estimator) = &self.estimator else {
            return Ok(allocate_evenly(&lines, duration));
        };

        match cancellable(cancel, estimator.estimate(&lines, duration)).await {
            Ok(estimates) if estimates.len() == lines.len() => Ok(lines
                .into_iter()
                .zip(estimates)
                .enumerate()
                .map(|(i, (text, estimate))| {
                    let start_time = finite_or_zero(estimate.start_time).max(0.0);
                    LyricLine {
                        text,
                        start_time,
                        end_time: Some(finite_or_zero(estimate.end_time).max(start_time)),
                        order_index: i as i64,
                    }
                })
                .collect()),
            Ok(estimates) => {
                tracing::warn!(
                    expected = lines.len(),
                    received = estimates.len(),
                    "Line timing estimate has wrong line count, using baseline"
                );
                Ok(allocate_evenly(&lines, duration))
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "Line timing estimator failed, using baseline");
                Ok(allocate_evenly(&lines, duration))
            }
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Non-blank lines of `full_text`, trimmed, in order
pub fn split_lines(full_text: &str) -> Vec<String> {
    full_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn allocate_evenly(lines: &[String], duration: f64) -> Vec<LyricLine> {
    if lines.is_empty() {
        return Vec::new();
    }

    let per_line = duration / lines.len() as f64;
    lines
        .iter()
        .enumerate()
        .map(|(i, text)| LyricLine {
            text: text.clone(),
            start_time: i as f64 * per_line,
            end_time: Some((i + 1) as f64 * per_line),
            order_index: i as i64,
        })
        .collect()
}

/// Beat closest to `time` in sorted `beats`; ties resolve to the earlier beat
fn nearest_beat(beats: &[f64], time: f64) -> Option<f64> {
    let idx = beats.partition_point(|&beat| beat < time);
    match (idx.checked_sub(1).map(|i| beats[i]), beats.get(idx).copied()) {
        (Some(before), Some(after)) => {
            if time - before <= after - time {
                Some(before)
            } else {
                Some(after)
            }
        }
        (Some(before), None) => Some(before),
        (None, Some(after)) => Some(after),
        (None, None) => None,
    }
}

/// Snap every line start to its nearest beat, then close the gaps so each
/// line ends where the next begins. The last line's end is left as is.
///
/// No beats (or an empty list) returns the lines unchanged. Several lines may
/// snap to the same beat.
pub fn improve_timestamps(mut lines: Vec<LyricLine>, beats: Option<&[f64]>) -> Vec<LyricLine> {
    let mut sorted: Vec<f64> = match beats {
        Some(beats) => beats.iter().copied().filter(|b| b.is_finite()).collect(),
        None => return lines,
    };
    if sorted.is_empty() || lines.is_empty() {
        return lines;
    }
    sorted.sort_by(f64::total_cmp);

    for line in lines.iter_mut() {
        if let Some(beat) = nearest_beat(&sorted, line.start_time) {
            line.start_time = beat.max(0.0);
        }
    }

    for i in 0..lines.len() - 1 {
        lines[i].end_time = Some(lines[i + 1].start_time);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimedText;
    use async_trait::async_trait;

    fn line(start: f64, end: Option<f64>, order_index: i64) -> LyricLine {
        LyricLine {
            text: format!("line {}", order_index),
            start_time: start,
            end_time: end,
            order_index,
        }
    }

    struct FixedEstimator(Result<Vec<TimedText>>);

    #[async_trait]
    impl LineTimingEstimator for FixedEstimator {
        async fn estimate(&self, _lines: &[String], _duration: f64) -> Result<Vec<TimedText>> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(e) => Err(Error::Provider(e.to_string())),
            }
        }
    }

    fn timed(start: f64, end: f64) -> TimedText {
        TimedText {
            text: "ignored".into(),
            start_time: start,
            end_time: end,
        }
    }

    #[test]
    fn test_baseline_spans_the_duration_contiguously() {
        let sync = TimestampSynchronizer::baseline_only();
        let lines = sync.baseline("a\n\n  \nb\nc\nd", Some(120.0));

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].start_time, 0.0);
        assert_eq!(lines[3].end_time, Some(120.0));
        for pair in lines.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
            assert_eq!(pair[0].end_time, Some(pair[1].start_time));
        }
        let indices: Vec<i64> = lines.iter().map(|l| l.order_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_baseline_defaults_to_180_seconds() {
        let sync = TimestampSynchronizer::baseline_only();
        let lines = sync.baseline("one\ntwo\nthree", None);
        assert_eq!(lines[1].start_time, 60.0);
        assert_eq!(lines[2].end_time, Some(180.0));

        let lines = sync.baseline("one", Some(-3.0));
        assert_eq!(lines[0].end_time, Some(180.0));
    }

    #[tokio::test]
    async fn test_blank_text_yields_no_lines() {
        let sync = TimestampSynchronizer::baseline_only();
        let lines = sync
            .synchronize(" \n\n\t", Some(30.0), &CancellationToken::new())
            .await
            .unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_estimator_answer_is_clamped() {
        let estimator = FixedEstimator(Ok(vec![timed(-1.0, 2.0), timed(5.0, 4.0)]));
        let sync = TimestampSynchronizer::new(Some(Arc::new(estimator)), 180.0);

        let lines = sync
            .synchronize("a\nb", Some(10.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(lines[0].start_time, 0.0);
        assert_eq!(lines[0].text, "a");
        assert_eq!(lines[1].start_time, 5.0);
        assert_eq!(lines[1].end_time, Some(5.0));
    }

    #[tokio::test]
    async fn test_estimator_failure_or_mismatch_falls_back() {
        let failing = FixedEstimator(Err(Error::Provider("down".into())));
        let sync = TimestampSynchronizer::new(Some(Arc::new(failing)), 180.0);
        let lines = sync
            .synchronize("a\nb", Some(10.0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(lines, sync.baseline("a\nb", Some(10.0)));

        let short = FixedEstimator(Ok(vec![timed(0.0, 1.0)]));
        let sync = TimestampSynchronizer::new(Some(Arc::new(short)), 180.0);
        let lines = sync
            .synchronize("a\nb", Some(10.0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(lines[1].start_time, 5.0);
    }

    #[test]
    fn test_improve_without_beats_is_identity() {
        let lines = vec![line(0.0, Some(1.0), 0), line(1.3, Some(2.0), 1)];
        assert_eq!(improve_timestamps(lines.clone(), None), lines);
        assert_eq!(improve_timestamps(lines.clone(), Some(&[])), lines);
        assert!(improve_timestamps(Vec::new(), Some(&[1.0, 2.0])).is_empty());
    }

    #[test]
    fn test_start_snaps_to_nearest_beat() {
        let lines = vec![line(2.5, Some(3.0), 0)];
        let improved = improve_timestamps(lines, Some(&[0.0, 2.39, 4.78]));
        assert_eq!(improved[0].start_time, 2.39);
        // last end is left untouched
        assert_eq!(improved[0].end_time, Some(3.0));
    }

    #[test]
    fn test_ends_are_chained_to_next_start() {
        let lines = vec![
            line(0.2, Some(1.0), 0),
            line(1.9, Some(2.5), 1),
            line(3.1, Some(9.0), 2),
        ];
        let improved = improve_timestamps(lines, Some(&[3.0, 0.0, 2.0]));

        let starts: Vec<f64> = improved.iter().map(|l| l.start_time).collect();
        assert_eq!(starts, vec![0.0, 2.0, 3.0]);
        assert_eq!(improved[0].end_time, Some(2.0));
        assert_eq!(improved[1].end_time, Some(3.0));
        assert_eq!(improved[2].end_time, Some(9.0));
    }

    #[test]
    fn test_ties_choose_earlier_beat_and_duplicates_are_allowed() {
        assert_eq!(nearest_beat(&[1.0, 3.0], 2.0), Some(1.0));

        let lines = vec![line(1.1, None, 0), line(0.9, None, 1)];
        let improved = improve_timestamps(lines, Some(&[1.0, 5.0]));
        assert_eq!(improved[0].start_time, 1.0);
        assert_eq!(improved[1].start_time, 1.0);
        assert_eq!(improved[0].end_time, Some(1.0));
    }
}
