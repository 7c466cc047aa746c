//! Merging raw recognition segments into subtitle intervals.

use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;
use crate::error::TimelineError;

/// Raw output unit of the transcription engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl RecognizedSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A time-bounded subtitle unit built from one or more recognition segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Interval {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Collapse recognition segments into intervals.
///
/// Text accumulates until the span since the last cut reaches
/// `min_interval`. The span is then flushed if it also stays within
/// `max_interval`, or unconditionally once text is already pending.
/// Intervals are contiguous: each starts where the previous one ended,
/// and the first starts at zero.
///
/// An empty input yields no intervals; deciding whether that is fatal is
/// left to the caller.
pub fn segment_intervals(
    segments: &[RecognizedSegment],
    timing: &TimingConfig,
) -> Result<Vec<Interval>, TimelineError> {
    validate(segments)?;

    let mut intervals: Vec<Interval> = Vec::new();
    let mut current_start = 0.0_f64;
    let mut current_text = String::new();

    for segment in segments {
        let text = segment.text.trim();
        let span = segment.end - current_start;

        if span >= timing.min_interval && (span <= timing.max_interval || !current_text.is_empty())
        {
            intervals.push(Interval {
                start: current_start,
                end: segment.end,
                text: join_words(&current_text, text),
            });
            current_start = segment.end;
            current_text.clear();
        } else {
            current_text = join_words(&current_text, text);
        }
    }

    if !current_text.is_empty() {
        // Non-empty pending text implies at least one segment was seen.
        let end = segments.last().map(|s| s.end).unwrap_or(current_start);
        if end > current_start {
            intervals.push(Interval {
                start: current_start,
                end,
                text: current_text,
            });
        } else if let Some(last) = intervals.last_mut() {
            // Zero-length tail: keep its words on screen with the previous interval.
            last.text = join_words(&last.text, &current_text);
        } else {
            return Err(TimelineError::Degenerate { text: current_text });
        }
    }

    Ok(intervals)
}

fn validate(segments: &[RecognizedSegment]) -> Result<(), TimelineError> {
    let mut previous_end = 0.0_f64;
    for (index, s) in segments.iter().enumerate() {
        if !s.start.is_finite() || !s.end.is_finite() || s.start < 0.0 {
            return Err(TimelineError::InvalidTimestamp {
                index,
                start: s.start,
                end: s.end,
            });
        }
        if s.end < s.start {
            return Err(TimelineError::Inverted {
                index,
                start: s.start,
                end: s.end,
            });
        }
        if s.end < previous_end {
            return Err(TimelineError::NotMonotonic {
                index,
                end: s.end,
                previous_end,
            });
        }
        previous_end = s.end;
    }
    Ok(())
}

fn join_words(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (false, true) => head.to_string(),
        (false, false) => format!("{head} {tail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> RecognizedSegment {
        RecognizedSegment::new(start, end, text)
    }

    fn timing() -> TimingConfig {
        TimingConfig {
            min_interval: 3.0,
            max_interval: 5.0,
        }
    }

    #[test]
    fn short_segment_accumulates_then_flushes() {
        let out = segment_intervals(&[seg(0.0, 2.0, "Hi"), seg(2.0, 4.5, " there friend ")], &timing())
            .unwrap();
        assert_eq!(
            out,
            vec![Interval {
                start: 0.0,
                end: 4.5,
                text: "Hi there friend".to_string()
            }]
        );
    }

    #[test]
    fn empty_input_yields_no_intervals() {
        assert!(segment_intervals(&[], &timing()).unwrap().is_empty());
    }

    #[test]
    fn long_first_segment_waits_for_the_next_one() {
        // 0..7 exceeds the maximum with nothing pending, so it is held back
        // and flushed together with the following segment.
        let out = segment_intervals(
            &[seg(0.0, 7.0, "a long opening"), seg(7.0, 8.0, "then more")],
            &timing(),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].end, 8.0);
        assert_eq!(out[0].text, "a long opening then more");
    }

    #[test]
    fn trailing_text_becomes_final_interval() {
        let out = segment_intervals(
            &[seg(0.0, 3.5, "one"), seg(3.5, 4.0, "two")],
            &timing(),
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].start, 3.5);
        assert_eq!(out[1].end, 4.0);
        assert_eq!(out[1].text, "two");
    }

    #[test]
    fn intervals_are_contiguous_and_keep_every_word() {
        let input: Vec<_> = (0..20)
            .map(|i| seg(i as f64 * 1.3, (i + 1) as f64 * 1.3, &format!("w{i}")))
            .collect();
        let out = segment_intervals(&input, &timing()).unwrap();

        assert_eq!(out[0].start, 0.0);
        for pair in out.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for interval in &out[..out.len() - 1] {
            assert!(interval.duration() >= 3.0);
        }
        let words: Vec<String> = out
            .iter()
            .flat_map(|i| i.text.split(' ').map(str::to_string).collect::<Vec<_>>())
            .collect();
        let expected: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn zero_length_tail_joins_previous_interval() {
        let out = segment_intervals(
            &[seg(0.0, 3.0, "first"), seg(3.0, 3.0, "blip")],
            &timing(),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "first blip");
    }

    #[test]
    fn zero_length_only_input_is_degenerate() {
        let err = segment_intervals(&[seg(0.0, 0.0, "uh")], &timing()).unwrap_err();
        assert!(matches!(err, TimelineError::Degenerate { .. }));
    }

    #[test]
    fn rejects_malformed_segments() {
        assert!(matches!(
            segment_intervals(&[seg(2.0, 1.0, "x")], &timing()),
            Err(TimelineError::Inverted { index: 0, .. })
        ));
        assert!(matches!(
            segment_intervals(&[seg(0.0, 4.0, "a"), seg(1.0, 2.0, "b")], &timing()),
            Err(TimelineError::NotMonotonic { index: 1, .. })
        ));
        assert!(matches!(
            segment_intervals(&[seg(0.0, f64::NAN, "x")], &timing()),
            Err(TimelineError::InvalidTimestamp { .. })
        ));
    }
}
