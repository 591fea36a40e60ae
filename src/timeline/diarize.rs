use super::{gap_between, TimedSegment};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn sentence_endings() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?。！？]").expect("valid punctuation regex"))
}

/// Text-based turn boundary: the previous segment contains sentence-terminal
/// punctuation or a question mark.
fn is_turn_boundary(prev: &TimedSegment) -> bool {
    let text = prev.original_text.as_str();
    sentence_endings().is_match(text) || text.contains('?') || text.contains('？')
}

fn speaker_tag(n: usize) -> String {
    format!("speaker_{n}")
}

/// Assign speaker tags over an ordered sequence.
///
/// The first segment gets `speaker_1`. At each boundary a new tag starts when
/// the silence gap exceeds `change_threshold` (if `use_silence_detection`),
/// otherwise when the previous segment reads as a finished turn. The gap check
/// runs first. This is a heuristic and produces false positives on
/// single-speaker audio; downstream scoring tolerates that.
pub fn identify_speakers(
    segments: &[TimedSegment],
    change_threshold: f64,
    use_silence_detection: bool,
) -> Vec<TimedSegment> {
    let Some(first) = segments.first() else {
        return Vec::new();
    };

    let mut counter = 1;
    let mut result = Vec::with_capacity(segments.len());
    result.push(first.clone().with_speaker(speaker_tag(counter)));

    for pair in segments.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let gap = gap_between(prev, curr);

        let changed = if use_silence_detection && gap > change_threshold {
            debug!(
                "Speaker change at {:.2}s after {:.2}s of silence",
                curr.start_time, gap
            );
            true
        } else {
            is_turn_boundary(prev)
        };

        if changed {
            counter += 1;
        }
        result.push(curr.clone().with_speaker(speaker_tag(counter)));
    }

    result
}
