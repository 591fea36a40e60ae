use super::{gap_between, TimedSegment};

fn join_text(left: &str, right: &str) -> String {
    match (left.trim(), right.trim()) {
        ("", r) => r.to_string(),
        (l, "") => l.to_string(),
        (l, r) => format!("{l} {r}"),
    }
}

fn min_confidence(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

/// Combine two adjacent segments into one spanning both.
fn combine(acc: &TimedSegment, next: &TimedSegment) -> TimedSegment {
    let translated_text = match (&acc.translated_text, &next.translated_text) {
        (None, None) => None,
        (l, r) => Some(join_text(
            l.as_deref().unwrap_or(""),
            r.as_deref().unwrap_or(""),
        )),
    };

    TimedSegment {
        start_time: acc.start_time,
        end_time: next.end_time.max(acc.end_time),
        original_text: join_text(&acc.original_text, &next.original_text),
        translated_text,
        confidence: min_confidence(acc.confidence, next.confidence),
        speaker_id: acc.speaker_id.clone(),
    }
}

/// Merge runs of same-speaker segments separated by at most `max_gap` seconds.
///
/// Text is joined with a single space and the merged confidence is the worst
/// of the inputs. Segments with no speaker tag only merge with other untagged
/// segments.
pub fn merge_adjacent_segments(segments: &[TimedSegment], max_gap: f64) -> Vec<TimedSegment> {
    segments.iter().fold(Vec::new(), |mut merged, seg| {
        let mergeable = merged.last().is_some_and(|last: &TimedSegment| {
            last.speaker_id == seg.speaker_id && gap_between(last, seg) <= max_gap
        });

        if mergeable {
            if let Some(last) = merged.pop() {
                merged.push(combine(&last, seg));
            }
        } else {
            merged.push(seg.clone());
        }
        merged
    })
}

/// Keep segments whose confidence is defined and at least `min_confidence`.
pub fn filter_by_confidence(segments: &[TimedSegment], min_confidence: f64) -> Vec<TimedSegment> {
    segments
        .iter()
        .filter(|s| s.confidence.is_some_and(|c| c >= min_confidence))
        .cloned()
        .collect()
}
