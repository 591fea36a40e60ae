use super::{tokenize, TimedSegment};

/// Subdivide a segment into one sub-segment per word token.
///
/// The segment duration is split evenly across tokens. This is an
/// approximation, not forced alignment: word boundaries are not acoustically
/// verified. The final token always ends exactly at the segment end.
pub fn expand_segment(segment: &TimedSegment) -> Vec<TimedSegment> {
    let words = tokenize(&segment.original_text);
    if words.is_empty() {
        return Vec::new();
    }

    let count = words.len();
    let word_duration = (segment.end_time - segment.start_time) / count as f64;

    let mut current = segment.start_time;
    words
        .into_iter()
        .enumerate()
        .map(|(i, word)| {
            let end = if i == count - 1 {
                segment.end_time
            } else {
                current + word_duration
            };
            let word_segment = TimedSegment {
                start_time: current,
                end_time: end,
                original_text: word.trim().to_string(),
                translated_text: None,
                confidence: segment.confidence,
                speaker_id: segment.speaker_id.clone(),
            };
            current = end;
            word_segment
        })
        .collect()
}

/// Word-level timing for a whole sequence, in input order.
pub fn extract_word_level_timing(segments: &[TimedSegment]) -> Vec<TimedSegment> {
    segments.iter().flat_map(expand_segment).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let seg = TimedSegment::new(1.0, 4.0, "one two three")
            .with_confidence(-0.3)
            .with_speaker("speaker_1");
        let words = expand_segment(&seg);

        assert_eq!(words.len(), 3);
        assert_eq!(words[0].original_text, "one");
        assert!((words[0].start_time - 1.0).abs() < 1e-9);
        assert!((words[0].end_time - 2.0).abs() < 1e-9);
        assert!((words[1].end_time - 3.0).abs() < 1e-9);
        assert_eq!(words[2].end_time, 4.0);
        assert!(words
            .iter()
            .all(|w| w.confidence == Some(-0.3) && w.speaker_id.as_deref() == Some("speaker_1")));
    }

    #[test]
    fn test_covers_segment_without_gaps() {
        let seg = TimedSegment::new(0.3, 1.0, "a b c d e f g");
        let words = expand_segment(&seg);

        assert_eq!(words.len(), 7);
        assert_eq!(words.first().unwrap().start_time, seg.start_time);
        assert_eq!(words.last().unwrap().end_time, seg.end_time);
        for pair in words.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
    }

    #[test]
    fn test_token_round_trip() {
        let text = "Well, this is，a mixed、sentence";
        let seg = TimedSegment::new(0.0, 2.0, text);
        let words = expand_segment(&seg);

        let rebuilt: Vec<&str> = words.iter().map(|w| w.original_text.as_str()).collect();
        assert_eq!(rebuilt, tokenize(text));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(expand_segment(&TimedSegment::new(0.0, 1.0, "")).is_empty());
        assert!(expand_segment(&TimedSegment::new(0.0, 1.0, " , ")).is_empty());
    }

    #[test]
    fn test_zero_length_segment() {
        let words = expand_segment(&TimedSegment::new(2.0, 2.0, "quick word"));
        assert_eq!(words.len(), 2);
        assert!(words.iter().all(|w| w.start_time == 2.0 && w.end_time == 2.0));
    }

    #[test]
    fn test_sequence_preserves_order() {
        let segments = vec![
            TimedSegment::new(0.0, 1.0, "first pair"),
            TimedSegment::new(1.0, 1.5, ""),
            TimedSegment::new(2.0, 3.0, "second"),
        ];
        let words = extract_word_level_timing(&segments);

        let texts: Vec<&str> = words.iter().map(|w| w.original_text.as_str()).collect();
        assert_eq!(texts, vec!["first", "pair", "second"]);
        for pair in words.windows(2) {
            assert!(pair[1].start_time >= pair[0].start_time);
        }
    }
}
