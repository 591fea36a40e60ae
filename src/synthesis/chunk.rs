/// Characters that end a sentence.
const SENTENCE_ENDINGS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Clause separators tried when no sentence ending fits.
const CLAUSE_BREAKS: &[char] = &[',', ';', ':', '，', '；', '、'];

/// Split text into chunks of at most `max_chars` characters.
///
/// Each chunk ends at the last sentence terminator that fits, else the last
/// clause separator, else the last space. Text without any of these is cut
/// hard at the limit. Chunks are trimmed and never empty.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_chars {
            chunks.push(remaining.trim().to_string());
            break;
        }

        // Byte index of the first character past the limit
        let byte_limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());

        let split_at = match find_best_split(&remaining[..byte_limit]) {
            Some(pos) => {
                // Keep the delimiter with the chunk that precedes it
                pos + remaining[pos..].chars().next().map_or(1, char::len_utf8)
            }
            None => byte_limit,
        };

        chunks.push(remaining[..split_at].trim().to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Byte position of the best delimiter in `text`.
fn find_best_split(text: &str) -> Option<usize> {
    let last_of = |set: &[char]| {
        text.char_indices()
            .filter(|(_, c)| set.contains(c))
            .map(|(i, _)| i)
            .last()
    };

    last_of(SENTENCE_ENDINGS)
        .or_else(|| last_of(CLAUSE_BREAKS))
        .or_else(|| text.rfind(char::is_whitespace))
        .filter(|&pos| pos > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        assert_eq!(split_text("Hello world", 42), vec!["Hello world"]);
        assert!(split_text("   ", 42).is_empty());
    }

    #[test]
    fn test_splits_at_sentence() {
        let text = "This is a sentence. This is another sentence.";
        let chunks = split_text(text, 30);

        assert_eq!(chunks, vec!["This is a sentence.", "This is another sentence."]);
    }

    #[test]
    fn test_falls_back_to_comma_then_space() {
        let chunks = split_text("first part, second part goes on", 20);
        assert_eq!(chunks[0], "first part,");

        let chunks = split_text("alpha beta gamma delta", 12);
        assert_eq!(chunks[0], "alpha beta");
        assert!(chunks.iter().all(|c| c.chars().count() <= 12));
    }

    #[test]
    fn test_hard_split_without_delimiters() {
        let chunks = split_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_cjk_text_counts_characters() {
        let text = "今天天气很好。我们去公园散步吧！好的";
        let chunks = split_text(text, 8);

        assert_eq!(chunks[0], "今天天气很好。");
        assert!(chunks.iter().all(|c| c.chars().count() <= 8));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_no_text_lost() {
        let text = "One. Two, three four! Five six seven eight nine ten eleven.";
        let chunks = split_text(text, 15);

        let rebuilt: String = chunks.join(" ");
        let squash = |s: &str| s.split_whitespace().collect::<String>();
        assert_eq!(squash(&rebuilt), squash(text));
        assert!(chunks.iter().all(|c| c.chars().count() <= 15));
    }
}
