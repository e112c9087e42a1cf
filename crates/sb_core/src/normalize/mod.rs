use serde::{Deserialize, Serialize};

/// Collapse every whitespace run to a single space and trim the ends.
///
/// Paragraph and line structure does not survive this step.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A contiguous word window of a normalized document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordChunk {
    /// Zero-based position in the chunk sequence.
    pub ordinal: u32,
    /// Index of the first word of this window in the document's word sequence.
    pub word_start: usize,
    pub word_count: usize,
    pub text: String,
}

/// Advance between consecutive windows.
fn step_for(window: usize, overlap: usize) -> usize {
    if overlap >= window {
        window
    } else {
        window - overlap
    }
}

/// Split `text` into overlapping word windows.
///
/// Windows hold `window` words (`0` is read as `1`) and advance by
/// `window - overlap`, or by `window` when the overlap would not leave any
/// progress. Emission stops with the first window that reaches the last word,
/// so only the final window can be shorter.
pub fn chunk_words(text: &str, window: usize, overlap: usize) -> Vec<WordChunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let window = window.max(1);
    let step = step_for(window, overlap);

    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(words.len());
        out.push(WordChunk {
            ordinal: out.len() as u32,
            word_start: start,
            word_count: end - start,
            text: words[start..end].join(" "),
        });
        if end == words.len() {
            break;
        }
        start += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const CELL: &str =
        "The mitochondria is the powerhouse of the cell.\n\n  It produces ATP through respiration.";

    #[test]
    fn normalize_collapses_whitespace_runs() {
        assert_eq!(normalize_text("  a\tb\n\n c  "), "a b c");
        assert_eq!(normalize_text(" \n\t "), "");
    }

    #[test]
    fn mitochondria_windows() {
        let text = normalize_text(CELL);
        let chunks = chunk_words(&text, 8, 2);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "The mitochondria is the powerhouse of the cell.",
                "the cell. It produces ATP through respiration.",
            ]
        );
        assert_eq!(chunks[1].word_start, 6);
        assert_eq!(chunks[1].ordinal, 1);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_words("just four small words", 450, 120);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].word_count, 4);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_words("   ", 10, 2).is_empty());
    }

    #[test]
    fn degenerate_window_and_overlap() {
        // window 0 behaves as 1
        let chunks = chunk_words("a b c", 0, 0);
        assert_eq!(chunks.len(), 3);
        // overlap >= window advances by a full window
        let chunks = chunk_words("a b c d e", 2, 5);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b", "c d", "e"]);
    }

    fn expected_count(n: usize, window: usize, overlap: usize) -> usize {
        let window = window.max(1);
        let step = step_for(window, overlap);
        let overlap = window - step;
        if n <= overlap {
            return 1;
        }
        ((n - overlap) + step - 1) / step
    }

    proptest! {
        #[test]
        fn chunk_count_matches_formula(
            words in prop::collection::vec("[a-z]{1,6}", 1..300),
            window in 1usize..60,
            overlap in 0usize..80,
        ) {
            let text = words.join(" ");
            let chunks = chunk_words(&text, window, overlap);
            prop_assert_eq!(chunks.len(), expected_count(words.len(), window, overlap).max(1));
        }

        #[test]
        fn overlap_removed_chunks_rebuild_word_sequence(
            words in prop::collection::vec("[a-z]{1,6}", 0..300),
            window in 1usize..60,
            overlap in 0usize..80,
        ) {
            let text = words.join(" ");
            let chunks = chunk_words(&text, window, overlap);

            let mut rebuilt: Vec<String> = Vec::new();
            for c in &chunks {
                let skip = rebuilt.len().saturating_sub(c.word_start);
                rebuilt.extend(c.text.split(' ').skip(skip).map(str::to_string));
                prop_assert_eq!(c.word_count, c.text.split(' ').count());
            }
            prop_assert_eq!(rebuilt, words);
        }
    }
}
