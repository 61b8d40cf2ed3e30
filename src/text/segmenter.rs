//! Whitespace word segmentation into fixed-size chunks.

use std::ops::Range;

/// A contiguous slice of transcript words, the unit of synthesis and delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,        // Position in transcript order, sole ordering key
    pub words: Range<usize>, // Global word range [start, end)
    pub text: String,        // Words joined by single spaces
}

impl Chunk {
    /// Number of words in this chunk.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

/// Split text into chunks of at most `chunk_words` words.
///
/// Tokenization is pure whitespace splitting with no sentence awareness.
/// Empty or whitespace-only input yields no chunks.
///
/// # Arguments
/// * `text` - The transcript
/// * `chunk_words` - Words per chunk (values below 1 are treated as 1)
///
/// # Returns
/// Chunks indexed from 0, partitioning the transcript's words.
pub fn segment(text: &str, chunk_words: usize) -> Vec<Chunk> {
    let size = chunk_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();

    words
        .chunks(size)
        .enumerate()
        .map(|(index, slice)| {
            let start = index * size;
            Chunk { index, words: start..start + slice.len(), text: slice.join(" ") }
        })
        .collect()
}

/// Immutable word list of a loaded transcript.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    words: Vec<String>,
}

impl Transcript {
    pub fn new(text: &str) -> Self {
        Self { words: text.split_whitespace().map(str::to_string).collect() }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Joined text, as sent in a `convert` request.
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    pub fn word(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(String::as_str)
    }

    /// Words belonging to chunk `index` under a chunk size of `chunk_words`.
    ///
    /// Out-of-range chunks return an empty slice.
    pub fn chunk_words(&self, index: usize, chunk_words: usize) -> &[String] {
        let size = chunk_words.max(1);
        let start = index.saturating_mul(size).min(self.words.len());
        let end = start.saturating_add(size).min(self.words.len());
        &self.words[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_segment_120_words() {
        let chunks = segment(&numbered(120), 50);
        let counts: Vec<usize> = chunks.iter().map(Chunk::word_count).collect();
        assert_eq!(counts, vec![50, 50, 20]);
        assert_eq!(chunks[2].words, 100..120);
        assert!(chunks[2].text.starts_with("w100 "));
    }

    #[test]
    fn test_segment_partitions_transcript() {
        for total in [0, 1, 49, 50, 51, 137, 500] {
            for size in [1, 7, 50, 100] {
                let chunks = segment(&numbered(total), size);
                let mut next = 0;
                for (i, chunk) in chunks.iter().enumerate() {
                    assert_eq!(chunk.index, i);
                    assert_eq!(chunk.words.start, next);
                    assert!(chunk.word_count() <= size);
                    assert!(chunk.word_count() > 0);
                    next = chunk.words.end;
                }
                assert_eq!(next, total);
            }
        }
    }

    #[test]
    fn test_segment_empty_input() {
        assert!(segment("", 50).is_empty());
        assert!(segment(" \n\t ", 50).is_empty());
    }

    #[test]
    fn test_segment_collapses_whitespace() {
        let chunks = segment("  one\ttwo\n\nthree   four ", 3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three");
        assert_eq!(chunks[1].text, "four");
    }

    #[test]
    fn test_segment_is_deterministic() {
        let text = numbered(233);
        assert_eq!(segment(&text, 50), segment(&text, 50));
    }

    #[test]
    fn test_transcript_chunk_words() {
        let transcript = Transcript::new(&numbered(120));
        assert_eq!(transcript.chunk_words(0, 50).len(), 50);
        assert_eq!(transcript.chunk_words(2, 50).len(), 20);
        assert_eq!(transcript.chunk_words(2, 50)[0], "w100");
        assert!(transcript.chunk_words(3, 50).is_empty());
        assert!(transcript.chunk_words(usize::MAX, 50).is_empty());
    }

    #[test]
    fn test_transcript_emptiness() {
        assert!(Transcript::new(" \n\t ").is_empty());
        assert!(Transcript::default().is_empty());
        let transcript = Transcript::new("one two");
        assert!(!transcript.is_empty());
        assert_eq!(transcript.len(), 2);
    }
}
