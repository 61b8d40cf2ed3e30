//! Per-word timing estimation inside a chunk.
//!
//! The synthesis engine reports only a chunk duration, so word boundaries are
//! estimated by scoring each word and scaling the scores to the measured
//! duration. The scoring is pluggable through [`WordScorer`].

/// Overlap added to the end of every word but the last one, capped at half
/// of the following word.
pub const BOUNDARY_EPSILON: f64 = 0.01;

/// Relative speaking cost of a word.
pub trait WordScorer: Send + Sync {
    /// Must be positive for any non-empty word.
    fn score(&self, word: &str) -> f64;
}

/// Length-based cost with bonuses for punctuation, digits, capitals and long words.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScorer;

impl WordScorer for HeuristicScorer {
    fn score(&self, word: &str) -> f64 {
        let length = word.chars().count();
        let mut score = length as f64;

        if word.ends_with(['.', ',', '!', '?', ';', ':']) {
            score += 2.0; // Pause after punctuation
        }
        if word.chars().any(|c| c.is_ascii_digit()) {
            score += 1.0;
        }
        if word.chars().any(char::is_uppercase) {
            score += 1.0;
        }
        if length > 8 {
            score += 1.0;
        }

        score
    }
}

/// Estimated position of one word inside its chunk's audio, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordTiming {
    pub word_index: usize, // Global word index in the transcript
    pub start: f64,
    pub end: f64,
}

impl WordTiming {
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }
}

/// Timings of the chunk currently playing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkTimings {
    timings: Vec<WordTiming>,
}

impl ChunkTimings {
    /// Score `words` and spread them over `duration` seconds.
    ///
    /// # Arguments
    /// * `words` - Words of the chunk, in order
    /// * `first_word` - Global index of the chunk's first word
    /// * `duration` - Measured chunk duration in seconds
    /// * `scorer` - Cost model
    pub fn compute<S: AsRef<str>>(words: &[S], first_word: usize, duration: f64, scorer: &dyn WordScorer) -> Self {
        let scores: Vec<f64> = words.iter().map(|w| scorer.score(w.as_ref()).max(0.0)).collect();
        let total: f64 = scores.iter().sum();
        if total <= 0.0 || duration <= 0.0 {
            return Self::default();
        }

        let scale = duration / total;
        let mut boundaries = Vec::with_capacity(scores.len() + 1);
        let mut elapsed = 0.0;
        boundaries.push(elapsed);
        for score in &scores {
            elapsed += score * scale;
            boundaries.push(elapsed);
        }
        let last = scores.len() - 1;
        boundaries[last + 1] = duration;

        // The overlap never reaches past the middle of the next word
        let timings = (0..scores.len())
            .map(|i| {
                let start = boundaries[i];
                let end = if i == last {
                    duration
                } else {
                    let next_share = boundaries[i + 2] - boundaries[i + 1];
                    boundaries[i + 1] + BOUNDARY_EPSILON.min(next_share / 2.0)
                };
                WordTiming { word_index: first_word + i, start, end }
            })
            .collect();

        Self { timings }
    }

    /// Global index of the word playing at `position` seconds.
    pub fn word_at(&self, position: f64) -> Option<usize> {
        self.timings.iter().find(|t| t.contains(position)).map(|t| t.word_index)
    }

    pub fn timings(&self) -> &[WordTiming] {
        &self.timings
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }
}
