//! Progress of one word-search puzzle.
//!
//! Grid generation and cell selection live in the UI. This type only knows
//! which words are hidden, which were found, and what to report.

use std::collections::HashSet;
use std::time::Duration;

use super::ScoreMessage;

/// Word list used when none is supplied.
pub const DEFAULT_WORDS: [&str; 5] = ["ANGULAR", "SOCKET", "SPRING", "JAVA", "PUZZLE"];

/// Something worth reporting to the scoring service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A hidden word was found for the first time.
    WordFound {
        /// The word, upper-cased.
        word: String,
        /// Whole seconds since the puzzle started.
        elapsed_secs: u64,
    },
    /// The last hidden word was found.
    Solved {
        /// Whole seconds since the puzzle started.
        elapsed_secs: u64,
    },
}

impl GameEvent {
    /// Score message announcing this event.
    #[must_use]
    pub fn to_score_message(&self) -> ScoreMessage {
        match self {
            Self::WordFound { word, elapsed_secs } => ScoreMessage::word_found(word, *elapsed_secs),
            Self::Solved { elapsed_secs } => ScoreMessage::game_solved(*elapsed_secs),
        }
    }
}

/// Hidden words and the ones found so far.
#[derive(Debug, Clone)]
pub struct WordSearchGame {
    words: Vec<String>,
    found: HashSet<String>,
}

impl WordSearchGame {
    /// Creates a game over `words`. Words are trimmed and upper-cased;
    /// blanks and duplicates are dropped.
    #[must_use]
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for word in words {
            let word = normalize(word.as_ref());
            if !word.is_empty() && !list.contains(&word) {
                list.push(word);
            }
        }
        Self {
            words: list,
            found: HashSet::new(),
        }
    }

    /// Hidden words in their original order.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Returns `true` if `word` was already found.
    #[must_use]
    pub fn is_found(&self, word: &str) -> bool {
        self.found.contains(&normalize(word))
    }

    /// Number of words found.
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.found.len()
    }

    /// Returns `true` once every word was found.
    #[must_use]
    pub fn is_solved(&self) -> bool {
        !self.words.is_empty() && self.found.len() == self.words.len()
    }

    /// Records a selection.
    ///
    /// Returns nothing for words that are not hidden or were already
    /// found, `[WordFound]` for a new find, and `[WordFound, Solved]` for
    /// the last one.
    pub fn mark_found(&mut self, word: &str, elapsed: Duration) -> Vec<GameEvent> {
        let word = normalize(word);
        if !self.words.contains(&word) || !self.found.insert(word.clone()) {
            return Vec::new();
        }
        let elapsed_secs = elapsed.as_secs();
        let mut events = vec![GameEvent::WordFound { word, elapsed_secs }];
        if self.is_solved() {
            events.push(GameEvent::Solved { elapsed_secs });
        }
        events
    }
}

impl Default for WordSearchGame {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS)
    }
}

fn normalize(word: &str) -> String {
    word.trim().to_uppercase()
}
