use crate::config::CharacterPolicy;
use crate::events::PipelineEvents;
use crate::quality::charset::{CharClass, classify_char};

/// Valid/invalid word tallies for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WordCounts {
    pub valid: usize,
    pub invalid: usize,
}

impl WordCounts {
    pub fn total(&self) -> usize {
        self.valid + self.invalid
    }

    /// Fraction of words free of invalid characters, in [0, 1]. A document
    /// with zero words scores 1.0: no words is no evidence of corruption,
    /// and the score must be defined for every input.
    pub fn score(&self) -> f64 {
        if self.total() == 0 {
            return 1.0;
        }
        1.0 - self.invalid as f64 / self.total() as f64
    }
}

/// A word is invalid if any of its characters classifies as Invalid. The
/// empty word is valid.
pub fn word_has_invalid_chars(policy: &CharacterPolicy, word: &str) -> bool {
    word.chars()
        .any(|character| classify_char(policy, character) == CharClass::Invalid)
}

/// Tokenize by whitespace and classify every word, reporting invalid words
/// to the event sink.
pub fn count_words(
    policy: &CharacterPolicy,
    text: &str,
    events: &dyn PipelineEvents,
) -> WordCounts {
    let mut counts = WordCounts::default();

    for word in text.split_whitespace() {
        if word_has_invalid_chars(policy, word) {
            events.invalid_word(word);
            counts.invalid += 1;
        } else {
            counts.valid += 1;
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::load_config;
    use crate::events::NullEvents;

    struct RecordingEvents {
        invalid_words: Mutex<Vec<String>>,
    }

    impl RecordingEvents {
        fn new() -> Self {
            Self {
                invalid_words: Mutex::new(Vec::new()),
            }
        }
    }

    impl PipelineEvents for RecordingEvents {
        fn invalid_word(&self, word: &str) {
            self.invalid_words
                .lock()
                .expect("lock poisoned")
                .push(word.to_string());
        }
    }

    #[test]
    fn empty_word_is_valid() {
        let config = load_config(None).expect("default config builds");
        assert!(!word_has_invalid_chars(&config.policy, ""));
    }

    #[test]
    fn word_with_one_invalid_char_is_invalid() {
        let config = load_config(None).expect("default config builds");
        assert!(!word_has_invalid_chars(&config.policy, "protein"));
        assert!(word_has_invalid_chars(&config.policy, "pro☺tein"));
    }

    #[test]
    fn score_of_empty_text_is_one() {
        let config = load_config(None).expect("default config builds");

        let counts = count_words(&config.policy, "", &NullEvents);
        assert_eq!(counts.total(), 0);
        assert_eq!(counts.score(), 1.0);

        let whitespace_only = count_words(&config.policy, " \n\t ", &NullEvents);
        assert_eq!(whitespace_only.score(), 1.0);
    }

    #[test]
    fn score_matches_invalid_fraction() {
        let config = load_config(None).expect("default config builds");

        let mut text = String::new();
        for _ in 0..92 {
            text.push_str("kinase ");
        }
        for _ in 0..8 {
            text.push_str("kin☺ase ");
        }

        let counts = count_words(&config.policy, &text, &NullEvents);
        assert_eq!(counts.valid, 92);
        assert_eq!(counts.invalid, 8);
        assert!((counts.score() - 0.92).abs() < 1e-12);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let config = load_config(None).expect("default config builds");

        for text in ["", "all valid words", "☺ ☺ ☺", "mixed ☺ bag"] {
            let score = count_words(&config.policy, text, &NullEvents).score();
            assert!((0.0..=1.0).contains(&score), "score {score} for {text:?}");
        }
    }

    #[test]
    fn invalid_words_are_reported_to_the_sink() {
        let config = load_config(None).expect("default config builds");
        let events = RecordingEvents::new();

        count_words(&config.policy, "fine bro☻ken fine", &events);

        let reported = events.invalid_words.lock().expect("lock poisoned");
        assert_eq!(reported.as_slice(), ["bro☻ken"]);
    }
}
