//! Spoken number words and the lenient parser that turns an utterance into an integer.

/// Largest value accepted when an utterance is a literal numeral.
pub const MAX_SPOKEN_NUMBER: i64 = 20;

/// An ordered word-to-integer table for one language.
///
/// Declaration order is significant: fuzzy matching returns the first entry
/// that overlaps the utterance, not the closest one.
#[derive(Debug, Clone, Copy)]
pub struct Lexicon {
    entries: &'static [(&'static str, i64)],
}

impl Lexicon {
    pub const fn new(entries: &'static [(&'static str, i64)]) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &'static [(&'static str, i64)] {
        self.entries
    }

    /// Exact lookup of a single word form.
    pub fn lookup(&self, word: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == word)
            .map(|(_, value)| *value)
    }

    /// Maps a recognised utterance to a number.
    ///
    /// Resolution order, first match wins:
    /// 1. exact lookup of the lower-cased, trimmed utterance;
    /// 2. a leading base-10 numeral in `0..=MAX_SPOKEN_NUMBER`;
    /// 3. the first entry that contains the utterance or is contained by it.
    ///
    /// An empty utterance never matches.
    pub fn parse(&self, utterance: &str) -> Option<i64> {
        let cleaned = utterance.trim().to_lowercase();
        if cleaned.is_empty() {
            return None;
        }

        if let Some(value) = self.lookup(&cleaned) {
            return Some(value);
        }

        if let Some(value) = parse_numeral(&cleaned) {
            return Some(value);
        }

        self.entries
            .iter()
            .find(|(word, _)| cleaned.contains(word) || word.contains(cleaned.as_str()))
            .map(|(_, value)| *value)
    }
}

/// Reads the leading digit run, rejecting values outside the spoken range.
fn parse_numeral(text: &str) -> Option<i64> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    text[..end]
        .parse::<i64>()
        .ok()
        .filter(|value| (0..=MAX_SPOKEN_NUMBER).contains(value))
}
