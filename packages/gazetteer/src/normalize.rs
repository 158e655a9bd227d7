//! Free-text normalization for location matching.
//!
//! The pipeline is order-sensitive:
//! 1. Strip URLs (`http://`, `https://`, `ftp://`, `www.`)
//! 2. Lowercase
//! 3. Replace non-word characters with whitespace
//! 4. Collapse whitespace
//! 5. Apply alias substitution (whole tokens, longest key first)
//!
//! Steps 3-5 repeat until the text stops changing, which makes the output a
//! fixed point: `normalize(normalize(x)) == normalize(x)`.

use std::sync::LazyLock;

use regex::Regex;

use crate::alias::AliasTable;

/// Upper bound on clean/substitute rounds before giving up on a fixed point.
pub const MAX_ALIAS_PASSES: usize = 4;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:https?://|ftp://|www\.)\S*").expect("valid regex"));

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Text that has been through [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NormalizedText(String);

impl NormalizedText {
    /// Returns the normalized text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether nothing survived normalization.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Byte offset of `phrase` in this text, matched on whole tokens.
    #[must_use]
    pub fn find_phrase(&self, phrase: &str) -> Option<usize> {
        find_phrase(&self.0, phrase)
    }
}

impl std::fmt::Display for NormalizedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercases, strips non-word characters, and collapses whitespace.
///
/// This is steps 2-4 of the pipeline without URL stripping or aliasing. It
/// is also how gazetteer and alias keys are brought into comparable form.
#[must_use]
pub fn clean(input: &str) -> String {
    let lower = input.to_lowercase();
    clean_lowercase(&lower)
}

fn clean_lowercase(lower: &str) -> String {
    let no_punct = NON_WORD_RE.replace_all(lower, " ");
    WHITESPACE_RE.replace_all(&no_punct, " ").trim().to_string()
}

/// Normalizes `text` against `aliases`.
///
/// Returns the text together with whether a fixed point was reached within
/// [`MAX_ALIAS_PASSES`] rounds.
#[must_use]
pub fn normalize_checked(text: &str, aliases: &AliasTable) -> (NormalizedText, bool) {
    let no_urls = URL_RE.replace_all(text, " ");
    let mut current = no_urls.to_lowercase();

    // The first round always cleans; later rounds only matter when an alias
    // target, once cleaned, is itself the start of a longer alias key.
    for _ in 0..=MAX_ALIAS_PASSES {
        let next = aliases.substitute(&clean_lowercase(&current));
        if next == current {
            return (NormalizedText(current), true);
        }
        current = next;
    }

    (NormalizedText(current), false)
}

/// Normalizes `text` against `aliases`.
#[must_use]
pub fn normalize(text: &str, aliases: &AliasTable) -> NormalizedText {
    let (normalized, converged) = normalize_checked(text, aliases);
    if !converged {
        log::warn!("Alias substitution did not reach a fixed point for: {text}");
    }
    normalized
}

/// Byte offset of `phrase` within space-separated `text`, matched on whole
/// tokens.
#[must_use]
pub fn find_phrase(text: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    let padded_text = format!(" {text} ");
    let padded_phrase = format!(" {phrase} ");
    padded_text.find(&padded_phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> AliasTable {
        let mut t = AliasTable::new();
        t.insert("kl", "w.p. kuala lumpur");
        t.insert("kuala lumpur", "w.p. kuala lumpur");
        t.insert("w p kuala lumpur", "w.p. kuala lumpur");
        t.insert("sg buloh", "sg. buloh");
        t.insert("jb", "johor bahru");
        t.insert("johor bahru selatan", "johor bahru");
        t
    }

    #[test]
    fn strips_urls() {
        let t = aliases();
        assert_eq!(
            normalize("Rompakan https://t.co/abc123 di Kajang", &t).as_str(),
            "rompakan di kajang"
        );
        assert_eq!(
            normalize("lihat www.example.com/x sekarang", &t).as_str(),
            "lihat sekarang"
        );
    }

    #[test]
    fn keeps_words_that_start_with_http() {
        let t = aliases();
        assert_eq!(normalize("httpd crashed", &t).as_str(), "httpd crashed");
    }

    #[test]
    fn strips_punctuation_and_collapses_whitespace() {
        let t = aliases();
        assert_eq!(
            normalize("  Curi!!!   motor,,  di   Ipoh.  ", &t).as_str(),
            "curi motor di ipoh"
        );
    }

    #[test]
    fn applies_aliases_after_cleaning() {
        let t = aliases();
        assert_eq!(
            normalize("Kejadian di KL!", &t).as_str(),
            "kejadian di w.p. kuala lumpur"
        );
        assert_eq!(normalize("Sg. Buloh", &t).as_str(), "sg. buloh");
    }

    #[test]
    fn does_not_corrupt_longer_words() {
        let t = aliases();
        assert_eq!(normalize("di klang", &t).as_str(), "di klang");
    }

    #[test]
    fn alias_targets_that_start_longer_keys_converge() {
        let t = aliases();
        let once = normalize("jb selatan", &t);
        assert_eq!(once.as_str(), "johor bahru");
    }

    #[test]
    fn is_idempotent() {
        let t = aliases();
        let samples = [
            "dirompak di shah alam semalam",
            "Kejadian di kawasan Kuala Lumpur",
            "KL, W.P. Kuala Lumpur & sg buloh!!",
            "jb selatan https://x.y/z",
            "w p w p kuala lumpur",
            "",
            "   ",
            "Cameron Highland's best",
            "Jalan_Ampang 123",
        ];
        for sample in samples {
            let once = normalize(sample, &t);
            let twice = normalize(once.as_str(), &t);
            assert_eq!(once, twice, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn finds_phrases_on_token_boundaries() {
        assert_eq!(find_phrase("di shah alam", "shah alam"), Some(3));
        assert_eq!(find_phrase("di shah alamanda", "shah alam"), None);
        assert_eq!(find_phrase("shah alam", "shah alam"), Some(0));
        assert_eq!(find_phrase("anything", ""), None);
    }

    #[test]
    fn clean_matches_pipeline_steps() {
        assert_eq!(clean("W.P. Kuala  Lumpur"), "w p kuala lumpur");
    }
}
