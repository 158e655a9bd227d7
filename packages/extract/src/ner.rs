//! Named-entity recognition seam.
//!
//! The resolver's entity stage only needs geo-political spans in
//! left-to-right order, so any recognizer (a rule-based one, or a wrapper
//! around a statistical model) plugs in through [`EntityRecognizer`].

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::ExtractError;

/// Entity kinds the resolver and incident filter care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityLabel {
    /// Countries, states, cities, districts.
    #[strum(serialize = "GPE")]
    GeoPolitical,
    /// People.
    Person,
    /// Companies, agencies, institutions.
    #[strum(serialize = "ORG")]
    Organization,
}

/// A labelled span of raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Surface text as it appeared.
    pub text: String,
    /// Entity kind.
    pub label: EntityLabel,
    /// Byte offset in the recognized text.
    pub start: usize,
}

impl Entity {
    /// Whether this entity names a place.
    #[must_use]
    pub fn is_location(&self) -> bool {
        self.label == EntityLabel::GeoPolitical
    }
}

/// Extracts labelled entities from raw text.
pub trait EntityRecognizer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Returns entities in left-to-right order.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if the backend fails on this text.
    fn recognize(&self, text: &str) -> Result<Vec<Entity>, ExtractError>;
}

/// Which entity backend to construct.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityBackend {
    /// Capitalization-based recognizer bundled with this crate.
    #[default]
    Heuristic,
    /// No recognizer; the entity stage is skipped.
    Disabled,
}

impl EntityBackend {
    /// Builds the recognizer, or `None` for [`EntityBackend::Disabled`].
    #[must_use]
    pub fn build(self) -> Option<Arc<dyn EntityRecognizer>> {
        match self {
            Self::Heuristic => Some(Arc::new(HeuristicRecognizer)),
            Self::Disabled => None,
        }
    }
}

/// Runs of capitalized words, optionally dotted (`W.P.`), separated by
/// spaces or tabs only.
static CAPITALIZED_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}[\p{L}\p{N}'.]*(?:[ \t]+\p{Lu}[\p{L}\p{N}'.]*)*").expect("valid regex")
});

const HONORIFICS: &[&str] = &[
    "encik", "en", "puan", "pn", "cik", "tuan", "datuk", "dato", "datin", "tan sri", "tun",
    "haji", "hajah", "mr", "mrs", "ms", "dr", "inspektor", "sarjan", "koperal", "acp", "dsp",
];

const ORG_SUFFIXES: &[&str] = &["bhd", "berhad", "sdn", "inc", "ltd", "corp", "plc"];

const ORG_PREFIXES: &[&str] = &[
    "pdrm", "polis", "bank", "universiti", "university", "hospital", "kementerian", "jabatan",
    "majlis", "maybank", "cimb",
];

/// Rule-based recognizer: capitalized runs are places unless an honorific
/// marks a person or an organisational word marks an organization.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRecognizer;

impl HeuristicRecognizer {
    fn label_for(text: &str, preceding: &str) -> EntityLabel {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .collect();
        let first = words.first().map_or("", String::as_str);
        let last = words.last().map_or("", String::as_str);
        let previous = preceding
            .split_whitespace()
            .next_back()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .unwrap_or_default();
        let first_two = words.iter().take(2).cloned().collect::<Vec<_>>().join(" ");

        if HONORIFICS.contains(&first)
            || HONORIFICS.contains(&first_two.as_str())
            || HONORIFICS.contains(&previous.as_str())
        {
            EntityLabel::Person
        } else if ORG_SUFFIXES.contains(&last) || ORG_PREFIXES.contains(&first) {
            EntityLabel::Organization
        } else {
            EntityLabel::GeoPolitical
        }
    }
}

impl EntityRecognizer for HeuristicRecognizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn recognize(&self, text: &str) -> Result<Vec<Entity>, ExtractError> {
        Ok(CAPITALIZED_RUN_RE
            .find_iter(text)
            .map(|m| {
                let surface = m.as_str().trim_end_matches(['.', '\'']);
                Entity {
                    text: surface.to_string(),
                    label: Self::label_for(surface, &text[..m.start()]),
                    start: m.start(),
                }
            })
            .filter(|e| !e.text.is_empty())
            .collect())
    }
}
