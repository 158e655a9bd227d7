//! Location resolution strategy chain.
//!
//! Strategies run in a fixed order and the first one that finds something
//! wins, even if a later strategy would also have matched:
//!
//! 1. **Alias** -- an alias target appears verbatim in the normalized text.
//! 2. **Phrase** -- a gazetteer name appears after a locative preposition.
//! 3. **Entity** -- a geo-political entity from the recognizer is a
//!    gazetteer name.
//! 4. Default `("Unknown", "Unknown")`.
//!
//! Every location produced here comes from a [`Place`], so a resolved
//! district always carries its gazetteer owner as the state.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use safezone_gazetteer::normalize::NormalizedText;
use safezone_gazetteer::{Gazetteer, NameMatch, Place};
use safezone_report_models::ResolvedLocation;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::ExtractError;
use crate::ner::{EntityBackend, EntityRecognizer};

/// Locative prepositions (Malay and English). Multi-word forms come first so
/// they win over their one-word prefixes.
static LOCATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:di dalam|di kawasan|dalam kawasan|di|kat|dekat|dalam|in|at|inside|within)\b",
    )
    .expect("valid regex")
});

/// Outcome of a single strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The strategy produced a location.
    Found(ResolvedLocation),
    /// The strategy found nothing; try the next one.
    NotFound,
}

impl Resolution {
    fn from_place(place: Place<'_>) -> Self {
        place.to_location().map_or(Self::NotFound, Self::Found)
    }
}

/// The strategies of the chain, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    /// Alias target short-circuit.
    Alias,
    /// Locative phrase match.
    Phrase,
    /// Entity recognition fallback.
    Entity,
}

/// Which strategies are enabled, and which entity backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Enable the alias short-circuit.
    pub alias: bool,
    /// Enable the locative phrase match.
    pub phrase: bool,
    /// Enable the entity recognition fallback.
    pub entity: bool,
    /// Entity recognizer backend.
    pub backend: EntityBackend,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            alias: true,
            phrase: true,
            entity: true,
            backend: EntityBackend::Heuristic,
        }
    }
}

/// Full account of one resolution, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTrace {
    /// The normalized form of the input.
    pub normalized: NormalizedText,
    /// The final location.
    pub location: ResolvedLocation,
    /// The strategy that produced it, or `None` for the default.
    pub strategy: Option<Strategy>,
}

/// Resolves free text to a `(state, district)` pair.
#[derive(Clone)]
pub struct LocationResolver {
    gazetteer: Arc<Gazetteer>,
    config: ResolverConfig,
    recognizer: Option<Arc<dyn EntityRecognizer>>,
}

impl std::fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("config", &self.config)
            .field("recognizer", &self.recognizer.as_ref().map(|r| r.name()))
            .finish_non_exhaustive()
    }
}

impl LocationResolver {
    /// Creates a resolver, building the recognizer named in `config`.
    #[must_use]
    pub fn new(gazetteer: Arc<Gazetteer>, config: ResolverConfig) -> Self {
        let recognizer = if config.entity {
            config.backend.build()
        } else {
            None
        };
        Self {
            gazetteer,
            config,
            recognizer,
        }
    }

    /// Creates a resolver with a caller-supplied recognizer.
    #[must_use]
    pub fn with_recognizer(
        gazetteer: Arc<Gazetteer>,
        config: ResolverConfig,
        recognizer: Option<Arc<dyn EntityRecognizer>>,
    ) -> Self {
        Self {
            gazetteer,
            config,
            recognizer: recognizer.filter(|_| config.entity),
        }
    }

    /// The gazetteer this resolver matches against.
    #[must_use]
    pub fn gazetteer(&self) -> &Gazetteer {
        &self.gazetteer
    }

    /// The entity recognizer, when the entity stage is enabled.
    #[must_use]
    pub fn recognizer(&self) -> Option<&dyn EntityRecognizer> {
        self.recognizer.as_deref()
    }

    /// Resolves `raw` to a location. Never fails.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> ResolvedLocation {
        self.trace(raw).location
    }

    /// Resolves `raw` and reports which strategy decided.
    #[must_use]
    pub fn trace(&self, raw: &str) -> ResolutionTrace {
        let normalized = self.gazetteer.normalize(raw);

        for strategy in [Strategy::Alias, Strategy::Phrase, Strategy::Entity] {
            match self.run(strategy, raw, &normalized) {
                Ok(Resolution::Found(location)) => {
                    log::trace!("{strategy} strategy resolved {location} for: {raw}");
                    return ResolutionTrace {
                        normalized,
                        location,
                        strategy: Some(strategy),
                    };
                }
                Ok(Resolution::NotFound) => {}
                Err(e) => {
                    log::error!("{strategy} strategy failed, falling through: {e}");
                }
            }
        }

        log::warn!("No location found for text: {raw}");
        ResolutionTrace {
            normalized,
            location: ResolvedLocation::unknown(),
            strategy: None,
        }
    }

    fn run(
        &self,
        strategy: Strategy,
        raw: &str,
        normalized: &NormalizedText,
    ) -> Result<Resolution, ExtractError> {
        match strategy {
            Strategy::Alias if self.config.alias => Ok(self.alias_match(normalized)),
            Strategy::Phrase if self.config.phrase => Ok(self.phrase_match(normalized)),
            Strategy::Entity => match &self.recognizer {
                Some(recognizer) => self.entity_match(recognizer.as_ref(), raw),
                None => Ok(Resolution::NotFound),
            },
            Strategy::Alias | Strategy::Phrase => Ok(Resolution::NotFound),
        }
    }

    /// Leftmost alias target in the text; the longest one on ties.
    fn alias_match(&self, text: &NormalizedText) -> Resolution {
        let leftmost = self
            .gazetteer
            .alias_targets()
            .filter_map(|target| text.find_phrase(target).map(|offset| (offset, target)))
            .min_by_key(|(offset, _)| *offset);

        match leftmost {
            Some((_, target)) => Resolution::from_place(self.gazetteer.place(target)),
            None => Resolution::NotFound,
        }
    }

    /// Gazetteer names after a locative preposition.
    ///
    /// Each preposition opens a span running to the end of the text. Spans
    /// are tried left to right and the first one containing a name wins;
    /// within a span the longest name wins, earliest on ties.
    fn phrase_match(&self, text: &NormalizedText) -> Resolution {
        let text = text.as_str();

        for m in LOCATIVE_RE.find_iter(text) {
            let span = text[m.end()..].trim_start();
            if span.is_empty() {
                continue;
            }
            if let Some(best) = best_match(self.gazetteer.find_names(span)) {
                return Resolution::from_place(self.gazetteer.place(best.name));
            }
        }

        Resolution::NotFound
    }

    /// Geo-political entities the gazetteer recognizes.
    ///
    /// With two or more, the first is the state candidate and the second the
    /// district candidate; a district in either slot wins and brings its
    /// owning state. With one, it is used as whatever the gazetteer says it
    /// is.
    fn entity_match(
        &self,
        recognizer: &dyn EntityRecognizer,
        raw: &str,
    ) -> Result<Resolution, ExtractError> {
        let places: Vec<Place<'_>> = recognizer
            .recognize(raw)?
            .iter()
            .filter(|entity| entity.is_location())
            .map(|entity| self.gazetteer.lookup(&entity.text))
            .filter(|place| *place != Place::Unknown)
            .collect();

        Ok(match places.as_slice() {
            [] => Resolution::NotFound,
            [only] => Resolution::from_place(*only),
            [state_candidate, district_candidate, ..] => {
                let place = if district_candidate.is_district() {
                    *district_candidate
                } else {
                    *state_candidate
                };
                Resolution::from_place(place)
            }
        })
    }
}

/// Longest match (tokens, then bytes), earliest offset on ties.
fn best_match(matches: Vec<NameMatch<'_>>) -> Option<NameMatch<'_>> {
    matches.into_iter().min_by(|a, b| {
        let tokens = |m: &NameMatch<'_>| m.name.split(' ').count();
        tokens(b)
            .cmp(&tokens(a))
            .then_with(|| b.name.len().cmp(&a.name.len()))
            .then_with(|| a.offset.cmp(&b.offset))
    })
}
