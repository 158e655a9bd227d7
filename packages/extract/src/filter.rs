//! Crime-incident keyword gate.
//!
//! Reports that mention none of the configured keywords, or (when an entity
//! backend is available) no location at all, are not treated as crime
//! incidents and never become records.

use serde::{Deserialize, Serialize};

use crate::ner::EntityRecognizer;

/// Keywords used when the filter is enabled without an explicit list.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "rompakan", "culik", "bunuh", "curi", "serangan", "rogol", "jenayah", "polis",
];

/// Incident filter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Whether the filter runs at all.
    pub enabled: bool,
    /// Lowercase keywords, matched as substrings of the lowercased text.
    pub keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keywords: DEFAULT_KEYWORDS.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Decides whether a report describes a crime incident.
#[derive(Debug, Clone)]
pub struct IncidentFilter {
    config: FilterConfig,
}

impl IncidentFilter {
    /// Creates a filter from settings.
    #[must_use]
    pub fn new(mut config: FilterConfig) -> Self {
        for keyword in &mut config.keywords {
            *keyword = keyword.trim().to_lowercase();
        }
        config.keywords.retain(|k| !k.is_empty());
        Self { config }
    }

    /// Whether the filter is active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether `text` passes the gate. Always `true` when disabled.
    ///
    /// A recognizer failure is logged and the keyword result stands.
    #[must_use]
    pub fn is_incident(&self, text: &str, recognizer: Option<&dyn EntityRecognizer>) -> bool {
        if !self.config.enabled {
            return true;
        }

        let lower = text.to_lowercase();
        if !self.config.keywords.iter().any(|k| lower.contains(k.as_str())) {
            return false;
        }

        let Some(recognizer) = recognizer else {
            return true;
        };

        match recognizer.recognize(text) {
            Ok(entities) => entities.iter().any(crate::ner::Entity::is_location),
            Err(e) => {
                log::error!("Entity check failed in incident filter: {e}");
                true
            }
        }
    }
}

impl Default for IncidentFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ner::HeuristicRecognizer;

    fn enabled() -> IncidentFilter {
        IncidentFilter::new(FilterConfig {
            enabled: true,
            ..FilterConfig::default()
        })
    }

    #[test]
    fn disabled_passes_everything() {
        let filter = IncidentFilter::default();
        assert!(!filter.is_enabled());
        assert!(filter.is_incident("cuaca cerah hari ini", None));
    }

    #[test]
    fn requires_a_keyword() {
        let filter = enabled();
        assert!(filter.is_incident("Kes ROMPAKAN di bank", None));
        assert!(!filter.is_incident("cuaca cerah hari ini", None));
    }

    #[test]
    fn requires_a_location_entity_when_recognizer_present() {
        let filter = enabled();
        let recognizer = HeuristicRecognizer;
        assert!(filter.is_incident("Kes curi motor di Kajang", Some(&recognizer)));
        assert!(!filter.is_incident("kes curi motor semalam", Some(&recognizer)));
    }

    #[test]
    fn keywords_are_normalized() {
        let filter = IncidentFilter::new(FilterConfig {
            enabled: true,
            keywords: vec!["  Samun ".to_string(), String::new()],
        });
        assert!(filter.is_incident("samun berlaku", None));
        assert!(!filter.is_incident("rompakan berlaku", None));
    }
}
