#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Malaysian state/district gazetteer and alias normalization.
//!
//! The gazetteer is loaded once at startup (from the embedded
//! `data/malaysia.toml` or a replacement file with the same shape),
//! validated, and then shared immutably by reference. Every problem with the
//! data is reported by [`Gazetteer::from_data`] as a [`GazetteerError`];
//! nothing is checked lazily at resolution time.

pub mod alias;
pub mod normalize;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use safezone_report_models::ResolvedLocation;
use serde::Deserialize;

use crate::alias::AliasTable;
use crate::normalize::{NormalizedText, clean, normalize_checked};

/// The gazetteer shipped with the binary.
const MALAYSIA_TOML: &str = include_str!("../data/malaysia.toml");

/// Errors detected while loading gazetteer data.
#[derive(Debug, thiserror::Error)]
pub enum GazetteerError {
    /// The data file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The data file is not valid TOML for the expected shape.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A name is empty or not in normalized form.
    #[error("name {name:?} is not normalized (expected {expected:?})")]
    NotNormalized {
        /// The offending name.
        name: String,
        /// What the name would look like once normalized.
        expected: String,
    },

    /// The same name is listed twice.
    #[error("duplicate {kind} name: {name:?}")]
    Duplicate {
        /// `"state"` or `"district"`.
        kind: &'static str,
        /// The duplicated name.
        name: String,
    },

    /// A name is listed both as a state and as a district, or two names
    /// collapse to the same cleaned form.
    #[error("ambiguous name {name:?} collides with {other:?}")]
    Ambiguous {
        /// The offending name.
        name: String,
        /// The name it collides with.
        other: String,
    },

    /// A `district_states` key is not in the district list.
    #[error("district {district:?} has an owner but is not in the district list")]
    DistrictNotListed {
        /// The unlisted district.
        district: String,
    },

    /// A `district_states` value is not in the state list.
    #[error("district {district:?} is owned by unknown state {state:?}")]
    UnknownOwnerState {
        /// The district.
        district: String,
        /// The owner that is not a listed state.
        state: String,
    },

    /// A listed district has no owning state.
    #[error("district {district:?} has no owning state")]
    MissingOwner {
        /// The district without an owner.
        district: String,
    },

    /// An alias rule is unusable.
    #[error("invalid alias {alias:?} -> {target:?}: {reason}")]
    InvalidAlias {
        /// Surface form.
        alias: String,
        /// Canonical target.
        target: String,
        /// Why the rule was rejected.
        reason: String,
    },
}

/// Raw gazetteer data as stored in TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GazetteerData {
    /// Canonical state names.
    pub states: Vec<String>,
    /// Canonical district names.
    pub districts: Vec<String>,
    /// District -> owning state.
    pub district_states: BTreeMap<String, String>,
    /// Colloquial surface form -> canonical name.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl GazetteerData {
    /// Parses gazetteer data from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`GazetteerError::Toml`] if the document does not have the
    /// expected shape.
    pub fn from_toml(toml_str: &str) -> Result<Self, GazetteerError> {
        Ok(toml::de::from_str(toml_str)?)
    }
}

/// What a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place<'a> {
    /// A canonical state.
    State(&'a str),
    /// A canonical district and the state that owns it.
    District {
        /// Canonical district name.
        district: &'a str,
        /// Owning state.
        state: &'a str,
    },
    /// Not in the gazetteer.
    Unknown,
}

impl Place<'_> {
    /// Converts a known place into a [`ResolvedLocation`].
    ///
    /// Districts always carry their owning state; states get an unknown
    /// district.
    #[must_use]
    pub fn to_location(self) -> Option<ResolvedLocation> {
        match self {
            Self::State(state) => Some(ResolvedLocation::state_only(state)),
            Self::District { district, state } => Some(ResolvedLocation::district(state, district)),
            Self::Unknown => None,
        }
    }

    /// Whether this place is a district.
    #[must_use]
    pub const fn is_district(self) -> bool {
        matches!(self, Self::District { .. })
    }
}

/// An occurrence of a gazetteer name inside normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameMatch<'a> {
    /// Canonical name that matched.
    pub name: &'a str,
    /// Byte offset in the searched text.
    pub offset: usize,
}

/// Validated, immutable gazetteer.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    states: BTreeSet<String>,
    /// District -> owning state.
    districts: BTreeMap<String, String>,
    /// Cleaned form of every canonical name -> canonical name.
    cleaned_names: BTreeMap<String, String>,
    /// Every canonical name, longest first (token count, then byte length).
    names_longest_first: Vec<String>,
    /// Distinct alias targets, longest first.
    alias_targets: Vec<String>,
    aliases: AliasTable,
}

impl Gazetteer {
    /// Loads the embedded Malaysian gazetteer.
    ///
    /// # Errors
    ///
    /// Returns a [`GazetteerError`] if the embedded data fails validation.
    pub fn malaysia() -> Result<Self, GazetteerError> {
        Self::from_data(GazetteerData::from_toml(MALAYSIA_TOML)?)
    }

    /// Loads and validates a gazetteer TOML file.
    ///
    /// # Errors
    ///
    /// Returns a [`GazetteerError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn from_path(path: &Path) -> Result<Self, GazetteerError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_data(GazetteerData::from_toml(&contents)?)
    }

    /// Validates `data` and builds the lookup tables.
    ///
    /// # Errors
    ///
    /// Returns the first [`GazetteerError`] found.
    #[allow(clippy::too_many_lines)]
    pub fn from_data(data: GazetteerData) -> Result<Self, GazetteerError> {
        let mut states = BTreeSet::new();
        for state in &data.states {
            check_normalized(state)?;
            if !states.insert(state.clone()) {
                return Err(GazetteerError::Duplicate {
                    kind: "state",
                    name: state.clone(),
                });
            }
        }

        let mut listed_districts = BTreeSet::new();
        for district in &data.districts {
            check_normalized(district)?;
            if states.contains(district) {
                return Err(GazetteerError::Ambiguous {
                    name: district.clone(),
                    other: district.clone(),
                });
            }
            if !listed_districts.insert(district.clone()) {
                return Err(GazetteerError::Duplicate {
                    kind: "district",
                    name: district.clone(),
                });
            }
        }

        for (district, state) in &data.district_states {
            if !listed_districts.contains(district) {
                return Err(GazetteerError::DistrictNotListed {
                    district: district.clone(),
                });
            }
            if !states.contains(state) {
                return Err(GazetteerError::UnknownOwnerState {
                    district: district.clone(),
                    state: state.clone(),
                });
            }
        }

        if let Some(orphan) = listed_districts
            .iter()
            .find(|d| !data.district_states.contains_key(*d))
        {
            return Err(GazetteerError::MissingOwner {
                district: orphan.clone(),
            });
        }

        let mut cleaned_names: BTreeMap<String, String> = BTreeMap::new();
        for name in states.iter().chain(listed_districts.iter()) {
            if let Some(other) = cleaned_names.insert(clean(name), name.clone()) {
                return Err(GazetteerError::Ambiguous {
                    name: name.clone(),
                    other,
                });
            }
        }

        let aliases = build_aliases(&data.aliases, &cleaned_names)?;

        let mut names_longest_first: Vec<String> =
            states.iter().chain(listed_districts.iter()).cloned().collect();
        names_longest_first.sort_by(|a, b| longest_first(a, b));

        let mut alias_targets: Vec<String> = aliases
            .iter()
            .map(|(_, target)| target.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        alias_targets.sort_by(|a, b| longest_first(a, b));

        let gazetteer = Self {
            states,
            districts: data.district_states,
            cleaned_names,
            names_longest_first,
            alias_targets,
            aliases,
        };

        log::debug!(
            "Gazetteer loaded: {} states, {} districts, {} aliases",
            gazetteer.states.len(),
            gazetteer.districts.len(),
            gazetteer.aliases.len()
        );

        Ok(gazetteer)
    }

    /// Classifies a name (any surface form) as a state, district, or
    /// unknown.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Place<'_> {
        let canonical = self.canonicalize(name);
        self.place(&canonical)
    }

    /// Classifies an already-canonical name.
    #[must_use]
    pub fn place(&self, canonical: &str) -> Place<'_> {
        if let Some(state) = self.states.get(canonical) {
            return Place::State(state);
        }
        if let Some((district, state)) = self.districts.get_key_value(canonical) {
            return Place::District { district, state };
        }
        Place::Unknown
    }

    /// Returns the state that owns `district`.
    #[must_use]
    pub fn owner_state(&self, district: &str) -> Option<&str> {
        self.districts.get(district).map(String::as_str)
    }

    /// Maps a surface form to its canonical name.
    ///
    /// Unknown surface forms come back in cleaned form (lowercase, no
    /// punctuation, single spaces).
    #[must_use]
    pub fn canonicalize(&self, surface: &str) -> String {
        let cleaned = clean(surface);
        if let Some(target) = self.aliases.get(&cleaned) {
            return target.to_string();
        }
        if let Some(name) = self.cleaned_names.get(&cleaned) {
            return name.clone();
        }
        cleaned
    }

    /// Normalizes free text against this gazetteer's aliases.
    #[must_use]
    pub fn normalize(&self, text: &str) -> NormalizedText {
        normalize::normalize(text, &self.aliases)
    }

    /// Every canonical name occurring in `text`, on whole-token boundaries.
    ///
    /// Results are ordered longest name first, so callers that want the most
    /// specific match can take the first element.
    #[must_use]
    pub fn find_names<'a>(&'a self, text: &str) -> Vec<NameMatch<'a>> {
        self.names_longest_first
            .iter()
            .filter_map(|name| {
                normalize::find_phrase(text, name).map(|offset| NameMatch { name, offset })
            })
            .collect()
    }

    /// Alias targets, longest first.
    pub fn alias_targets(&self) -> impl Iterator<Item = &str> {
        self.alias_targets.iter().map(String::as_str)
    }

    /// The alias table used for normalization.
    #[must_use]
    pub const fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Canonical state names in sorted order.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(String::as_str)
    }

    /// Canonical district names in sorted order.
    pub fn districts(&self) -> impl Iterator<Item = &str> {
        self.districts.keys().map(String::as_str)
    }
}

/// Orders names by token count, then byte length (both descending), then
/// alphabetically.
fn longest_first(a: &str, b: &str) -> std::cmp::Ordering {
    let tokens = |s: &str| s.split(' ').count();
    tokens(b)
        .cmp(&tokens(a))
        .then_with(|| b.len().cmp(&a.len()))
        .then_with(|| a.cmp(b))
}

/// Names must be lowercase, trimmed, single-spaced, and contain only
/// alphanumerics, spaces, and periods.
fn check_normalized(name: &str) -> Result<(), GazetteerError> {
    let expected = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let valid_chars = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '.');

    if name.is_empty() || expected != name || !valid_chars || clean(name).is_empty() {
        return Err(GazetteerError::NotNormalized {
            name: name.to_string(),
            expected,
        });
    }
    Ok(())
}

/// Builds the alias table, adding a punctuation-free self-alias for every
/// canonical name that contains punctuation.
fn build_aliases(
    rules: &BTreeMap<String, String>,
    cleaned_names: &BTreeMap<String, String>,
) -> Result<AliasTable, GazetteerError> {
    let invalid = |alias: &str, target: &str, reason: &str| GazetteerError::InvalidAlias {
        alias: alias.to_string(),
        target: target.to_string(),
        reason: reason.to_string(),
    };

    let mut table = AliasTable::new();

    for (cleaned, name) in cleaned_names {
        if cleaned != name {
            table.insert(cleaned, name);
        }
    }

    for (alias, target) in rules {
        let key = clean(alias);
        if key.is_empty() {
            return Err(invalid(alias, target, "alias is empty once cleaned"));
        }
        if !cleaned_names.values().any(|name| name == target) {
            return Err(invalid(alias, target, "target is not a gazetteer name"));
        }
        if let Some(name) = cleaned_names.get(&key)
            && name != target
        {
            return Err(invalid(
                alias,
                target,
                &format!("alias is itself the gazetteer name {name:?}"),
            ));
        }
        if let Some(chained) = rules.get(target)
            && chained != target
        {
            return Err(invalid(
                alias,
                target,
                &format!("target is itself an alias of {chained:?}"),
            ));
        }
        if let Some(previous) = table.insert(&key, target)
            && previous != *target
        {
            return Err(invalid(
                alias,
                target,
                &format!("cleans to the same key as an alias of {previous:?}"),
            ));
        }
    }

    for (key, target) in table.iter() {
        let (normalized, converged) = normalize_checked(key, &table);
        if !converged {
            return Err(invalid(key, target, "substitution never reaches a fixed point"));
        }
        let (renormalized, _) = normalize_checked(target, &table);
        if renormalized.as_str() != target || normalized.as_str().is_empty() {
            return Err(invalid(key, target, "target does not normalize to itself"));
        }
    }

    for name in cleaned_names.values() {
        let (normalized, _) = normalize_checked(name, &table);
        if normalized.as_str() != name {
            return Err(invalid(
                name,
                normalized.as_str(),
                "gazetteer name is rewritten by an alias",
            ));
        }
    }

    Ok(table)
}
