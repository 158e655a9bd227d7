#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crime classification vocabulary.
//!
//! This crate defines the closed `(category, type)` vocabulary that every
//! published crime record uses. Topic labels from crowd-sourced reports are
//! mapped into this vocabulary, and anything unrecognized falls back to
//! [`CrimeClassification::UNKNOWN`].

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Top-level crime category groupings.
///
/// The serialized spellings are the ones consumed by the downstream
/// visualization (`"property"`, `"assault"`, `"Other"`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum CrimeCategory {
    /// Crimes against property (theft, robbery)
    #[serde(rename = "property")]
    #[strum(serialize = "property")]
    Property,
    /// Crimes against persons (rape, murder)
    #[serde(rename = "assault")]
    #[strum(serialize = "assault")]
    Assault,
    /// Reports whose topic is not in the term table
    #[serde(rename = "Other")]
    #[strum(serialize = "Other")]
    Other,
}

impl CrimeCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Property, Self::Assault, Self::Other]
    }
}

/// Specific crime types within each [`CrimeCategory`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum CrimeType {
    // ── Property ────────────────────────────────────────
    /// Unlawful taking of property without force
    #[serde(rename = "theft")]
    #[strum(serialize = "theft")]
    Theft,
    /// Taking property by force or threat
    #[serde(rename = "robbery")]
    #[strum(serialize = "robbery")]
    Robbery,

    // ── Assault ─────────────────────────────────────────
    /// Forcible sexual offenses
    #[serde(rename = "rape")]
    #[strum(serialize = "rape")]
    Rape,
    /// Killing of a person
    #[serde(rename = "murder")]
    #[strum(serialize = "murder")]
    Murder,

    // ── Other ───────────────────────────────────────────
    /// Topics that don't map to any other type
    #[serde(rename = "Unknown")]
    #[strum(serialize = "Unknown")]
    Unknown,
}

impl CrimeType {
    /// Returns the parent [`CrimeCategory`] for this type.
    #[must_use]
    pub const fn category(self) -> CrimeCategory {
        match self {
            Self::Theft | Self::Robbery => CrimeCategory::Property,
            Self::Rape | Self::Murder => CrimeCategory::Assault,
            Self::Unknown => CrimeCategory::Other,
        }
    }

    /// Returns all types belonging to the given category.
    #[must_use]
    pub fn for_category(category: CrimeCategory) -> Vec<Self> {
        Self::all()
            .iter()
            .copied()
            .filter(|t| t.category() == category)
            .collect()
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Theft,
            Self::Robbery,
            Self::Rape,
            Self::Murder,
            Self::Unknown,
        ]
    }
}

/// A `(category, type)` pair.
///
/// Only constructible from a [`CrimeType`], so the category can never
/// contradict the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrimeClassification {
    /// Top-level grouping.
    pub category: CrimeCategory,
    /// Specific crime type.
    #[serde(rename = "type")]
    pub crime_type: CrimeType,
}

impl CrimeClassification {
    /// The fallback for topics outside the term table: `(Other, Unknown)`.
    pub const UNKNOWN: Self = Self::of(CrimeType::Unknown);

    /// Builds the classification for a crime type.
    #[must_use]
    pub const fn of(crime_type: CrimeType) -> Self {
        Self {
            category: crime_type.category(),
            crime_type,
        }
    }

    /// Whether this is the [`Self::UNKNOWN`] fallback.
    #[must_use]
    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl std::fmt::Display for CrimeClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.category, self.crime_type)
    }
}
