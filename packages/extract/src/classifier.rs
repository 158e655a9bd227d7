//! Topic label classification.
//!
//! Maps a short topic label (Malay or English) to the closed
//! [`CrimeClassification`] vocabulary. The term table also covers the
//! English words the upstream sheet substitutes for Malay topics, so a raw
//! `"curi"` and an already-substituted `"theft"` classify the same way.

use safezone_crime_models::{CrimeClassification, CrimeType};

/// Synonymous terms grouped by the crime type they denote.
const TERMS: &[(CrimeType, &[&str])] = &[
    (
        CrimeType::Theft,
        &[
            "theft",
            "steal",
            "stealing",
            "curi",
            "mencuri",
            "dicuri",
            "pencuri",
            "pencurian",
            "kecurian",
        ],
    ),
    (
        CrimeType::Robbery,
        &[
            "robbery",
            "rob",
            "rompak",
            "merompak",
            "dirompak",
            "rompakan",
            "perompak",
        ],
    ),
    (
        CrimeType::Rape,
        &["rape", "rogol", "merogol", "dirogol", "perogol"],
    ),
    (
        CrimeType::Murder,
        &[
            "murder",
            "bunuh",
            "membunuh",
            "dibunuh",
            "terbunuh",
            "pembunuhan",
        ],
    ),
];

/// Classifies a topic label.
///
/// The label is trimmed, lowercased, and whitespace-collapsed before lookup.
/// Anything outside the term table is [`CrimeClassification::UNKNOWN`].
#[must_use]
pub fn classify(topic: &str) -> CrimeClassification {
    let label = topic
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    TERMS
        .iter()
        .find(|(_, terms)| terms.contains(&label.as_str()))
        .map_or(CrimeClassification::UNKNOWN, |(crime_type, _)| {
            CrimeClassification::of(*crime_type)
        })
}

/// Every term the classifier recognizes, paired with its type.
pub fn terms() -> impl Iterator<Item = (&'static str, CrimeType)> {
    TERMS
        .iter()
        .flat_map(|(crime_type, terms)| terms.iter().map(move |term| (*term, *crime_type)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use safezone_crime_models::CrimeCategory;

    use super::*;

    #[test]
    fn malay_topics() {
        assert_eq!(classify("rompak"), CrimeClassification::of(CrimeType::Robbery));
        assert_eq!(classify("curi"), CrimeClassification::of(CrimeType::Theft));
        assert_eq!(classify("rogol"), CrimeClassification::of(CrimeType::Rape));
        assert_eq!(classify("bunuh"), CrimeClassification::of(CrimeType::Murder));
    }

    #[test]
    fn english_topics_match_their_malay_equivalents() {
        assert_eq!(classify("theft"), classify("curi"));
        assert_eq!(classify("robbery"), classify("rompak"));
        assert_eq!(classify("rape"), classify("rogol"));
        assert_eq!(classify("murder"), classify("bunuh"));
    }

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(classify("  Rompak \n"), CrimeClassification::of(CrimeType::Robbery));
        assert_eq!(classify("THEFT"), CrimeClassification::of(CrimeType::Theft));
    }

    #[test]
    fn unknown_topics_fall_back() {
        let unknown = classify("xyz");
        assert_eq!(unknown.category, CrimeCategory::Other);
        assert_eq!(unknown.crime_type, CrimeType::Unknown);
        assert_eq!(classify(""), CrimeClassification::UNKNOWN);
        assert_eq!(classify("rompak curi"), CrimeClassification::UNKNOWN);
    }

    #[test]
    fn categories_follow_types() {
        assert_eq!(classify("curi").category, CrimeCategory::Property);
        assert_eq!(classify("rompak").category, CrimeCategory::Property);
        assert_eq!(classify("rogol").category, CrimeCategory::Assault);
        assert_eq!(classify("bunuh").category, CrimeCategory::Assault);
    }

    #[test]
    fn terms_are_unique() {
        let mut seen = BTreeSet::new();
        for (term, _) in terms() {
            assert!(seen.insert(term), "duplicate term {term}");
        }
    }
}
