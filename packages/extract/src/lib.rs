#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Turns a free-text report into a location and a crime classification.
//!
//! [`resolver::LocationResolver`] runs the location strategy chain,
//! [`classifier::classify`] maps topic labels onto the closed crime
//! vocabulary, and [`filter::IncidentFilter`] optionally drops reports that
//! are not crime incidents. [`Extractor`] bundles the three for the ingest
//! controller.

pub mod classifier;
pub mod filter;
pub mod ner;
pub mod resolver;

use std::sync::Arc;

use safezone_crime_models::CrimeClassification;
use safezone_gazetteer::Gazetteer;
use safezone_report_models::{RawReport, ResolvedLocation};

use crate::filter::{FilterConfig, IncidentFilter};
use crate::resolver::{LocationResolver, ResolverConfig};

/// Errors raised inside extraction strategies.
///
/// These never reach the caller of [`Extractor::extract`]; the resolver
/// logs them and moves on to the next strategy.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The entity recognizer failed.
    #[error("entity recognizer {backend} failed: {message}")]
    Recognizer {
        /// Backend name.
        backend: String,
        /// Description of the failure.
        message: String,
    },
}

/// Location and classification for one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Resolved location.
    pub location: ResolvedLocation,
    /// Topic classification.
    pub classification: CrimeClassification,
}

/// Resolver, classifier, and incident filter behind one handle.
///
/// Cheap to clone; clones share the gazetteer and recognizer.
#[derive(Debug, Clone)]
pub struct Extractor {
    resolver: LocationResolver,
    filter: IncidentFilter,
}

impl Extractor {
    /// Builds an extractor over `gazetteer`.
    #[must_use]
    pub fn new(gazetteer: Arc<Gazetteer>, resolver: ResolverConfig, filter: FilterConfig) -> Self {
        Self {
            resolver: LocationResolver::new(gazetteer, resolver),
            filter: IncidentFilter::new(filter),
        }
    }

    /// Builds an extractor from an existing resolver.
    #[must_use]
    pub const fn from_parts(resolver: LocationResolver, filter: IncidentFilter) -> Self {
        Self { resolver, filter }
    }

    /// The location resolver.
    #[must_use]
    pub const fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    /// Whether `report` passes the incident filter.
    #[must_use]
    pub fn is_incident(&self, report: &RawReport) -> bool {
        self.filter
            .is_incident(&report.text, self.resolver.recognizer())
    }

    /// Resolves the location from the text and classifies the topic.
    ///
    /// The two fields are independent; neither can fail.
    #[must_use]
    pub fn extract(&self, report: &RawReport) -> Extraction {
        Extraction {
            location: self.resolver.resolve(&report.text),
            classification: classifier::classify(&report.topic),
        }
    }
}
