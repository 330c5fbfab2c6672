//! Domain layer: Core types and the pure scoring rules.
//!
//! Nothing in here performs I/O. Classification, feature encoding and banner
//! aggregation are pure functions of their inputs and the immutable knowledge base.

mod banner;
mod features;
mod knowledge;
mod patient;
mod prediction;

pub use banner::{aggregate, AggregationError, BannerScope, Bucket};
pub use features::{FeatureVector, BASE_FEATURES};
pub use knowledge::{
    ConfigurationError, DrugAggregate, DrugProfile, KnowledgeBase, Recommendations,
    SeverityTier, SymptomDefinition,
};
pub use patient::{
    validate_age, validate_height, validate_sex, validate_smoking, validate_weight,
    PatientRecord, ValidationError, MAX_AGE,
};
pub use prediction::{BannerResult, PredictionResult, RiskSeverity, SymptomResult};

#[cfg(test)]
pub(crate) use knowledge::fixtures;
#[cfg(test)]
pub(crate) use patient::sample_patient;

/// Render a list of validation errors on one line.
#[must_use]
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
