//! Risk model port: Traits for the per-symptom predictive models.
//!
//! Models are opaque. The core only needs one operation from them, plus a way
//! to obtain one per (drug, symptom) pair at startup.

use std::sync::Arc;

/// Errors raised by a model while scoring, or by a source while loading one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("feature count mismatch: got {got}, expected {expected}")]
    FeatureCount { expected: usize, got: usize },

    #[error("model produced an invalid probability: {0}")]
    InvalidOutput(f64),

    #[error("model artifact not found: {0}")]
    NotFound(String),

    #[error("invalid model artifact: {0}")]
    Artifact(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),
}

/// A trained per-symptom model.
pub trait RiskModel: Send + Sync {
    /// Probability in [0, 1] that the adverse event occurs for the encoded patient.
    ///
    /// Which class of the underlying classifier counts as "risk present" is a
    /// property of the artifact; implementations return that class's mass.
    ///
    /// # Errors
    /// Returns `ModelError::FeatureCount` for a vector of the wrong length.
    fn score_probability(&self, features: &[f64]) -> Result<f64, ModelError>;

    /// Ordered input column names, when the artifact records them.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}

impl<M: RiskModel + ?Sized> RiskModel for Arc<M> {
    fn score_probability(&self, features: &[f64]) -> Result<f64, ModelError> {
        (**self).score_probability(features)
    }

    fn feature_names(&self) -> Option<&[String]> {
        (**self).feature_names()
    }
}

/// Where model artifacts come from.
pub trait ModelSource {
    /// Load the model for one symptom of one drug.
    ///
    /// # Errors
    /// Returns `ModelError::NotFound` if no artifact exists for the pair, or
    /// another `ModelError` if the artifact cannot be used.
    fn load(&self, drug: &str, symptom: &str) -> Result<Arc<dyn RiskModel>, ModelError>;
}
