//! # drugrisk
//!
//! Per-symptom adverse-event risk prediction for a prescribed drug.
//!
//! Given a patient profile, the crate scores every symptom associated with the
//! patient's main drug, classifies the patient risk against population
//! baselines, attaches recommendation text and summarizes the drug as a whole
//! in a "banner".
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types (patient record, knowledge base, features, classification, banner)
//! - `ports`: Trait definitions for the predictive models and where they come from
//! - `adapters`: Concrete implementations (JSON knowledge base, JSON logistic models,
//!   verified model directories, log sanitization)
//! - `application`: Boundary validation, the risk predictor and the pipeline orchestrator
//! - `config`: Environment-driven service configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::{PredictionService, RiskContext, RiskPredictor};
pub use config::ServiceConfig;
pub use domain::{
    BannerResult, KnowledgeBase, PatientRecord, PredictionResult, RiskSeverity, SymptomResult,
};

/// Result type for drugrisk operations
pub type Result<T> = std::result::Result<T, DrugRiskError>;

/// Main error type for drugrisk
#[derive(Debug, thiserror::Error)]
pub enum DrugRiskError {
    #[error("Invalid patient record: {}", domain::join_errors(.0))]
    Validation(Vec<domain::ValidationError>),

    #[error("Configuration error: {0}")]
    Configuration(#[from] domain::ConfigurationError),

    #[error("No model registered for drug '{drug}', symptom '{symptom}'")]
    ModelNotFound { drug: String, symptom: String },

    #[error("Model for drug '{drug}', symptom '{symptom}' failed: {source}")]
    Model {
        drug: String,
        symptom: String,
        #[source]
        source: ports::ModelError,
    },

    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] domain::AggregationError),

    #[error("No recommendation for drug '{drug}', symptom '{symptom}', tier '{tier}'")]
    MissingRecommendation {
        drug: String,
        symptom: String,
        tier: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DrugRiskError {
    /// Whether the error was caused by the caller's input rather than by the
    /// service's reference data or models.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
