//! Application layer: Use cases and services.
//!
//! This module composes domain rules with the model ports to implement the
//! prediction use case.

mod pipeline;
mod predictor;
mod validation;

pub use pipeline::{PredictionService, RiskContext};
pub use predictor::RiskPredictor;
pub use validation::validate_patient;
