//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundary between
//! the scoring pipeline and the trained models it consumes.

mod risk_model;

pub use risk_model::{ModelError, ModelSource, RiskModel};
