//! Adapters layer: Concrete implementations of ports and data loaders.
//!
//! - `knowledge_json`: knowledge base loading (native and legacy layouts)
//! - `logistic`: JSON logistic regression artifacts
//! - `model_dir`: verified model directories on disk
//! - `sanitize`: patient-data filtering for logs

pub mod knowledge_json;
pub mod logistic;
pub mod model_dir;
pub mod sanitize;

pub use logistic::LogisticModel;
pub use model_dir::{IntegrityPolicy, ModelDirectory};
