//! JSON knowledge base loader.
//!
//! Two layouts are understood:
//!
//! - **Native**: one document `{ "drugs": [DrugProfile, ...] }` where arrays
//!   carry every ordering the models depend on.
//! - **Legacy**: the reference files of the first generation of the service,
//!   a flat `static_data.json` keyed by `<drug>_symptom`, `<drug>_average` and
//!   `<drug>_other_drug`, plus a separate recommendation document keyed
//!   `drug -> symptom -> tier`. Symptom order is the key order of the
//!   `<drug>_symptom` object.
//!
//! Both fail fast: a drug the files declare but do not fully describe aborts
//! the load.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::{
    ConfigurationError, DrugAggregate, DrugProfile, KnowledgeBase, Recommendations,
    SeverityTier, SymptomDefinition,
};

#[derive(Debug, Deserialize)]
struct NativeDocument {
    drugs: Vec<DrugProfile>,
}

/// Parse a native knowledge base document.
///
/// # Errors
/// Returns a serialization error for malformed JSON, or a configuration error
/// if the content fails validation.
pub fn from_native_json(
    bytes: &[u8],
    strict_recommendations: bool,
) -> crate::Result<KnowledgeBase> {
    let doc: NativeDocument = serde_json::from_slice(bytes)?;
    Ok(KnowledgeBase::new(doc.drugs, strict_recommendations)?)
}

/// Parse the legacy two-document layout.
///
/// # Errors
/// Returns `ConfigurationError::MissingKey` for any absent entry of a declared drug.
pub fn from_legacy_json(
    static_data: &[u8],
    recommendations: &[u8],
    strict_recommendations: bool,
) -> crate::Result<KnowledgeBase> {
    let data: Value = serde_json::from_slice(static_data)?;
    let recs: Value = serde_json::from_slice(recommendations)?;

    let root = as_object(&data, "static_data")?;
    let drug_names = string_list(root, "main_drug")?;
    let preconditions = string_list(root, "precondition")?;
    let valid_co_drugs = string_list(root, "other_drug")?;

    let mut drugs = Vec::with_capacity(drug_names.len());
    for name in drug_names {
        let key = name.trim().to_lowercase();

        let symptoms_key = format!("{key}_symptom");
        let symptoms = as_object(required(root, &symptoms_key)?, &symptoms_key)?;
        let drug_recs = recs.get(&key);

        let mut definitions = Vec::with_capacity(symptoms.len());
        for (symptom, stats) in symptoms {
            let path = format!("{symptoms_key}.{symptom}");
            let stats = as_object(stats, &path)?;
            let recommendations = match drug_recs.and_then(|r| r.get(symptom)) {
                Some(v) => Recommendations::deserialize(v).map_err(|e| {
                    ConfigurationError::Invalid(format!("recommendations for {key}.{symptom}: {e}"))
                })?,
                None => Recommendations::default(),
            };
            definitions.push(SymptomDefinition {
                name: symptom.clone(),
                category: string_field(stats, "category", &path)?,
                severity: SeverityTier::from(string_field(stats, "severity", &path)?),
                rate: number_field(stats, "rate", &path)?,
                three_x_rate: number_field(stats, "three_x_rate", &path)?,
                recommendations,
            });
        }

        let average_key = format!("{key}_average");
        let average = as_object(required(root, &average_key)?, &average_key)?;

        drugs.push(DrugProfile {
            co_drugs: string_list(root, &format!("{key}_other_drug"))?,
            valid_co_drugs: valid_co_drugs.clone(),
            preconditions: preconditions.clone(),
            symptoms: definitions,
            average: DrugAggregate {
                all: number_field(average, "all", &average_key)?,
                severe: number_field(average, "severe", &average_key)?,
                moderate: number_field(average, "moderate", &average_key)?,
            },
            name,
        });
    }

    Ok(KnowledgeBase::new(drugs, strict_recommendations)?)
}

/// Load a knowledge base from disk.
///
/// With `recommendations` set, `path` is read as the legacy `static_data.json`.
///
/// # Errors
/// Returns an IO error if a file cannot be read, or any error of the parsers.
pub fn load(
    path: &Path,
    recommendations: Option<&Path>,
    strict_recommendations: bool,
) -> crate::Result<KnowledgeBase> {
    let data = fs::read(path)?;
    match recommendations {
        Some(rec_path) => {
            tracing::info!("Loading legacy knowledge base from {:?} and {:?}", path, rec_path);
            let recs = fs::read(rec_path)?;
            from_legacy_json(&data, &recs, strict_recommendations)
        }
        None => {
            tracing::info!("Loading knowledge base from {:?}", path);
            from_native_json(&data, strict_recommendations)
        }
    }
}

fn required<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a Value, ConfigurationError> {
    obj.get(key)
        .ok_or_else(|| ConfigurationError::MissingKey(key.to_string()))
}

fn as_object<'a>(v: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ConfigurationError> {
    v.as_object()
        .ok_or_else(|| ConfigurationError::Invalid(format!("{path} must be an object")))
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>, ConfigurationError> {
    required(obj, key)?
        .as_array()
        .ok_or_else(|| ConfigurationError::Invalid(format!("{key} must be an array")))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigurationError::Invalid(format!("{key} must contain strings")))
        })
        .collect()
}

fn string_field(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<String, ConfigurationError> {
    obj.get(key)
        .ok_or_else(|| ConfigurationError::MissingKey(format!("{path}.{key}")))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigurationError::Invalid(format!("{path}.{key} must be a string")))
}

fn number_field(
    obj: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<f64, ConfigurationError> {
    obj.get(key)
        .ok_or_else(|| ConfigurationError::MissingKey(format!("{path}.{key}")))?
        .as_f64()
        .ok_or_else(|| ConfigurationError::Invalid(format!("{path}.{key} must be a number")))
}
