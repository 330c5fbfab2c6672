//! Feature encoding for the per-symptom models.
//!
//! A drug's models all share one input layout: age, sex, then one 0/1
//! indicator per co-drug in the drug's canonical co-drug order. The layout is
//! an implicit contract with model training, so the column names are exposed
//! and checked against every model artifact at load time.

use super::knowledge::{ConfigurationError, DrugProfile, KnowledgeBase};
use super::patient::PatientRecord;

/// Leading columns that precede the co-drug indicators.
pub const BASE_FEATURES: [&str; 2] = ["age", "sex"];

/// Model input for one patient and one drug.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Encode a patient for the given drug.
    ///
    /// # Errors
    /// Returns `ConfigurationError::UnknownDrug` if the drug is not in the knowledge base.
    pub fn encode(
        patient: &PatientRecord,
        knowledge: &KnowledgeBase,
        drug: &str,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self::encode_for(patient, knowledge.drug(drug)?))
    }

    /// Encode a patient against an already resolved drug profile.
    #[must_use]
    pub fn encode_for(patient: &PatientRecord, drug: &DrugProfile) -> Self {
        let mut values = Vec::with_capacity(BASE_FEATURES.len() + drug.co_drugs.len());
        values.push(f64::from(patient.age));
        values.push(f64::from(patient.sex));
        values.extend(
            drug.co_drugs
                .iter()
                .map(|co_drug| if patient.takes(co_drug) { 1.0 } else { 0.0 }),
        );
        Self(values)
    }

    /// Column names of the vectors produced for a drug, in order.
    #[must_use]
    pub fn schema(drug: &DrugProfile) -> Vec<String> {
        BASE_FEATURES
            .iter()
            .map(|s| (*s).to_string())
            .chain(drug.co_drugs.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}
