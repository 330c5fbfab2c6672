//! Risk predictor: the registry of per-(drug, symptom) models.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{ConfigurationError, FeatureVector, KnowledgeBase};
use crate::ports::{ModelError, ModelSource, RiskModel};
use crate::DrugRiskError;

/// Models keyed by lower-cased drug name and exact symptom name.
#[derive(Default)]
pub struct RiskPredictor {
    models: HashMap<(String, String), Arc<dyn RiskModel>>,
}

impl std::fmt::Debug for RiskPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskPredictor")
            .field("models", &self.models.len())
            .finish()
    }
}

fn model_key(drug: &str, symptom: &str) -> (String, String) {
    (drug.trim().to_lowercase(), symptom.to_string())
}

impl RiskPredictor {
    /// Load one model per (drug, symptom) pair declared by the knowledge base.
    ///
    /// Fails on the first pair whose artifact is missing, unusable, or whose
    /// recorded feature names differ from the encoder schema for the drug.
    ///
    /// # Errors
    /// Returns a `ConfigurationError` describing the first failure.
    pub fn load<S: ModelSource>(
        knowledge: &KnowledgeBase,
        source: &S,
    ) -> Result<Self, ConfigurationError> {
        let mut predictor = Self::default();

        for drug in knowledge.drugs() {
            let schema = FeatureVector::schema(drug);

            for symptom in &drug.symptoms {
                let model = source.load(&drug.name, &symptom.name).map_err(|e| match e {
                    ModelError::Integrity(reason) => ConfigurationError::ModelIntegrity(format!(
                        "{}/{}: {reason}",
                        drug.name, symptom.name
                    )),
                    other => ConfigurationError::Model {
                        drug: drug.name.clone(),
                        symptom: symptom.name.clone(),
                        reason: other.to_string(),
                    },
                })?;

                match model.feature_names() {
                    Some(names) if names != schema.as_slice() => {
                        return Err(ConfigurationError::SchemaMismatch {
                            drug: drug.name.clone(),
                            symptom: symptom.name.clone(),
                            expected: schema,
                            found: names.to_vec(),
                        });
                    }
                    Some(_) => {}
                    None => tracing::warn!(
                        drug = %drug.name,
                        symptom = %symptom.name,
                        "Model does not record feature names; schema not checked"
                    ),
                }

                predictor.register(&drug.name, &symptom.name, model);
            }
        }

        tracing::info!("Loaded {} model(s)", predictor.len());
        Ok(predictor)
    }

    /// Build a predictor from explicit models.
    pub fn from_models<I>(models: I) -> Self
    where
        I: IntoIterator<Item = (String, String, Arc<dyn RiskModel>)>,
    {
        let mut predictor = Self::default();
        for (drug, symptom, model) in models {
            predictor.register(&drug, &symptom, model);
        }
        predictor
    }

    /// Register (or replace) the model for a pair.
    pub fn register(&mut self, drug: &str, symptom: &str, model: Arc<dyn RiskModel>) {
        self.models.insert(model_key(drug, symptom), model);
    }

    #[must_use]
    pub fn contains(&self, drug: &str, symptom: &str) -> bool {
        self.models.contains_key(&model_key(drug, symptom))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Probability of the adverse event for one symptom.
    ///
    /// # Errors
    /// - `ModelNotFound` if no model is registered for the pair
    /// - `Model` if the model fails or returns a value outside [0, 1]
    pub fn predict(
        &self,
        drug: &str,
        symptom: &str,
        features: &FeatureVector,
    ) -> crate::Result<f64> {
        let model = self
            .models
            .get(&model_key(drug, symptom))
            .ok_or_else(|| DrugRiskError::ModelNotFound {
                drug: drug.to_string(),
                symptom: symptom.to_string(),
            })?;

        let model_error = |source: ModelError| DrugRiskError::Model {
            drug: drug.to_string(),
            symptom: symptom.to_string(),
            source,
        };

        let p = model
            .score_probability(features.as_slice())
            .map_err(model_error)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(model_error(ModelError::InvalidOutput(p)));
        }
        Ok(p)
    }
}
