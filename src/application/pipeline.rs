//! Prediction pipeline: Orchestrates per-symptom risk scoring.
//!
//! For every symptom of the patient's main drug, in knowledge base order:
//! - Encode the patient
//! - Score with the symptom's model
//! - Classify against the population thresholds
//! - Attach the recommendation text
//!
//! The per-symptom results are then summarized into the drug's banner. Any
//! failure aborts the whole request; partial results are never returned.

use std::sync::Arc;

use crate::adapters::{knowledge_json, ModelDirectory};
use crate::config::{integrity_error, ServiceConfig};
use crate::domain::{
    aggregate, join_errors, DrugProfile, FeatureVector, KnowledgeBase, PatientRecord,
    PredictionResult, RiskSeverity, SymptomDefinition, SymptomResult,
};
use crate::DrugRiskError;

use super::predictor::RiskPredictor;
use super::validation::validate_patient;

/// Everything a request needs, built once at startup and shared read-only.
#[derive(Debug)]
pub struct RiskContext {
    pub knowledge: KnowledgeBase,
    pub predictor: RiskPredictor,
    pub config: ServiceConfig,
}

impl RiskContext {
    #[must_use]
    pub fn new(knowledge: KnowledgeBase, predictor: RiskPredictor, config: ServiceConfig) -> Self {
        Self {
            knowledge,
            predictor,
            config,
        }
    }

    /// Load the knowledge base and every model named by the configuration.
    ///
    /// # Errors
    /// Returns error if any reference file or model artifact is missing or invalid.
    pub fn load(config: ServiceConfig) -> crate::Result<Self> {
        tracing::info!("Loading risk context...");

        let knowledge = knowledge_json::load(
            &config.knowledge_base_path,
            config.recommendations_path.as_deref(),
            config.strict_recommendations,
        )?;

        let policy = config.integrity_policy()?;
        let models = ModelDirectory::open(&config.model_dir, &policy).map_err(integrity_error)?;
        let predictor = RiskPredictor::load(&knowledge, &models)?;

        tracing::info!(
            "Risk context ready: {} drug(s), {} model(s), parallel={}, banner_scope={:?}",
            knowledge.drugs().count(),
            predictor.len(),
            config.parallel,
            config.banner_scope
        );

        Ok(Self::new(knowledge, predictor, config))
    }
}

/// Service for running risk predictions.
#[derive(Debug, Clone)]
pub struct PredictionService {
    context: Arc<RiskContext>,
}

impl PredictionService {
    /// Create a new prediction service.
    pub fn new(context: Arc<RiskContext>) -> Self {
        Self { context }
    }

    #[must_use]
    pub fn context(&self) -> &RiskContext {
        &self.context
    }

    /// Run the full prediction pipeline for one patient.
    ///
    /// # Errors
    /// - `Validation` if the record is rejected (no model is invoked)
    /// - `ModelNotFound` / `Model` if a symptom cannot be scored
    /// - `MissingRecommendation` if no text exists and no fallback is configured
    /// - `Aggregation` if a banner bucket is empty
    pub fn run(&self, patient: &PatientRecord) -> crate::Result<PredictionResult> {
        let drug = validate_patient(patient, &self.context.knowledge).map_err(|errors| {
            tracing::warn!("Rejected patient record: {}", join_errors(&errors));
            DrugRiskError::Validation(errors)
        })?;

        tracing::info!(
            "Starting risk prediction: drug={}, symptoms={}",
            drug.name,
            drug.symptoms.len()
        );

        let symptoms = match self.score_all(patient, drug) {
            Ok(symptoms) => symptoms,
            Err(e) => {
                tracing::error!("Risk prediction aborted for drug={}: {}", drug.name, e);
                return Err(e);
            }
        };

        let banner = aggregate(
            &drug.name,
            symptoms.iter().map(|s| (s.patient_risk, &s.tier)),
            &drug.average,
            self.context.config.banner_scope,
        )
        .map_err(|e| {
            tracing::error!("Risk prediction aborted: {}", e);
            DrugRiskError::from(e)
        })?;

        let result = PredictionResult { symptoms, banner };
        tracing::info!(
            "Risk prediction complete: drug={}, high={}, medium={}, low={}",
            drug.name,
            result.count(RiskSeverity::High),
            result.count(RiskSeverity::Medium),
            result.count(RiskSeverity::Low)
        );

        Ok(result)
    }

    fn score_all(
        &self,
        patient: &PatientRecord,
        drug: &DrugProfile,
    ) -> crate::Result<Vec<SymptomResult>> {
        #[cfg(feature = "parallel")]
        {
            if self.context.config.parallel {
                use rayon::prelude::*;
                // Indexed collect keeps knowledge base order.
                return drug
                    .symptoms
                    .par_iter()
                    .map(|symptom| self.score_symptom(patient, drug, symptom))
                    .collect();
            }
        }

        drug.symptoms
            .iter()
            .map(|symptom| self.score_symptom(patient, drug, symptom))
            .collect()
    }

    fn score_symptom(
        &self,
        patient: &PatientRecord,
        drug: &DrugProfile,
        symptom: &SymptomDefinition,
    ) -> crate::Result<SymptomResult> {
        let features = FeatureVector::encode_for(patient, drug);
        let patient_risk = self
            .context
            .predictor
            .predict(&drug.name, &symptom.name, &features)?;
        let severity = RiskSeverity::classify(patient_risk, symptom.rate, symptom.three_x_rate);

        tracing::debug!(
            drug = %drug.name,
            symptom = %symptom.name,
            "Scored risk={:.4} rate={} three_x_rate={} severity={}",
            patient_risk,
            symptom.rate,
            symptom.three_x_rate,
            severity
        );

        Ok(SymptomResult {
            name: symptom.name.clone(),
            category: symptom.category.clone(),
            tier: symptom.severity.clone(),
            patient_risk,
            rate: symptom.rate,
            severity,
            three_x_rate: symptom.three_x_rate,
            recommendation: self.recommendation(drug, symptom, severity)?,
        })
    }

    fn recommendation(
        &self,
        drug: &DrugProfile,
        symptom: &SymptomDefinition,
        severity: RiskSeverity,
    ) -> crate::Result<String> {
        if let Some(text) = symptom.recommendations.get(severity) {
            return Ok(text.to_string());
        }
        match &self.context.config.recommendation_fallback {
            Some(fallback) => Ok(fallback.clone()),
            None => Err(DrugRiskError::MissingRecommendation {
                drug: drug.name.clone(),
                symptom: symptom.name.clone(),
                tier: severity.recommendation_tier().to_string(),
            }),
        }
    }
}
