//! Prediction result types.
//!
//! Represents the output of one risk prediction request: one row per symptom
//! of the main drug plus the drug-level banner.

use serde::{Deserialize, Serialize};

use super::knowledge::SeverityTier;

/// Patient risk classification for one symptom, relative to the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    /// Below the population base rate
    Low,
    /// At or above the base rate, below the 3x threshold
    Medium,
    /// At or above the 3x threshold
    High,
}

impl RiskSeverity {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Classify a patient risk against a symptom's population thresholds.
    ///
    /// Comparisons are strict, so a risk equal to a threshold lands in the
    /// higher tier. When `three_x_rate < rate` nothing is ever `Medium`.
    #[must_use]
    pub fn classify(patient_risk: f64, rate: f64, three_x_rate: f64) -> Self {
        if patient_risk < rate {
            Self::Low
        } else if patient_risk < three_x_rate {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Label used in results.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Key of the recommendation text for this tier.
    #[must_use]
    pub fn recommendation_tier(&self) -> &'static str {
        match self {
            Self::Low => "Low Risk",
            Self::Medium => "Medium Risk",
            Self::High => "High Risk",
        }
    }
}

impl std::fmt::Display for RiskSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Scored and classified risk for one symptom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomResult {
    #[serde(rename = "symptom_name")]
    pub name: String,

    #[serde(rename = "symptom_category")]
    pub category: String,

    /// Clinical seriousness from reference data; feeds the banner, not the wire
    #[serde(skip)]
    pub tier: SeverityTier,

    /// Model probability for this patient (0.0 to 1.0)
    pub patient_risk: f64,

    #[serde(rename = "population_risk_rate")]
    pub rate: f64,

    #[serde(rename = "patient_risk_severity")]
    pub severity: RiskSeverity,

    #[serde(rename = "population_risk_rate_x_three")]
    pub three_x_rate: f64,

    pub recommendation: String,
}

/// Drug-level summary shown alongside the per-symptom rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BannerResult {
    pub average_patient_risk_all: f64,
    pub average_patient_risk_severe: f64,
    pub average_patient_risk_moderate: f64,
    pub population_risk_all: f64,
    pub population_risk_severe: f64,
    pub population_risk_moderate: f64,
}

/// Complete output of one prediction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Rows in knowledge base symptom order
    #[serde(rename = "symptom_data")]
    pub symptoms: Vec<SymptomResult>,

    #[serde(rename = "banner_data")]
    pub banner: BannerResult,
}

impl PredictionResult {
    /// Number of symptoms classified at the given tier.
    #[must_use]
    pub fn count(&self, severity: RiskSeverity) -> usize {
        self.symptoms.iter().filter(|s| s.severity == severity).count()
    }
}
