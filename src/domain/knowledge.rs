//! Knowledge base: immutable reference data loaded once at startup.
//!
//! Holds, per drug, the valid preconditions and co-drugs, the canonical
//! co-drug feature order, population statistics for every symptom, the drug's
//! aggregate population rates and the recommendation texts.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::prediction::RiskSeverity;

/// Errors raised while building or querying the knowledge base, or while
/// wiring models against it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unknown drug '{0}'")]
    UnknownDrug(String),

    #[error("unknown symptom '{symptom}' for drug '{drug}'")]
    UnknownSymptom { drug: String, symptom: String },

    #[error("drug '{0}' is defined more than once")]
    DuplicateDrug(String),

    #[error("symptom '{symptom}' is defined more than once for drug '{drug}'")]
    DuplicateSymptom { drug: String, symptom: String },

    #[error("drug '{0}' has no symptoms")]
    NoSymptoms(String),

    #[error("knowledge base defines no drugs")]
    Empty,

    #[error("invalid value for {field} of drug '{drug}': {value}")]
    InvalidValue {
        drug: String,
        field: String,
        value: f64,
    },

    #[error("missing recommendation for drug '{drug}', symptom '{symptom}', tier '{tier}'")]
    MissingRecommendation {
        drug: String,
        symptom: String,
        tier: String,
    },

    #[error("missing key '{0}' in reference data")]
    MissingKey(String),

    #[error(
        "model for drug '{drug}', symptom '{symptom}' expects features {found:?}, \
         encoder produces {expected:?}"
    )]
    SchemaMismatch {
        drug: String,
        symptom: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("model for drug '{drug}', symptom '{symptom}' could not be loaded: {reason}")]
    Model {
        drug: String,
        symptom: String,
        reason: String,
    },

    #[error("model integrity check failed: {0}")]
    ModelIntegrity(String),

    #[error("invalid reference data: {0}")]
    Invalid(String),
}

/// Clinical seriousness of a symptom, fixed per symptom in reference data.
///
/// Only the exact labels `Serious` and `Moderate` feed the banner's severe and
/// moderate averages; any other label is carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SeverityTier {
    Serious,
    Moderate,
    Other(String),
}

impl From<String> for SeverityTier {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Serious" => Self::Serious,
            "Moderate" => Self::Moderate,
            _ => Self::Other(label),
        }
    }
}

impl From<SeverityTier> for String {
    fn from(tier: SeverityTier) -> Self {
        match tier {
            SeverityTier::Serious => "Serious".to_string(),
            SeverityTier::Moderate => "Moderate".to_string(),
            SeverityTier::Other(label) => label,
        }
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serious => write!(f, "Serious"),
            Self::Moderate => write!(f, "Moderate"),
            Self::Other(label) => write!(f, "{label}"),
        }
    }
}

/// Recommendation text per patient risk tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    #[serde(rename = "Low Risk", default, skip_serializing_if = "Option::is_none")]
    pub low: Option<String>,
    #[serde(rename = "Medium Risk", default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    #[serde(rename = "High Risk", default, skip_serializing_if = "Option::is_none")]
    pub high: Option<String>,
}

impl Recommendations {
    #[must_use]
    pub fn get(&self, severity: RiskSeverity) -> Option<&str> {
        match severity {
            RiskSeverity::Low => self.low.as_deref(),
            RiskSeverity::Medium => self.medium.as_deref(),
            RiskSeverity::High => self.high.as_deref(),
        }
    }
}

/// Population statistics for one symptom of one drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomDefinition {
    pub name: String,
    pub category: String,
    pub severity: SeverityTier,
    /// Population base rate in [0, 1]
    pub rate: f64,
    /// Upper classification boundary. Stored, never re-derived from `rate`.
    pub three_x_rate: f64,
    #[serde(default)]
    pub recommendations: Recommendations,
}

/// Population risk rates for a drug as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrugAggregate {
    pub all: f64,
    pub severe: f64,
    pub moderate: f64,
}

/// Everything the service knows about one drug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugProfile {
    pub name: String,
    #[serde(default)]
    pub preconditions: Vec<String>,
    /// Co-drugs used as model features, in model training order.
    pub co_drugs: Vec<String>,
    /// Additional co-drug names accepted in requests but not used as features.
    #[serde(default)]
    pub valid_co_drugs: Vec<String>,
    pub symptoms: Vec<SymptomDefinition>,
    pub average: DrugAggregate,
}

impl DrugProfile {
    /// Lower-cased lookup key.
    #[must_use]
    pub fn key(&self) -> String {
        drug_key(&self.name)
    }

    #[must_use]
    pub fn accepts_precondition(&self, name: &str) -> bool {
        self.preconditions.iter().any(|p| p == name)
    }

    #[must_use]
    pub fn accepts_co_drug(&self, name: &str) -> bool {
        self.co_drugs.iter().chain(&self.valid_co_drugs).any(|d| d == name)
    }

    /// # Errors
    /// Returns `ConfigurationError::UnknownSymptom` if the drug has no such symptom.
    pub fn symptom(&self, name: &str) -> Result<&SymptomDefinition, ConfigurationError> {
        self.symptoms
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigurationError::UnknownSymptom {
                drug: self.name.clone(),
                symptom: name.to_string(),
            })
    }

    fn validate(&self, strict_recommendations: bool) -> Result<(), ConfigurationError> {
        if self.symptoms.is_empty() {
            return Err(ConfigurationError::NoSymptoms(self.name.clone()));
        }

        let invalid = |field: String, value: f64| ConfigurationError::InvalidValue {
            drug: self.name.clone(),
            field,
            value,
        };

        for (field, value) in [
            ("average.all", self.average.all),
            ("average.severe", self.average.severe),
            ("average.moderate", self.average.moderate),
        ] {
            if !is_probability(value) {
                return Err(invalid(field.to_string(), value));
            }
        }

        let mut seen = HashSet::new();
        for symptom in &self.symptoms {
            if !seen.insert(symptom.name.as_str()) {
                return Err(ConfigurationError::DuplicateSymptom {
                    drug: self.name.clone(),
                    symptom: symptom.name.clone(),
                });
            }
            if !is_probability(symptom.rate) {
                return Err(invalid(format!("{}.rate", symptom.name), symptom.rate));
            }
            if !(symptom.three_x_rate.is_finite() && symptom.three_x_rate >= 0.0) {
                return Err(invalid(
                    format!("{}.three_x_rate", symptom.name),
                    symptom.three_x_rate,
                ));
            }
            if symptom.three_x_rate < symptom.rate {
                tracing::warn!(
                    drug = %self.name,
                    symptom = %symptom.name,
                    "three_x_rate {} is below rate {}; medium classification is unreachable",
                    symptom.three_x_rate,
                    symptom.rate
                );
            }
            if strict_recommendations {
                for severity in RiskSeverity::ALL {
                    if symptom.recommendations.get(severity).is_none() {
                        return Err(ConfigurationError::MissingRecommendation {
                            drug: self.name.clone(),
                            symptom: symptom.name.clone(),
                            tier: severity.recommendation_tier().to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

fn is_probability(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn drug_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Immutable, validated reference data for every drug the service supports.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    drugs: Vec<DrugProfile>,
    index: HashMap<String, usize>,
}

impl KnowledgeBase {
    /// Build and validate a knowledge base.
    ///
    /// With `strict_recommendations`, every symptom must carry text for all
    /// three risk tiers.
    ///
    /// # Errors
    /// Returns the first `ConfigurationError` found.
    pub fn new(
        drugs: Vec<DrugProfile>,
        strict_recommendations: bool,
    ) -> Result<Self, ConfigurationError> {
        if drugs.is_empty() {
            return Err(ConfigurationError::Empty);
        }

        let mut index = HashMap::with_capacity(drugs.len());
        for (i, drug) in drugs.iter().enumerate() {
            drug.validate(strict_recommendations)?;
            if index.insert(drug.key(), i).is_some() {
                return Err(ConfigurationError::DuplicateDrug(drug.name.clone()));
            }
        }

        tracing::info!(
            "Knowledge base ready: {} drug(s), {} symptom(s)",
            drugs.len(),
            drugs.iter().map(|d| d.symptoms.len()).sum::<usize>()
        );

        Ok(Self { drugs, index })
    }

    /// Look up a drug by name (case-insensitive).
    #[must_use]
    pub fn find_drug(&self, name: &str) -> Option<&DrugProfile> {
        self.index.get(&drug_key(name)).map(|&i| &self.drugs[i])
    }

    /// # Errors
    /// Returns `ConfigurationError::UnknownDrug` if the drug is not served.
    pub fn drug(&self, name: &str) -> Result<&DrugProfile, ConfigurationError> {
        self.find_drug(name)
            .ok_or_else(|| ConfigurationError::UnknownDrug(name.to_string()))
    }

    /// All drugs in definition order.
    pub fn drugs(&self) -> impl Iterator<Item = &DrugProfile> {
        self.drugs.iter()
    }

    /// Recommendation text for a symptom at a patient risk tier.
    ///
    /// # Errors
    /// Returns `ConfigurationError` if the drug or symptom is unknown.
    pub fn recommendation(
        &self,
        drug: &str,
        symptom: &str,
        severity: RiskSeverity,
    ) -> Result<Option<&str>, ConfigurationError> {
        Ok(self
            .drug(drug)?
            .symptom(symptom)?
            .recommendations
            .get(severity))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn symptom(name: &str, severity: &str, rate: f64, three_x_rate: f64) -> SymptomDefinition {
        SymptomDefinition {
            name: name.to_string(),
            category: "General".to_string(),
            severity: SeverityTier::from(severity.to_string()),
            rate,
            three_x_rate,
            recommendations: Recommendations {
                low: Some(format!("{name}: low")),
                medium: Some(format!("{name}: medium")),
                high: Some(format!("{name}: high")),
            },
        }
    }

    pub fn drug(name: &str, symptoms: Vec<SymptomDefinition>) -> DrugProfile {
        DrugProfile {
            name: name.to_string(),
            preconditions: vec!["Obesity".into(), "Diabetes".into()],
            co_drugs: vec!["ALLOPURINOL".into(), "ASPIRIN".into(), "ACETAMINOPHEN".into()],
            valid_co_drugs: vec!["IBUPROFEN".into()],
            symptoms,
            average: DrugAggregate {
                all: 0.2,
                severe: 0.1,
                moderate: 0.3,
            },
        }
    }

    /// Drug "X" with one Serious and one Moderate symptom.
    pub fn knowledge_base() -> KnowledgeBase {
        KnowledgeBase::new(
            vec![drug(
                "X",
                vec![
                    symptom("S1", "Serious", 0.1, 0.3),
                    symptom("S2", "Moderate", 0.2, 0.6),
                ],
            )],
            true,
        )
        .expect("Valid fixture")
    }
}
