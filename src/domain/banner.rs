//! Banner aggregation: drug-level averages of patient risk by severity tier.

use serde::{Deserialize, Serialize};

use super::knowledge::{DrugAggregate, SeverityTier};
use super::prediction::BannerResult;

/// Which symptoms feed the banner's "all" average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerScope {
    /// Only symptoms whose tier is `Serious` or `Moderate`
    #[default]
    Classified,
    /// Every scored symptom, whatever its tier
    AllSymptoms,
}

impl std::str::FromStr for BannerScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classified" => Ok(Self::Classified),
            "all" | "all_symptoms" => Ok(Self::AllSymptoms),
            other => Err(format!("unknown banner scope '{other}'")),
        }
    }
}

/// A banner average that has nothing to average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    All,
    Severe,
    Moderate,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Severe => write!(f, "severe"),
            Self::Moderate => write!(f, "moderate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("drug '{drug}' has no scored symptoms in the {bucket} bucket")]
pub struct AggregationError {
    pub drug: String,
    pub bucket: Bucket,
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn get(&self, drug: &str, bucket: Bucket) -> Result<f64, AggregationError> {
        if self.count == 0 {
            return Err(AggregationError {
                drug: drug.to_string(),
                bucket,
            });
        }
        Ok(self.sum / self.count as f64)
    }
}

/// Average patient risk per bucket and pair it with the drug's population rates.
///
/// # Errors
/// Returns `AggregationError` if any bucket is empty.
pub fn aggregate<'a, I>(
    drug: &str,
    risks: I,
    population: &DrugAggregate,
    scope: BannerScope,
) -> Result<BannerResult, AggregationError>
where
    I: IntoIterator<Item = (f64, &'a SeverityTier)>,
{
    let mut all = Mean::default();
    let mut severe = Mean::default();
    let mut moderate = Mean::default();

    for (risk, tier) in risks {
        match tier {
            SeverityTier::Serious => {
                severe.add(risk);
                all.add(risk);
            }
            SeverityTier::Moderate => {
                moderate.add(risk);
                all.add(risk);
            }
            SeverityTier::Other(_) => {
                if scope == BannerScope::AllSymptoms {
                    all.add(risk);
                }
            }
        }
    }

    Ok(BannerResult {
        average_patient_risk_all: all.get(drug, Bucket::All)?,
        average_patient_risk_severe: severe.get(drug, Bucket::Severe)?,
        average_patient_risk_moderate: moderate.get(drug, Bucket::Moderate)?,
        population_risk_all: population.all,
        population_risk_severe: population.severe,
        population_risk_moderate: population.moderate,
    })
}
