//! Logistic model adapter: Implementation of RiskModel from a JSON artifact.
//!
//! The artifact is exported by the training pipeline as plain JSON:
//!
//! ```json
//! {
//!   "feature_names": ["age", "sex", "ALLOPURINOL"],
//!   "coefficients": [0.02, -0.4, 0.9],
//!   "intercept": -1.3,
//!   "scaler_mean": [61.0, 0.5, 0.1],
//!   "scaler_scale": [12.0, 0.5, 0.3],
//!   "risk_class": 0,
//!   "calibration": { "x": [0.0, 0.5, 1.0], "y": [0.0, 0.4, 1.0] }
//! }
//! ```
//!
//! Scoring standardizes the inputs when a scaler is present, applies the
//! linear model and the logistic function to get P(class 1), picks the class
//! named by `risk_class`, then maps the result through the optional isotonic
//! calibration table.

use serde::{Deserialize, Serialize};

use crate::ports::{ModelError, RiskModel};

/// Which output class of the binary classifier means "risk present".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RiskClass {
    /// Class 0, the convention of the models this service was built around
    #[default]
    First,
    /// Class 1
    Second,
}

impl TryFrom<u8> for RiskClass {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::First),
            1 => Ok(Self::Second),
            other => Err(format!("risk_class must be 0 or 1, got {other}")),
        }
    }
}

impl From<RiskClass> for u8 {
    fn from(c: RiskClass) -> Self {
        match c {
            RiskClass::First => 0,
            RiskClass::Second => 1,
        }
    }
}

/// Monotone piecewise-linear probability calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Strictly increasing breakpoints in [0, 1]
    pub x: Vec<f64>,
    /// Non-decreasing calibrated values in [0, 1]
    pub y: Vec<f64>,
}

impl Calibration {
    fn validate(&self) -> Result<(), ModelError> {
        if self.x.len() < 2 || self.x.len() != self.y.len() {
            return Err(ModelError::Artifact(
                "calibration needs at least two points and equal x/y lengths".into(),
            ));
        }
        if self.x.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(ModelError::Artifact(
                "calibration x must be strictly increasing".into(),
            ));
        }
        if self.y.windows(2).any(|w| w[0] > w[1]) {
            return Err(ModelError::Artifact(
                "calibration y must be non-decreasing".into(),
            ));
        }
        if self
            .x
            .iter()
            .chain(&self.y)
            .any(|v| !(0.0..=1.0).contains(v))
        {
            return Err(ModelError::Artifact(
                "calibration points must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Interpolate, clamping outside the breakpoint range.
    #[must_use]
    pub fn apply(&self, p: f64) -> f64 {
        let last = self.x.len() - 1;
        if p <= self.x[0] {
            return self.y[0];
        }
        if p >= self.x[last] {
            return self.y[last];
        }
        // First breakpoint strictly greater than p; p > x[0] so i >= 1.
        let i = self.x.partition_point(|&x| x <= p);
        let (x0, x1) = (self.x[i - 1], self.x[i]);
        let (y0, y1) = (self.y[i - 1], self.y[i]);
        y0 + (y1 - y0) * (p - x0) / (x1 - x0)
    }
}

/// Logistic regression exported as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler_mean: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler_scale: Option<Vec<f64>>,
    #[serde(default)]
    pub risk_class: RiskClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<Calibration>,
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticModel {
    /// Parse and validate an artifact.
    ///
    /// # Errors
    /// Returns `ModelError::Artifact` if the JSON is malformed or inconsistent.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        let model: Self =
            serde_json::from_slice(bytes).map_err(|e| ModelError::Artifact(e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Check parameter shapes and values.
    ///
    /// # Errors
    /// Returns `ModelError::Artifact` describing the first problem.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.feature_names.len();
        if n == 0 {
            return Err(ModelError::Artifact("model has no features".into()));
        }
        if self.coefficients.len() != n {
            return Err(ModelError::Artifact(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                n
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ModelError::Artifact("non-finite model parameter".into()));
        }

        match (&self.scaler_mean, &self.scaler_scale) {
            (None, None) => {}
            (Some(mean), Some(scale)) => {
                if mean.len() != n || scale.len() != n {
                    return Err(ModelError::Artifact(
                        "scaler lengths do not match feature_names length".into(),
                    ));
                }
                if mean.iter().any(|m| !m.is_finite())
                    || scale.iter().any(|s| !s.is_finite() || *s == 0.0)
                {
                    return Err(ModelError::Artifact(
                        "scaler values must be finite with non-zero scale".into(),
                    ));
                }
            }
            _ => {
                return Err(ModelError::Artifact(
                    "scaler_mean and scaler_scale must be given together".into(),
                ))
            }
        }

        if let Some(calibration) = &self.calibration {
            calibration.validate()?;
        }
        Ok(())
    }

    fn linear(&self, features: &[f64]) -> f64 {
        let standardized = |i: usize, x: f64| match (&self.scaler_mean, &self.scaler_scale) {
            (Some(mean), Some(scale)) => (x - mean[i]) / scale[i],
            _ => x,
        };

        self.coefficients
            .iter()
            .zip(features)
            .enumerate()
            .fold(self.intercept, |acc, (i, (w, &x))| acc + w * standardized(i, x))
    }
}

impl RiskModel for LogisticModel {
    fn score_probability(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.feature_names.len() {
            return Err(ModelError::FeatureCount {
                expected: self.feature_names.len(),
                got: features.len(),
            });
        }

        let positive = sigmoid(self.linear(features));
        let raw = match self.risk_class {
            RiskClass::First => 1.0 - positive,
            RiskClass::Second => positive,
        };
        let p = match &self.calibration {
            Some(c) => c.apply(raw),
            None => raw,
        };

        if !(0.0..=1.0).contains(&p) {
            return Err(ModelError::InvalidOutput(p));
        }
        Ok(p)
    }

    fn feature_names(&self) -> Option<&[String]> {
        Some(&self.feature_names)
    }
}
