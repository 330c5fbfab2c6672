//! Patient record submitted for adverse-event risk prediction.

use serde::{Deserialize, Serialize};

/// Exclusive upper bound for a plausible age in years.
pub const MAX_AGE: u32 = 150;

/// Patient profile as received from the caller.
///
/// Field names on the wire follow the service's public request format
/// (`precondition`, `other_drug`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Age in years, `0 < age < 150`
    pub age: u32,

    /// Sex: 0 = male, 1 = female
    pub sex: u8,

    /// Height in cm
    pub height: f64,

    /// Weight in kg
    pub weight: f64,

    /// Smoking: 0 = never, 1 = smoker, 2 = former smoker
    pub smoking: u8,

    /// Precondition names, checked against the main drug's valid set
    #[serde(rename = "precondition")]
    pub preconditions: Vec<String>,

    /// Name of the prescribed drug the risk is assessed for
    pub main_drug: String,

    /// Co-administered drug names, checked against the main drug's valid set
    #[serde(rename = "other_drug")]
    pub other_drugs: Vec<String>,
}

/// A single problem found in a patient record.
///
/// Out-of-range values render as `field=value` so the log sanitizer can
/// redact them if an error message ends up in a log line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}={value} out of range {expected}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("unknown main drug '{0}'")]
    UnknownDrug(String),

    #[error("unknown precondition '{name}' for drug '{drug}'")]
    UnknownPrecondition { drug: String, name: String },

    #[error("unknown co-administered drug '{name}' for drug '{drug}'")]
    UnknownCoDrug { drug: String, name: String },
}

fn out_of_range(
    field: &'static str,
    value: impl ToString,
    expected: &'static str,
) -> ValidationError {
    ValidationError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}

/// Age must be in `(0, 150)`.
pub fn validate_age(age: u32) -> Result<(), ValidationError> {
    if age == 0 || age >= MAX_AGE {
        return Err(out_of_range("age", age, "(0, 150)"));
    }
    Ok(())
}

/// Sex is a binary code.
pub fn validate_sex(sex: u8) -> Result<(), ValidationError> {
    if sex > 1 {
        return Err(out_of_range("sex", sex, "{0, 1}"));
    }
    Ok(())
}

/// Height must be a positive finite number of centimetres.
pub fn validate_height(height: f64) -> Result<(), ValidationError> {
    if !(height.is_finite() && height > 0.0) {
        return Err(out_of_range("height", height, "(0, inf)"));
    }
    Ok(())
}

/// Weight must be a positive finite number of kilograms.
pub fn validate_weight(weight: f64) -> Result<(), ValidationError> {
    if !(weight.is_finite() && weight > 0.0) {
        return Err(out_of_range("weight", weight, "(0, inf)"));
    }
    Ok(())
}

/// Smoking status is a tri-state code.
pub fn validate_smoking(smoking: u8) -> Result<(), ValidationError> {
    if smoking > 2 {
        return Err(out_of_range("smoking", smoking, "{0, 1, 2}"));
    }
    Ok(())
}

impl PatientRecord {
    /// Validate the scalar fields that do not depend on reference data.
    ///
    /// # Errors
    /// Returns every field-level problem found.
    pub fn validate_fields(&self) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = [
            validate_age(self.age),
            validate_sex(self.sex),
            validate_height(self.height),
            validate_weight(self.weight),
            validate_smoking(self.smoking),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether the given co-drug is part of this patient's prescription.
    #[must_use]
    pub fn takes(&self, co_drug: &str) -> bool {
        self.other_drugs.iter().any(|d| d == co_drug)
    }
}

#[cfg(test)]
pub(crate) fn sample_patient(main_drug: &str) -> PatientRecord {
    PatientRecord {
        age: 50,
        sex: 0,
        height: 180.0,
        weight: 80.0,
        smoking: 0,
        preconditions: vec!["Obesity".into()],
        main_drug: main_drug.into(),
        other_drugs: vec!["ALLOPURINOL".into(), "ACETAMINOPHEN".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_record_passes() {
        assert!(sample_patient("Avastin").validate_fields().is_ok());
    }

    #[test]
    fn test_age_bounds() {
        assert!(validate_age(0).is_err());
        assert!(validate_age(1).is_ok());
        assert!(validate_age(149).is_ok());
        assert!(validate_age(150).is_err());
    }

    #[test]
    fn test_non_finite_measurements_rejected() {
        assert!(validate_height(f64::NAN).is_err());
        assert!(validate_weight(f64::INFINITY).is_err());
        assert!(validate_height(-1.0).is_err());
        assert!(validate_weight(0.0).is_err());
    }

    #[test]
    fn test_collects_all_field_errors() {
        let record = PatientRecord {
            age: 200,
            sex: 3,
            smoking: 7,
            ..sample_patient("Avastin")
        };
        let errors = record.validate_fields().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(
            errors[0].to_string(),
            "age=200 out of range (0, 150)"
        );
    }

    #[test]
    fn test_deserializes_public_wire_format() {
        let json = r#"{
            "age": 50, "sex": 0, "height": 180, "weight": 80, "smoking": 0,
            "precondition": ["Obesity"], "main_drug": "Avastin",
            "other_drug": ["ALLOPURINOL", "ACETAMINOPHEN"]
        }"#;
        let record: PatientRecord = serde_json::from_str(json).expect("Should parse");
        assert_eq!(record, sample_patient("Avastin"));
        assert!(record.takes("ALLOPURINOL"));
        assert!(!record.takes("allopurinol"));
    }
}
