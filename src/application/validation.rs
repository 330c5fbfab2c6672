//! Boundary validation of patient records against the knowledge base.

use crate::domain::{DrugProfile, KnowledgeBase, PatientRecord, ValidationError};

/// Validate a patient record and resolve its main drug.
///
/// Field checks always run; precondition and co-drug checks run only when the
/// main drug is known, since their valid sets belong to the drug.
///
/// # Errors
/// Returns every problem found, not just the first.
pub fn validate_patient<'k>(
    patient: &PatientRecord,
    knowledge: &'k KnowledgeBase,
) -> Result<&'k DrugProfile, Vec<ValidationError>> {
    let mut errors = patient.validate_fields().err().unwrap_or_default();

    // The main drug must be named exactly as in the knowledge base.
    let exact = knowledge
        .find_drug(&patient.main_drug)
        .filter(|drug| drug.name == patient.main_drug);
    let Some(drug) = exact else {
        errors.push(ValidationError::UnknownDrug(patient.main_drug.clone()));
        return Err(errors);
    };

    errors.extend(
        patient
            .preconditions
            .iter()
            .filter(|name| !drug.accepts_precondition(name))
            .map(|name| ValidationError::UnknownPrecondition {
                drug: drug.name.clone(),
                name: name.clone(),
            }),
    );
    errors.extend(
        patient
            .other_drugs
            .iter()
            .filter(|name| !drug.accepts_co_drug(name))
            .map(|name| ValidationError::UnknownCoDrug {
                drug: drug.name.clone(),
                name: name.clone(),
            }),
    );

    if errors.is_empty() {
        Ok(drug)
    } else {
        Err(errors)
    }
}
