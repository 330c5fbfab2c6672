//! End-to-end tests: reference data and model artifacts on disk, driven
//! through the public API.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use drugrisk::adapters::model_dir::{ModelManifest, MANIFEST_FILE, SIGNATURE_FILE};
use drugrisk::domain::ConfigurationError;
use drugrisk::{
    DrugRiskError, PatientRecord, PredictionService, RiskContext, RiskSeverity, ServiceConfig,
};
use ed25519_dalek::{Signature, Signer, SigningKey};
use serde_json::{json, Value};
use tempfile::TempDir;

const CO_DRUGS: [&str; 2] = ["ALLOPURINOL", "ACETAMINOPHEN"];

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn recommendations(symptom: &str) -> Value {
    json!({
        "Low Risk": format!("{symptom}: keep monitoring"),
        "Medium Risk": format!("{symptom}: discuss with your oncologist"),
        "High Risk": format!("{symptom}: seek care promptly"),
    })
}

fn knowledge_base() -> Value {
    json!({
        "drugs": [{
            "name": "Avastin",
            "preconditions": ["Obesity", "Hypertension"],
            "co_drugs": CO_DRUGS,
            "valid_co_drugs": ["ASPIRIN"],
            "symptoms": [
                {
                    "name": "Blood clot", "category": "Vascular", "severity": "Serious",
                    "rate": 0.1, "three_x_rate": 0.3,
                    "recommendations": recommendations("Blood clot")
                },
                {
                    "name": "Nausea", "category": "Gastrointestinal", "severity": "Moderate",
                    "rate": 0.2, "three_x_rate": 0.6,
                    "recommendations": recommendations("Nausea")
                }
            ],
            "average": {"all": 0.15, "severe": 0.1, "moderate": 0.2}
        }]
    })
}

/// Model returning `base` for everyone, plus `allopurinol_weight` on the logit
/// scale when the patient takes ALLOPURINOL.
fn model(base: f64, allopurinol_weight: f64) -> Value {
    json!({
        "feature_names": ["age", "sex", "ALLOPURINOL", "ACETAMINOPHEN"],
        "coefficients": [0.0, 0.0, allopurinol_weight, 0.0],
        "intercept": logit(base),
        "risk_class": 1
    })
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        fixture.write_json(&fixture.kb_path(), &knowledge_base());
        fixture.write_model("Blood clot", &model(0.05, 0.0));
        fixture.write_model("Nausea", &model(0.25, 0.0));
        fixture
    }

    fn kb_path(&self) -> PathBuf {
        self.dir.path().join("knowledge_base.json")
    }

    fn model_dir(&self) -> PathBuf {
        self.dir.path().join("models")
    }

    fn model_path(&self, symptom: &str) -> PathBuf {
        self.model_dir()
            .join("avastin")
            .join(format!("over_{}.json", symptom.replace(' ', "_")))
    }

    fn write_json(&self, path: &Path, value: &Value) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dir");
        }
        fs::write(path, serde_json::to_vec_pretty(value).expect("serialize")).expect("write");
    }

    fn write_model(&self, symptom: &str, value: &Value) {
        self.write_json(&self.model_path(symptom), value);
    }

    /// Sign the model directory; returns the base64 verifying key.
    fn sign(&self) -> String {
        let key = SigningKey::from_bytes(&[42u8; 32]);
        let manifest = ModelManifest::build(&self.model_dir(), None).expect("build manifest");
        let bytes = serde_json::to_vec_pretty(&manifest).expect("serialize manifest");
        fs::write(self.model_dir().join(MANIFEST_FILE), &bytes).expect("write manifest");
        let sig: Signature = key.sign(&bytes);
        fs::write(self.model_dir().join(SIGNATURE_FILE), sig.to_bytes()).expect("write sig");
        base64::engine::general_purpose::STANDARD.encode(key.verifying_key().as_bytes())
    }

    fn config(&self) -> ServiceConfig {
        ServiceConfig::default()
            .with_knowledge_base(self.kb_path())
            .with_model_dir(self.model_dir())
    }

    fn service(&self, config: ServiceConfig) -> PredictionService {
        Self::service_from(config)
    }

    fn service_from(config: ServiceConfig) -> PredictionService {
        let context = RiskContext::load(config).expect("Context should load");
        PredictionService::new(std::sync::Arc::new(context))
    }
}

fn patient(main_drug: &str, other_drugs: &[&str]) -> PatientRecord {
    serde_json::from_value(json!({
        "age": 62,
        "sex": 1,
        "height": 165.0,
        "weight": 70.5,
        "smoking": 2,
        "precondition": ["Hypertension"],
        "main_drug": main_drug,
        "other_drug": other_drugs,
    }))
    .expect("valid patient json")
}

#[test]
fn test_signed_models_end_to_end() {
    let fixture = Fixture::new();
    let pubkey = fixture.sign();
    let service = fixture.service(fixture.config().with_signing_pubkey_b64(pubkey));

    let result = service
        .run(&patient("Avastin", &["ACETAMINOPHEN"]))
        .expect("Should predict");

    assert_eq!(result.symptoms.len(), 2);
    assert_eq!(result.symptoms[0].name, "Blood clot");
    assert_eq!(result.symptoms[0].severity, RiskSeverity::Low);
    assert_eq!(result.symptoms[0].recommendation, "Blood clot: keep monitoring");
    assert_eq!(result.symptoms[1].name, "Nausea");
    assert_eq!(result.symptoms[1].severity, RiskSeverity::Medium);

    assert!(close(result.banner.average_patient_risk_severe, 0.05));
    assert!(close(result.banner.average_patient_risk_moderate, 0.25));
    assert!(close(result.banner.average_patient_risk_all, 0.15));
    assert!(close(result.banner.population_risk_severe, 0.1));
}

#[test]
fn test_result_uses_wire_names() {
    let fixture = Fixture::new();
    let service = fixture.service(fixture.config().with_allow_unverified_models(true));
    let result = service.run(&patient("Avastin", &[])).expect("Should predict");

    let value = serde_json::to_value(&result).expect("serialize");
    let first = &value["symptom_data"][0];
    assert_eq!(first["symptom_name"], "Blood clot");
    assert_eq!(first["symptom_category"], "Vascular");
    assert!(first.get("symptom_severity").is_none());
    assert_eq!(first["patient_risk_severity"], "low");
    assert_eq!(first["population_risk_rate"], 0.1);
    assert_eq!(first["population_risk_rate_x_three"], 0.3);
    assert!(first["patient_risk"].is_number());
    assert!(first["recommendation"].is_string());

    let banner = &value["banner_data"];
    for key in [
        "average_patient_risk_all",
        "average_patient_risk_severe",
        "average_patient_risk_moderate",
        "population_risk_all",
        "population_risk_severe",
        "population_risk_moderate",
    ] {
        assert!(banner[key].is_number(), "missing {key}");
    }
}

#[test]
fn test_co_drug_feature_reaches_model() {
    let fixture = Fixture::new();
    fixture.write_model("Blood clot", &model(0.05, 5.0));
    let service = fixture.service(fixture.config().with_allow_unverified_models(true));

    let without = service.run(&patient("Avastin", &[])).expect("Should predict");
    let with = service
        .run(&patient("Avastin", &["ALLOPURINOL"]))
        .expect("Should predict");

    assert_eq!(without.symptoms[0].severity, RiskSeverity::Low);
    assert_eq!(with.symptoms[0].severity, RiskSeverity::High);
    assert!(with.symptoms[0].patient_risk > without.symptoms[0].patient_risk);
    // Other symptoms are unaffected.
    assert_eq!(without.symptoms[1], with.symptoms[1]);
}

#[test]
fn test_validation_errors_are_reported_together() {
    let fixture = Fixture::new();
    let service = fixture.service(fixture.config().with_allow_unverified_models(true));

    let mut bad = patient("Avastin", &["WARFARIN"]);
    bad.age = 150;
    bad.preconditions = vec!["Asthma".into()];

    match service.run(&bad) {
        Err(DrugRiskError::Validation(errors)) => assert_eq!(errors.len(), 3),
        other => panic!("expected validation error, got {other:?}"),
    }

    let err = service.run(&patient("Herceptin", &[])).unwrap_err();
    assert!(err.is_client_error());
}

#[test]
fn test_unverified_models_refused_by_default() {
    let fixture = Fixture::new();
    let err = RiskContext::load(fixture.config()).unwrap_err();
    assert!(matches!(
        err,
        DrugRiskError::Configuration(ConfigurationError::ModelIntegrity(_))
    ));
    let message = err.to_string();
    assert!(message.contains("DRUGRISK_ALLOW_UNVERIFIED_MODELS"), "{message}");
    assert_eq!(message.matches("integrity check failed").count(), 1, "{message}");
}

#[test]
fn test_unreadable_pubkey_file_refuses_hash_only_manifest() {
    let fixture = Fixture::new();
    let manifest = ModelManifest::build(&fixture.model_dir(), None).expect("build manifest");
    let bytes = serde_json::to_vec_pretty(&manifest).expect("serialize manifest");
    fs::write(fixture.model_dir().join(MANIFEST_FILE), bytes).expect("write manifest");

    // The hash-only manifest loads when no key is configured.
    assert!(RiskContext::load(fixture.config()).is_ok());

    let missing = fixture.dir.path().join("missing_pubkey.b64");
    let err = RiskContext::load(fixture.config().with_signing_pubkey_file(&missing)).unwrap_err();
    assert!(matches!(
        err,
        DrugRiskError::Configuration(ConfigurationError::ModelIntegrity(_))
    ));
    assert!(err.to_string().contains("missing_pubkey.b64"), "{err}");

    let empty = fixture.dir.path().join("empty_pubkey.b64");
    fs::write(&empty, "\n").expect("write empty key");
    assert!(matches!(
        RiskContext::load(fixture.config().with_signing_pubkey_file(&empty)),
        Err(DrugRiskError::Configuration(ConfigurationError::ModelIntegrity(_)))
    ));
}

#[test]
fn test_tampered_model_fails_startup() {
    let fixture = Fixture::new();
    let pubkey = fixture.sign();
    fixture.write_model("Nausea", &model(0.99, 0.0));

    assert!(matches!(
        RiskContext::load(fixture.config().with_signing_pubkey_b64(pubkey)),
        Err(DrugRiskError::Configuration(ConfigurationError::ModelIntegrity(_)))
    ));
}

#[test]
fn test_missing_model_fails_startup() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.model_path("Nausea")).expect("remove model");

    assert!(matches!(
        RiskContext::load(fixture.config().with_allow_unverified_models(true)),
        Err(DrugRiskError::Configuration(ConfigurationError::Model { ref symptom, .. }))
            if symptom == "Nausea"
    ));
}

#[test]
fn test_reordered_features_fail_startup() {
    let fixture = Fixture::new();
    let mut reordered = model(0.25, 0.0);
    reordered["feature_names"] = json!(["age", "sex", "ACETAMINOPHEN", "ALLOPURINOL"]);
    fixture.write_model("Nausea", &reordered);

    assert!(matches!(
        RiskContext::load(fixture.config().with_allow_unverified_models(true)),
        Err(DrugRiskError::Configuration(ConfigurationError::SchemaMismatch { .. }))
    ));
}

#[test]
fn test_parallel_and_sequential_agree() {
    let fixture = Fixture::new();
    fixture.write_model("Blood clot", &model(0.2, 1.5));
    let record = patient("Avastin", &["ALLOPURINOL", "ASPIRIN"]);

    let parallel = fixture
        .service(fixture.config().with_allow_unverified_models(true).with_parallel(true))
        .run(&record)
        .expect("parallel");
    let sequential = fixture
        .service(fixture.config().with_allow_unverified_models(true).with_parallel(false))
        .run(&record)
        .expect("sequential");

    assert_eq!(parallel, sequential);
}

#[test]
fn test_legacy_reference_files() {
    let fixture = Fixture::new();
    let static_data = json!({
        "main_drug": ["Avastin"],
        "precondition": ["Obesity", "Hypertension"],
        "other_drug": ["ALLOPURINOL", "ACETAMINOPHEN", "ASPIRIN"],
        "avastin_symptom": {
            "Blood clot": {"category": "Vascular", "severity": "Serious", "rate": 0.1, "three_x_rate": 0.3},
            "Nausea": {"category": "Gastrointestinal", "severity": "Moderate", "rate": 0.2, "three_x_rate": 0.6}
        },
        "avastin_average": {"all": 0.15, "severe": 0.1, "moderate": 0.2},
        "avastin_other_drug": CO_DRUGS,
    });
    let recs = json!({
        "avastin": {
            "Blood clot": recommendations("Blood clot"),
            "Nausea": recommendations("Nausea"),
        }
    });
    let data_path = fixture.dir.path().join("static_data.json");
    let recs_path = fixture.dir.path().join("static_data_recommendation.json");
    fixture.write_json(&data_path, &static_data);
    fixture.write_json(&recs_path, &recs);

    let legacy = fixture.service(
        fixture
            .config()
            .with_knowledge_base(&data_path)
            .with_recommendations(&recs_path)
            .with_allow_unverified_models(true),
    );
    let native = fixture.service(fixture.config().with_allow_unverified_models(true));

    let record = patient("Avastin", &["ALLOPURINOL"]);
    assert_eq!(
        legacy.run(&record).expect("legacy"),
        native.run(&record).expect("native")
    );
}

#[test]
fn test_bundled_demo_data() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
    let config = ServiceConfig::default()
        .with_knowledge_base(root.join("knowledge_base.json"))
        .with_model_dir(root.join("models"));
    let service = Fixture::service_from(config);

    let record: PatientRecord = serde_json::from_slice(
        &fs::read(root.join("patient.json")).expect("read demo patient"),
    )
    .expect("valid demo patient");
    let result = service.run(&record).expect("Should predict");

    assert_eq!(result.symptoms.len(), 5);
    assert_eq!(result.symptoms[0].severity, RiskSeverity::Low);
    assert_eq!(result.symptoms[3].severity, RiskSeverity::Medium);
}
