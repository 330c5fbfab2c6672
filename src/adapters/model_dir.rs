//! Model directory adapter: Implementation of ModelSource over the filesystem.
//!
//! Layout: one JSON logistic artifact per (drug, symptom) pair at
//! `<root>/<drug lower-case>/over_<symptom, spaces as underscores>.json`.
//!
//! # Integrity
//!
//! - `<root>/manifest.json` binds every artifact by SHA-256.
//! - `<root>/manifest.sig` is an Ed25519 signature over the exact manifest bytes.
//! - With a verifying key configured, both files are mandatory and the
//!   signature must verify.
//! - Without a manifest, artifacts load only when unverified loading is
//!   explicitly allowed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::logistic::LogisticModel;
use crate::ports::{ModelError, ModelSource, RiskModel};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "manifest.sig";

const MANIFEST_VERSION: u32 = 1;

/// Hashes of every artifact in a model directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: u32,
    /// Unix timestamp (seconds) at signing time
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Relative path (forward slashes) to lower-case SHA-256 hex
    pub files: BTreeMap<String, String>,
}

impl ModelManifest {
    /// Hash every `.json` artifact below `root`, skipping the manifest itself.
    ///
    /// # Errors
    /// Returns `ModelError::Artifact` if the directory cannot be read or has no artifacts.
    pub fn build(root: &Path, created_at: Option<i64>) -> Result<Self, ModelError> {
        let mut files = BTreeMap::new();
        collect_artifacts(root, root, &mut files)?;
        if files.is_empty() {
            return Err(ModelError::Artifact(format!(
                "no model artifacts found in {root:?}"
            )));
        }
        Ok(Self {
            version: MANIFEST_VERSION,
            created_at,
            files,
        })
    }

    fn parse(bytes: &[u8]) -> Result<Self, ModelError> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| ModelError::Integrity(format!("invalid {MANIFEST_FILE}: {e}")))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ModelError::Integrity(format!(
                "unsupported manifest version: {}",
                manifest.version
            )));
        }
        if manifest.files.is_empty() {
            return Err(ModelError::Integrity(format!(
                "{MANIFEST_FILE} lists no files"
            )));
        }
        Ok(manifest)
    }

    fn check(&self, rel: &str, bytes: &[u8]) -> Result<(), ModelError> {
        let expected = self
            .files
            .get(rel)
            .ok_or_else(|| {
                ModelError::Integrity(format!("{rel} is not listed in {MANIFEST_FILE}"))
            })?;
        if !constant_time_eq_str(&sha256_hex(bytes), &expected.to_ascii_lowercase()) {
            return Err(ModelError::Integrity(format!("hash mismatch for {rel}")));
        }
        Ok(())
    }
}

fn collect_artifacts(
    root: &Path,
    dir: &Path,
    files: &mut BTreeMap<String, String>,
) -> Result<(), ModelError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ModelError::Artifact(format!("failed to read {dir:?}: {e}")))?;
    for entry in entries {
        let path = entry
            .map_err(|e| ModelError::Artifact(format!("failed to read {dir:?}: {e}")))?
            .path();
        if path.is_dir() {
            collect_artifacts(root, &path, files)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if rel == MANIFEST_FILE {
            continue;
        }
        let bytes = fs::read(&path)
            .map_err(|e| ModelError::Artifact(format!("failed to read {path:?}: {e}")))?;
        files.insert(rel, sha256_hex(&bytes));
    }
    Ok(())
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

// Constant-time compare for ASCII strings (used for SHA-256 hex digests).
fn constant_time_eq_str(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Decode a base64 Ed25519 verifying key.
///
/// # Errors
/// Returns `ModelError::Integrity` if the key is malformed.
pub fn verifying_key_from_b64(b64: &str) -> Result<VerifyingKey, ModelError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|_| ModelError::Integrity("invalid public key base64".into()))?;
    let pubkey: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| {
            ModelError::Integrity("invalid public key length (expected 32 bytes)".into())
        })?;
    VerifyingKey::from_bytes(&pubkey)
        .map_err(|_| ModelError::Integrity("invalid verifying key".into()))
}

/// How strictly a model directory is verified.
#[derive(Debug, Clone, Default)]
pub struct IntegrityPolicy {
    /// Manifest signature must verify against this key
    pub verifying_key: Option<VerifyingKey>,
    /// Permit a directory without a manifest
    pub allow_unverified: bool,
}

/// Model artifacts on disk.
#[derive(Debug)]
pub struct ModelDirectory {
    root: PathBuf,
    manifest: Option<ModelManifest>,
}

impl ModelDirectory {
    /// Open a model directory and verify its manifest according to `policy`.
    ///
    /// # Errors
    /// Returns `ModelError::Integrity` if verification fails or is required but impossible.
    pub fn open(root: impl Into<PathBuf>, policy: &IntegrityPolicy) -> Result<Self, ModelError> {
        let root = root.into();
        let manifest_path = root.join(MANIFEST_FILE);
        let sig_path = root.join(SIGNATURE_FILE);

        if !manifest_path.exists() {
            if policy.verifying_key.is_some() {
                return Err(ModelError::Integrity(format!(
                    "{MANIFEST_FILE} required in {root:?} when a signing key is configured"
                )));
            }
            if !policy.allow_unverified {
                return Err(ModelError::Integrity(format!(
                    "no {MANIFEST_FILE} in {root:?}; \
                     set DRUGRISK_ALLOW_UNVERIFIED_MODELS=true to load unverified models"
                )));
            }
            tracing::warn!("Loading UNVERIFIED models from {:?}", root);
            return Ok(Self {
                root,
                manifest: None,
            });
        }

        let manifest_bytes = fs::read(&manifest_path)
            .map_err(|e| ModelError::Integrity(format!("failed to read {MANIFEST_FILE}: {e}")))?;

        match &policy.verifying_key {
            Some(key) => {
                let sig_bytes = fs::read(&sig_path).map_err(|e| {
                    ModelError::Integrity(format!("failed to read {SIGNATURE_FILE}: {e}"))
                })?;
                let sig: [u8; 64] = sig_bytes.as_slice().try_into().map_err(|_| {
                    ModelError::Integrity("invalid signature length (expected 64 bytes)".into())
                })?;
                key.verify(&manifest_bytes, &Signature::from_bytes(&sig))
                    .map_err(|_| ModelError::Integrity("invalid manifest signature".into()))?;
                tracing::info!("Model manifest signature verified");
            }
            None if sig_path.exists() => {
                tracing::warn!(
                    "{} present but no verifying key configured; checking hashes only",
                    SIGNATURE_FILE
                );
            }
            None => {}
        }

        let manifest = ModelManifest::parse(&manifest_bytes)?;
        tracing::info!(
            "Model manifest lists {} artifact(s) (created_at={:?})",
            manifest.files.len(),
            manifest.created_at
        );

        Ok(Self {
            root,
            manifest: Some(manifest),
        })
    }

    /// Relative artifact path for a (drug, symptom) pair.
    #[must_use]
    pub fn artifact_path(drug: &str, symptom: &str) -> String {
        format!(
            "{}/over_{}.json",
            drug.trim().to_lowercase(),
            symptom.replace(' ', "_")
        )
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModelSource for ModelDirectory {
    fn load(&self, drug: &str, symptom: &str) -> Result<Arc<dyn RiskModel>, ModelError> {
        let rel = Self::artifact_path(drug, symptom);
        let path = rel.split('/').fold(self.root.clone(), |p, part| p.join(part));
        if !path.exists() {
            return Err(ModelError::NotFound(rel));
        }

        let bytes = fs::read(&path)
            .map_err(|e| ModelError::Artifact(format!("failed to read {path:?}: {e}")))?;
        if let Some(manifest) = &self.manifest {
            manifest.check(&rel, &bytes)?;
        }

        let model = LogisticModel::from_json(&bytes)?;
        tracing::debug!(
            "Loaded model {} ({} features, risk_class={})",
            rel,
            model.feature_names.len(),
            u8::from(model.risk_class)
        );
        Ok(Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use tempfile::tempdir;

    const ARTIFACT: &str =
        r#"{"feature_names":["age","sex"],"coefficients":[0.01,0.2],"intercept":-0.5}"#;

    fn write_artifact(root: &Path, drug: &str, symptom: &str, body: &str) {
        let dir = root.join(drug);
        fs::create_dir_all(&dir).expect("create drug dir");
        fs::write(dir.join(format!("over_{}.json", symptom.replace(' ', "_"))), body)
            .expect("write artifact");
    }

    fn sign(root: &Path, key: &SigningKey) {
        let manifest = ModelManifest::build(root, Some(1_700_000_000)).expect("build manifest");
        let bytes = serde_json::to_vec_pretty(&manifest).expect("serialize manifest");
        fs::write(root.join(MANIFEST_FILE), &bytes).expect("write manifest");
        let sig: Signature = key.sign(&bytes);
        fs::write(root.join(SIGNATURE_FILE), sig.to_bytes()).expect("write signature");
    }

    fn signed_policy(key: &SigningKey) -> IntegrityPolicy {
        IntegrityPolicy {
            verifying_key: Some(key.verifying_key()),
            allow_unverified: false,
        }
    }

    #[test]
    fn test_artifact_path_layout() {
        assert_eq!(
            ModelDirectory::artifact_path("Avastin", "Blood clot"),
            "avastin/over_Blood_clot.json"
        );
    }

    #[test]
    fn test_refuses_unverified_directory_by_default() {
        let temp = tempdir().expect("tempdir");
        write_artifact(temp.path(), "x", "S1", ARTIFACT);

        let err = ModelDirectory::open(temp.path(), &IntegrityPolicy::default()).unwrap_err();
        assert!(matches!(err, ModelError::Integrity(_)));

        let policy = IntegrityPolicy {
            allow_unverified: true,
            ..Default::default()
        };
        let dir = ModelDirectory::open(temp.path(), &policy).expect("Should open");
        let model = dir.load("X", "S1").expect("Should load");
        let p = model.score_probability(&[50.0, 1.0]).expect("score");
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_signed_directory_roundtrip() {
        let temp = tempdir().expect("tempdir");
        write_artifact(temp.path(), "x", "Blood clot", ARTIFACT);
        let key = SigningKey::from_bytes(&[7u8; 32]);
        sign(temp.path(), &key);

        let dir = ModelDirectory::open(temp.path(), &signed_policy(&key)).expect("Should verify");
        assert!(dir.load("x", "Blood clot").is_ok());
        assert!(matches!(dir.load("x", "Other"), Err(ModelError::NotFound(_))));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let temp = tempdir().expect("tempdir");
        write_artifact(temp.path(), "x", "S1", ARTIFACT);
        sign(temp.path(), &SigningKey::from_bytes(&[7u8; 32]));

        let other = SigningKey::from_bytes(&[8u8; 32]);
        let err = ModelDirectory::open(temp.path(), &signed_policy(&other)).unwrap_err();
        assert_eq!(err, ModelError::Integrity("invalid manifest signature".into()));
    }

    #[test]
    fn test_tampered_artifact_is_rejected() {
        let temp = tempdir().expect("tempdir");
        write_artifact(temp.path(), "x", "S1", ARTIFACT);
        let key = SigningKey::from_bytes(&[7u8; 32]);
        sign(temp.path(), &key);

        write_artifact(
            temp.path(),
            "x",
            "S1",
            r#"{"feature_names":["age","sex"],"coefficients":[9.0,9.0],"intercept":9.0}"#,
        );

        let dir = ModelDirectory::open(temp.path(), &signed_policy(&key)).expect("Manifest intact");
        assert!(matches!(dir.load("x", "S1"), Err(ModelError::Integrity(_))));
    }

    #[test]
    fn test_unlisted_artifact_is_rejected() {
        let temp = tempdir().expect("tempdir");
        write_artifact(temp.path(), "x", "S1", ARTIFACT);
        let key = SigningKey::from_bytes(&[7u8; 32]);
        sign(temp.path(), &key);
        write_artifact(temp.path(), "x", "S2", ARTIFACT);

        let dir = ModelDirectory::open(temp.path(), &signed_policy(&key)).expect("Manifest intact");
        assert!(matches!(dir.load("x", "S2"), Err(ModelError::Integrity(_))));
    }

    #[test]
    fn test_verifying_key_from_b64() {
        let key = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        let b64 = base64::engine::general_purpose::STANDARD.encode(key.as_bytes());
        assert_eq!(verifying_key_from_b64(&b64).expect("Should decode"), key);
        assert!(verifying_key_from_b64("not base64!").is_err());
        assert!(verifying_key_from_b64("AAAA").is_err());
    }
}
