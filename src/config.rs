//! Service configuration.
//!
//! Defaults suit a local checkout; deployments override them with `DRUGRISK_*`
//! environment variables. Parsing is best-effort: an unparsable value keeps
//! the default and logs a warning.

use std::path::PathBuf;

use crate::adapters::model_dir::{verifying_key_from_b64, IntegrityPolicy};
use crate::domain::{BannerScope, ConfigurationError};
use crate::ports::ModelError;

const DEFAULT_KNOWLEDGE_BASE: &str = "data/knowledge_base.json";
const DEFAULT_MODEL_DIR: &str = "data/models";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Native knowledge base, or legacy `static_data.json` when `recommendations_path` is set
    pub knowledge_base_path: PathBuf,

    /// Legacy recommendation document
    pub recommendations_path: Option<PathBuf>,

    pub model_dir: PathBuf,

    /// Score symptoms of one request on the rayon pool (needs the `parallel` feature)
    pub parallel: bool,

    pub banner_scope: BannerScope,

    /// Text used when a symptom has no recommendation for the computed tier
    pub recommendation_fallback: Option<String>,

    /// Require recommendation text for every tier of every symptom at load time
    pub strict_recommendations: bool,

    /// Base64 Ed25519 key the model manifest must be signed with
    pub model_signing_pubkey_b64: Option<String>,

    /// File holding the base64 key; read when the policy is built
    pub model_signing_pubkey_file: Option<PathBuf>,

    /// Permit a model directory without a manifest
    pub allow_unverified_models: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: PathBuf::from(DEFAULT_KNOWLEDGE_BASE),
            recommendations_path: None,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            parallel: true,
            banner_scope: BannerScope::default(),
            recommendation_fallback: None,
            strict_recommendations: true,
            model_signing_pubkey_b64: None,
            model_signing_pubkey_file: None,
            allow_unverified_models: false,
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        other => {
            tracing::warn!("Ignoring {name}={other:?}: expected a boolean");
            None
        }
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Fold a model directory error into startup configuration, keeping a single
/// "integrity check failed" prefix.
pub(crate) fn integrity_error(e: ModelError) -> ConfigurationError {
    match e {
        ModelError::Integrity(reason) => ConfigurationError::ModelIntegrity(reason),
        other => ConfigurationError::ModelIntegrity(other.to_string()),
    }
}

impl ServiceConfig {
    /// Load overrides from the process environment.
    ///
    /// Supported:
    /// - DRUGRISK_KNOWLEDGE_BASE
    /// - DRUGRISK_RECOMMENDATIONS
    /// - DRUGRISK_MODEL_DIR
    /// - DRUGRISK_PARALLEL
    /// - DRUGRISK_BANNER_SCOPE="classified|all_symptoms"
    /// - DRUGRISK_RECOMMENDATION_FALLBACK
    /// - DRUGRISK_STRICT_RECOMMENDATIONS
    /// - DRUGRISK_MODEL_SIGNING_PUBKEY_B64 / DRUGRISK_MODEL_SIGNING_PUBKEY_B64_FILE
    /// - DRUGRISK_ALLOW_UNVERIFIED_MODELS
    #[must_use]
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env_or_default`] with an arbitrary variable source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("DRUGRISK_KNOWLEDGE_BASE").and_then(non_empty) {
            cfg.knowledge_base_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DRUGRISK_RECOMMENDATIONS").and_then(non_empty) {
            cfg.recommendations_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DRUGRISK_MODEL_DIR").and_then(non_empty) {
            cfg.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DRUGRISK_PARALLEL") {
            cfg.parallel = parse_bool("DRUGRISK_PARALLEL", &v).unwrap_or(cfg.parallel);
        }
        if let Some(v) = lookup("DRUGRISK_BANNER_SCOPE") {
            match v.parse() {
                Ok(scope) => cfg.banner_scope = scope,
                Err(e) => tracing::warn!("Ignoring DRUGRISK_BANNER_SCOPE: {e}"),
            }
        }
        if let Some(v) = lookup("DRUGRISK_RECOMMENDATION_FALLBACK").and_then(non_empty) {
            cfg.recommendation_fallback = Some(v);
        }
        if let Some(v) = lookup("DRUGRISK_STRICT_RECOMMENDATIONS") {
            cfg.strict_recommendations = parse_bool("DRUGRISK_STRICT_RECOMMENDATIONS", &v)
                .unwrap_or(cfg.strict_recommendations);
        }
        if let Some(v) = lookup("DRUGRISK_ALLOW_UNVERIFIED_MODELS") {
            cfg.allow_unverified_models = parse_bool("DRUGRISK_ALLOW_UNVERIFIED_MODELS", &v)
                .unwrap_or(cfg.allow_unverified_models);
        }

        let pubkey_file = lookup("DRUGRISK_MODEL_SIGNING_PUBKEY_B64_FILE").and_then(non_empty);
        if let Some(v) = lookup("DRUGRISK_MODEL_SIGNING_PUBKEY_B64").and_then(non_empty) {
            cfg.model_signing_pubkey_b64 = Some(v);
        } else if let Some(path) = pubkey_file {
            cfg.model_signing_pubkey_file = Some(PathBuf::from(path));
        }

        cfg
    }

    /// Model directory verification derived from the signing settings.
    ///
    /// A configured key file that cannot be read, or holds no key, is an
    /// error; it never falls back to unsigned loading.
    ///
    /// # Errors
    /// Returns `ConfigurationError::ModelIntegrity` if the configured key is
    /// unreadable, empty or malformed.
    pub fn integrity_policy(&self) -> Result<IntegrityPolicy, ConfigurationError> {
        let b64 = match (&self.model_signing_pubkey_b64, &self.model_signing_pubkey_file) {
            (Some(b64), _) => Some(b64.clone()),
            (None, Some(path)) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    ConfigurationError::ModelIntegrity(format!(
                        "failed reading pubkey file {path:?}: {e}"
                    ))
                })?;
                let key = non_empty(content).ok_or_else(|| {
                    ConfigurationError::ModelIntegrity(format!("pubkey file {path:?} is empty"))
                })?;
                Some(key)
            }
            (None, None) => None,
        };

        let verifying_key = b64
            .as_deref()
            .map(verifying_key_from_b64)
            .transpose()
            .map_err(integrity_error)?;
        Ok(IntegrityPolicy {
            verifying_key,
            allow_unverified: self.allow_unverified_models,
        })
    }

    #[must_use]
    pub fn with_knowledge_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_base_path = path.into();
        self
    }

    #[must_use]
    pub fn with_recommendations(mut self, path: impl Into<PathBuf>) -> Self {
        self.recommendations_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_model_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_dir = path.into();
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub fn with_banner_scope(mut self, scope: BannerScope) -> Self {
        self.banner_scope = scope;
        self
    }

    #[must_use]
    pub fn with_recommendation_fallback(mut self, text: impl Into<String>) -> Self {
        self.recommendation_fallback = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_strict_recommendations(mut self, strict: bool) -> Self {
        self.strict_recommendations = strict;
        self
    }

    #[must_use]
    pub fn with_signing_pubkey_b64(mut self, b64: impl Into<String>) -> Self {
        self.model_signing_pubkey_b64 = Some(b64.into());
        self
    }

    #[must_use]
    pub fn with_signing_pubkey_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_signing_pubkey_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_allow_unverified_models(mut self, allow: bool) -> Self {
        self.allow_unverified_models = allow;
        self
    }
}
