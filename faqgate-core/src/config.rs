//! Configuration system for faqgate.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment ->
//! explicit overrides. Configuration is loaded from `~/.config/faqgate/config.toml`
//! and/or `.faqgate/config.toml` in the workspace directory.
//!
//! Secrets never appear here in plaintext; every credential is a `SecretRef`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::pipeline::AnswerOptions;
use crate::secret_ref::SecretRef;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaqgateConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Default per-call answer options.
    #[serde(default)]
    pub answer: AnswerOptions,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    /// Named vector store deployments.
    #[serde(default)]
    pub stores: BTreeMap<String, StoreConfig>,
    /// Curated FAQ collections, keyed by topic partition id.
    #[serde(default)]
    pub partitions: BTreeMap<String, CollectionConfig>,
    /// Document collections, keyed by corpus id.
    #[serde(default)]
    pub corpora: BTreeMap<String, CollectionConfig>,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "cohere" (default) or "openai".
    pub provider: String,
    /// Model id passed on every embed call.
    pub model: String,
    pub api_key: SecretRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "cohere".to_string(),
            model: "multilingual-22-12".to_string(),
            api_key: SecretRef::env("COHERE_API_KEY"),
            base_url: None,
            timeout_secs: 30,
        }
    }
}

/// Generation provider configuration. The model id itself is an answer option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider name: "anthropic" (default), "openai", or any OpenAI-compatible endpoint.
    pub provider: String,
    pub api_key: SecretRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Token encoding override. Derived from the generation model when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            api_key: SecretRef::env("ANTHROPIC_API_KEY"),
            base_url: None,
            temperature: 0.1,
            top_p: None,
            system_prompt: Some(
                "You are a helpful assistant that gives a comprehensive answer from the given information."
                    .to_string(),
            ),
            encoding: None,
            timeout_secs: 120,
        }
    }
}

/// Query preprocessing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// "passthrough" (default) or "compound".
    pub segmenter: String,
    /// Inline multi-syllable compounds, e.g. "công đoàn".
    #[serde(default)]
    pub lexicon: Vec<String>,
    /// Optional lexicon file, one compound per line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexicon_path: Option<PathBuf>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            segmenter: "passthrough".to_string(),
            lexicon: Vec::new(),
            lexicon_path: None,
        }
    }
}

/// A vector store deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    /// Empty when the deployment needs no key.
    #[serde(default)]
    pub api_key: SecretRef,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_store_timeout() -> u64 {
    15
}

/// A collection inside a named store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub store: String,
    pub collection: String,
    /// Dotted payload path of the text field. Role default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_path: Option<String>,
    /// Dotted payload path of the source id. The point id when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl FaqgateConfig {
    /// Validate the configuration and return human-readable warnings.
    ///
    /// Hard failures (unknown stores, bad secrets) are reported when the pipeline is
    /// built; this only flags values that are suspicious.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let collections = self
            .partitions
            .iter()
            .map(|(id, c)| ("partition", id, c))
            .chain(self.corpora.iter().map(|(id, c)| ("corpus", id, c)));
        for (role, id, collection) in collections {
            if !self.stores.contains_key(&collection.store) {
                warnings.push(format!(
                    "{role} '{id}' references unknown store '{}'",
                    collection.store
                ));
            }
        }

        let secrets = [
            ("embedding.api_key".to_string(), &self.embedding.api_key),
            ("generation.api_key".to_string(), &self.generation.api_key),
        ];
        let store_secrets = self
            .stores
            .iter()
            .map(|(name, s)| (format!("stores.{name}.api_key"), &s.api_key));
        for (field, secret) in secrets.into_iter().chain(store_secrets) {
            if secret.is_inline() {
                warnings.push(format!(
                    "{field} holds an inline secret; use 'env:<VAR>' or 'keychain:<account>'"
                ));
            }
        }

        warnings.extend(self.answer.validate().err().map(|e| e.to_string()));

        if self.answer.max_output_tokens >= self.answer.max_prompt_tokens {
            warnings.push(format!(
                "answer.max_output_tokens ({}) >= answer.max_prompt_tokens ({}); check the model's context window",
                self.answer.max_output_tokens, self.answer.max_prompt_tokens
            ));
        }

        if self.preprocess.segmenter == "compound"
            && self.preprocess.lexicon.is_empty()
            && self.preprocess.lexicon_path.is_none()
        {
            warnings.push("preprocess.segmenter is 'compound' but no lexicon is configured".into());
        }

        warnings
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `FAQGATE_`, `__` separating sections)
/// 3. Workspace-local config (`.faqgate/config.toml`)
/// 4. User config (`~/.config/faqgate/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&FaqgateConfig>,
) -> Result<FaqgateConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(FaqgateConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // FAQGATE_ANSWER__CONFIDENCE_THRESHOLD, FAQGATE_EMBEDDING__MODEL, ...
    figment = figment.merge(Env::prefixed("FAQGATE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// `~/.config/faqgate/config.toml` on Linux, platform equivalent elsewhere.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "faqgate", "faqgate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".faqgate").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSPACE_TOML: &str = r#"
[embedding]
provider = "cohere"
model = "multilingual-22-12"
api_key = "env:COHERE_API_KEY"
timeout_secs = 30

[answer]
confidence_threshold = 0.9
fallback_k = 5
max_prompt_tokens = 12000
max_output_tokens = 1500
generation_model = "gpt-3.5-turbo-16k"

[stores.congdoan]
url = "https://congdoan.qdrant.example:6333"
api_key = "env:CD_QDRANT_API_KEY"

[partitions.Congdoan]
store = "congdoan"
collection = "faq"

[corpora.congdoan-docs]
store = "congdoan"
collection = "context"
source_path = "metadata.file_name"
"#;

    #[test]
    fn test_default_config() {
        let config = FaqgateConfig::default();
        assert_eq!(config.embedding.provider, "cohere");
        assert_eq!(config.embedding.model, "multilingual-22-12");
        assert_eq!(config.generation.provider, "anthropic");
        assert!(config.generation.api_key.is_env());
        assert_eq!(config.answer.confidence_threshold, 0.96);
        assert_eq!(config.answer.fallback_k, 3);
        assert!(config.partitions.is_empty());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config: FaqgateConfig = toml::from_str(WORKSPACE_TOML).unwrap();
        let toml_str = toml::to_string(&config).unwrap();
        let back: FaqgateConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.answer.fallback_k, 5);
        assert_eq!(back.partitions["Congdoan"].collection, "faq");
        assert_eq!(
            back.corpora["congdoan-docs"].source_path.as_deref(),
            Some("metadata.file_name")
        );
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.answer.max_prompt_tokens, 16_000);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = FaqgateConfig::default();
        overrides.answer.fallback_k = 7;
        overrides.generation.provider = "openai".into();
        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.answer.fallback_k, 7);
        assert_eq!(config.generation.provider, "openai");
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".faqgate");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(cfg_dir.join("config.toml"), WORKSPACE_TOML).unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.answer.confidence_threshold, 0.9);
        assert_eq!(config.answer.generation_model, "gpt-3.5-turbo-16k");
        assert_eq!(config.stores["congdoan"].timeout_secs, 15);
        assert!(config.validate().is_empty(), "{:?}", config.validate());
    }

    #[test]
    fn test_validate_flags_unknown_store_and_inline_secret() {
        let mut config: FaqgateConfig = toml::from_str(WORKSPACE_TOML).unwrap();
        config.partitions.insert(
            "Quyhoach".into(),
            CollectionConfig {
                store: "quyhoach".into(),
                collection: "faq".into(),
                text_path: None,
                source_path: None,
            },
        );
        config.generation.api_key = SecretRef::from("sk-ant-plaintext");

        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("unknown store 'quyhoach'")));
        assert!(warnings.iter().any(|w| w.contains("generation.api_key")));
    }

    #[test]
    fn test_validate_flags_bad_threshold() {
        let mut config = FaqgateConfig::default();
        config.answer.confidence_threshold = 1.5;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("confidence_threshold")));
    }

    #[test]
    fn test_validate_compound_without_lexicon() {
        let mut config = FaqgateConfig::default();
        config.preprocess.segmenter = "compound".into();
        assert!(config.validate().iter().any(|w| w.contains("lexicon")));
    }
}
