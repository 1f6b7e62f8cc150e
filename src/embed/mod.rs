//! Embedding providers behind a uniform capability interface.
//!
//! The orchestrator only ever sees the [`Embedder`] trait. Concrete
//! providers are selected by the closed [`ProviderKind`] tag set through
//! [`EmbedderFactory::create`]; an unrecognized tag is a construction-time
//! error, never a mid-run failure.
//!
//! The OpenAI-compatible and Ollama HTTP providers ship in this crate.
//! The `xinference` tag resolves to the OpenAI-compatible client, since
//! that backend speaks the same wire format.

mod ollama;
mod openai;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::types::EmbeddingDescriptor;

#[derive(Debug, Error, Diagnostic)]
pub enum EmbedError {
    #[error("unknown embedding provider '{provider}'")]
    #[diagnostic(
        code(vectorloom::embed::unknown_provider),
        help("supported providers: openai, ollama, xinference")
    )]
    UnknownProvider { provider: String },

    #[error("provider '{provider}' has no settings configured")]
    #[diagnostic(code(vectorloom::embed::unconfigured_provider))]
    UnconfiguredProvider { provider: String },

    #[error("provider '{provider}' requires an api key")]
    #[diagnostic(code(vectorloom::embed::missing_api_key))]
    MissingApiKey { provider: String },

    #[error("embedding request to {provider} failed with status {status}: {message}")]
    #[diagnostic(code(vectorloom::embed::http))]
    Http {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("embedding request to {provider} failed: {message}")]
    #[diagnostic(code(vectorloom::embed::transport))]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("provider returned {actual} embeddings for {expected} inputs")]
    #[diagnostic(code(vectorloom::embed::count_mismatch))]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding dimension {actual} does not match declared {expected}")]
    #[diagnostic(code(vectorloom::embed::dimension_mismatch))]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Turns chunk text into vectors.
///
/// One embedder instance is owned by the run that created it; clients are
/// not shared across runs.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn model(&self) -> &str;

    fn dimension(&self) -> usize;
}

/// Closed set of supported provider tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Ollama,
    Xinference,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Xinference => "xinference",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            "xinference" => Ok(ProviderKind::Xinference),
            other => Err(EmbedError::UnknownProvider {
                provider: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection settings for one provider.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Builds [`Embedder`]s from task descriptors.
///
/// Tag parsing and settings lookup both happen here, at construction time,
/// so a bad descriptor fails before any chunk is scheduled.
pub struct EmbedderFactory {
    settings: FxHashMap<ProviderKind, ProviderSettings>,
}

impl EmbedderFactory {
    /// Empty factory; providers must be configured before use.
    pub fn new() -> Self {
        Self {
            settings: FxHashMap::default(),
        }
    }

    /// Factory configured from conventional environment variables
    /// (`OPENAI_BASE_URL`/`OPENAI_API_KEY`, `OLLAMA_BASE_URL`,
    /// `XINFERENCE_BASE_URL`).
    pub fn from_env() -> Self {
        let mut factory = Self::new();
        let openai_base = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let mut openai = ProviderSettings::new(openai_base);
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            openai = openai.with_api_key(key);
        }
        factory.configure(ProviderKind::OpenAi, openai);

        let ollama_base = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
        factory.configure(ProviderKind::Ollama, ProviderSettings::new(ollama_base));

        if let Ok(base) = std::env::var("XINFERENCE_BASE_URL") {
            factory.configure(ProviderKind::Xinference, ProviderSettings::new(base));
        }
        factory
    }

    /// Set connection settings for a provider.
    pub fn configure(&mut self, provider: ProviderKind, settings: ProviderSettings) {
        self.settings.insert(provider, settings);
    }

    /// Build an embedder for a descriptor.
    ///
    /// Fails on an unknown tag, on a known tag with no configured settings,
    /// and on a provider whose settings lack a required api key.
    pub fn create(&self, descriptor: &EmbeddingDescriptor) -> Result<Arc<dyn Embedder>, EmbedError> {
        let kind = ProviderKind::from_str(&descriptor.provider)?;
        let settings =
            self.settings
                .get(&kind)
                .ok_or_else(|| EmbedError::UnconfiguredProvider {
                    provider: kind.as_str().to_string(),
                })?;

        match kind {
            ProviderKind::OpenAi => {
                let api_key =
                    settings
                        .api_key
                        .clone()
                        .ok_or_else(|| EmbedError::MissingApiKey {
                            provider: kind.as_str().to_string(),
                        })?;
                Ok(Arc::new(OpenAiEmbedder::new(
                    settings.base_url.clone(),
                    api_key,
                    descriptor.model.clone(),
                    descriptor.dimension,
                    settings.timeout,
                )))
            }
            // Xinference exposes the OpenAI-compatible embeddings route; an
            // api key is optional there.
            ProviderKind::Xinference => Ok(Arc::new(OpenAiEmbedder::new(
                settings.base_url.clone(),
                settings.api_key.clone().unwrap_or_default(),
                descriptor.model.clone(),
                descriptor.dimension,
                settings.timeout,
            ))),
            ProviderKind::Ollama => Ok(Arc::new(OllamaEmbedder::new(
                settings.base_url.clone(),
                descriptor.model.clone(),
                descriptor.dimension,
                settings.timeout,
            ))),
        }
    }
}

impl Default for EmbedderFactory {
    fn default() -> Self {
        Self::new()
    }
}
