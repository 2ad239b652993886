//! Provider selection from configuration.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::{AnthropicBackend, OllamaBackend, OpenAiBackend, Provider};
use crate::error::{Error, Result};

/// The backend families that can be selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Claude,
    Ollama,
    OpenAi,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Claude => "claude-3-5-sonnet-20241022",
            Self::Ollama => "llama3.2",
            Self::OpenAi => "gpt-4o",
        }
    }

    pub fn default_host(self) -> &'static str {
        match self {
            Self::Claude => super::anthropic::DEFAULT_HOST,
            Self::Ollama => super::ollama::DEFAULT_HOST,
            Self::OpenAi => super::openai::DEFAULT_HOST,
        }
    }

    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Claude),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            _ => Err(Error::UnknownProviderKind(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Claude => "claude",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        })
    }
}

/// Settings shared by every backend. Unset fields take the kind's defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: Option<String>,
    pub host: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: None,
            host: None,
            api_key: None,
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

/// Build the backend for `kind`.
///
/// No network traffic happens here; a missing credential is reported now
/// rather than on the first request.
pub fn create(kind: ProviderKind, config: &ProviderConfig) -> Result<Provider> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| kind.default_model().to_string());
    let host = config
        .host
        .clone()
        .unwrap_or_else(|| kind.default_host().to_string());

    let api_key = match (&config.api_key, kind.requires_api_key()) {
        (Some(key), _) if !key.trim().is_empty() => key.clone(),
        (_, true) => return Err(Error::Config(format!("provider `{kind}` requires an API key"))),
        (_, false) => String::new(),
    };

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(Error::Config(format!(
            "temperature must be between 0 and 2, got {}",
            config.temperature
        )));
    }
    if config.max_tokens == 0 {
        return Err(Error::Config("max_tokens must be positive".into()));
    }

    let provider = match kind {
        ProviderKind::Claude => Provider::Anthropic(
            AnthropicBackend::builder(api_key, model)
                .host(host)
                .max_tokens(config.max_tokens)
                .temperature(config.temperature)
                .build(),
        ),
        ProviderKind::Ollama => Provider::Ollama(
            OllamaBackend::builder(model)
                .host(host)
                .max_tokens(config.max_tokens)
                .temperature(config.temperature)
                .build(),
        ),
        ProviderKind::OpenAi => Provider::OpenAi(
            OpenAiBackend::builder(api_key, model)
                .host(host)
                .max_tokens(config.max_tokens)
                .temperature(config.temperature)
                .build(),
        ),
    };

    tracing::debug!(%provider, "provider created");
    Ok(provider)
}
