//! Configuration loading from switchboard.toml.
//!
//! ```toml
//! [provider]
//! kind = "ollama"
//! model = "llama3.2"
//!
//! [session]
//! max_tool_rounds = 2
//!
//! [servers.files]
//! command = "mcp-server-filesystem"
//! args = ["."]
//!
//! [servers.search]
//! url = "http://localhost:8080/mcp"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use mcp::{ServerConfig, TransportConfig};
use runtime::{ProviderConfig, ProviderKind, SessionConfig, SessionOptions};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderSection,

    #[serde(default)]
    pub session: SessionSection,

    /// Tool servers by name. Connected in name order.
    #[serde(default)]
    pub servers: BTreeMap<String, TransportConfig>,
}

/// Provider selection plus its settings.
#[derive(Debug, Deserialize)]
pub struct ProviderSection {
    /// One of `claude`, `ollama` or `openai`.
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(flatten)]
    pub settings: ProviderConfig,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            settings: ProviderConfig::default(),
        }
    }
}

fn default_kind() -> String {
    "ollama".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionSection {
    pub max_tool_rounds: Option<usize>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve into a session configuration.
    ///
    /// `env` looks up environment variables; API keys missing from the file
    /// are taken from `ANTHROPIC_API_KEY` or `OPENAI_API_KEY`.
    pub fn into_session_config(
        self,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<SessionConfig, ConfigError> {
        let kind: ProviderKind = overrides
            .provider
            .as_deref()
            .unwrap_or(&self.provider.kind)
            .parse()
            .map_err(|e: runtime::Error| ConfigError::Invalid(e.to_string()))?;

        let mut provider_config = self.provider.settings;
        if let Some(model) = overrides.model {
            provider_config.model = Some(model);
        }
        if provider_config.api_key.is_none() {
            provider_config.api_key = api_key_var(kind).and_then(&env);
        }

        let mut options = SessionOptions::default();
        if let Some(rounds) = self.session.max_tool_rounds {
            options.max_tool_rounds = rounds;
        }

        let servers = self
            .servers
            .into_iter()
            .map(|(name, transport)| ServerConfig { name, transport })
            .collect();

        Ok(SessionConfig {
            servers,
            provider: kind,
            provider_config,
            options,
        })
    }
}

fn api_key_var(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::Claude => Some("ANTHROPIC_API_KEY"),
        ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
        ProviderKind::Ollama => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[provider]
kind = "claude"
model = "claude-3-5-haiku-20241022"
max_tokens = 2000

[session]
max_tool_rounds = 3

[servers.search]
url = "http://localhost:8080/mcp"
headers = { Authorization = "Bearer t" }

[servers.files]
command = "mcp-server-filesystem"
args = ["."]
env = { LOG = "1" }
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.provider.kind, "claude");
        assert_eq!(config.provider.settings.max_tokens, 2000);
        assert_eq!(config.provider.settings.temperature, 0.7);
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers["files"].kind(), "stdio");
        assert_eq!(config.servers["search"].kind(), "http");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let session = Config::parse("")
            .unwrap()
            .into_session_config(Overrides::default(), no_env)
            .unwrap();
        assert_eq!(session.provider, ProviderKind::Ollama);
        assert!(session.servers.is_empty());
        assert_eq!(session.options.max_tool_rounds, 1);
    }

    #[test]
    fn overrides_and_env_key_apply() {
        let overrides = Overrides {
            provider: Some("openai".into()),
            model: Some("gpt-4o-mini".into()),
        };
        let env = |name: &str| (name == "OPENAI_API_KEY").then(|| "sk-env".to_string());

        let session = Config::parse(SAMPLE)
            .unwrap()
            .into_session_config(overrides, env)
            .unwrap();

        assert_eq!(session.provider, ProviderKind::OpenAi);
        assert_eq!(session.provider_config.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(session.provider_config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(session.options.max_tool_rounds, 3);
        let names: Vec<_> = session.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["files", "search"]);
    }

    #[test]
    fn file_key_wins_over_env() {
        let config = Config::parse("[provider]\nkind = \"claude\"\napi_key = \"sk-file\"\n").unwrap();
        let session = config
            .into_session_config(Overrides::default(), |_| Some("sk-env".into()))
            .unwrap();
        assert_eq!(session.provider_config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn unknown_provider_is_invalid() {
        let err = Config::parse("[provider]\nkind = \"gemini\"\n")
            .unwrap()
            .into_session_config(Overrides::default(), no_env)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("gemini")));
    }

    #[test]
    fn server_without_command_or_url_is_rejected() {
        let err = Config::parse("[servers.bad]\nargs = [\"x\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
