//! Built-in provider catalogue and resolution of the active backend.

use std::fmt;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::config::data::Settings;
use crate::core::credentials::CredentialStore;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuiltinProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    /// Environment variable consulted when no credential is stored.
    pub env_key: String,
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<BuiltinProvider>,
}

impl BuiltinProvider {
    pub fn auth_mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("openai")
    }

    pub fn is_anthropic_mode(&self) -> bool {
        self.auth_mode() == "anthropic"
    }
}

/// Load built-in providers from the embedded catalogue.
pub fn load_builtin_providers() -> Vec<BuiltinProvider> {
    const CONFIG_CONTENT: &str = include_str!("../builtin_providers.toml");

    match toml::from_str::<BuiltinProvidersConfig>(CONFIG_CONTENT) {
        Ok(config) => config.providers,
        Err(err) => {
            warn!(error = %err, "embedded provider catalogue is invalid");
            Vec::new()
        }
    }
}

/// Find a built-in provider by id (case-insensitive). `google` is accepted as
/// an alias for Gemini.
pub fn find_builtin_provider(id: &str) -> Option<BuiltinProvider> {
    let id = if id.eq_ignore_ascii_case("google") {
        "gemini"
    } else {
        id
    };
    load_builtin_providers()
        .into_iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

/// A provider/model pair chosen with `/model`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
}

impl ModelSelection {
    /// Accepts `provider:model` or `provider model`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (provider, model) = match input.split_once(':') {
            Some((provider, model)) => (provider, model),
            None => input.split_once(char::is_whitespace)?,
        };
        let provider = provider.trim();
        let model = model.trim();
        if provider.is_empty() || model.is_empty() || provider.contains(char::is_whitespace) {
            return None;
        }
        Some(Self {
            provider: provider.to_ascii_lowercase(),
            model: model.to_string(),
        })
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Everything a backend needs to open a stream.
#[derive(Clone)]
pub struct ProviderSession {
    pub provider: BuiltinProvider,
    pub model: String,
    pub api_key: String,
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("provider", &self.provider.id)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Why no backend could be resolved. Each variant maps to the user-facing
/// "configuration needed" message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    NoModelSelected,
    UnknownProvider(String),
    MissingCredential { provider: String, env_key: String },
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::NoModelSelected => write!(
                f,
                "no model configured; choose one with /model <provider>:<model>"
            ),
            ResolutionError::UnknownProvider(provider) => write!(
                f,
                "unknown provider '{provider}'; known providers: {}",
                known_provider_ids().join(", ")
            ),
            ResolutionError::MissingCredential { provider, env_key } => write!(
                f,
                "no credential for '{provider}'; store one with /key {provider} <secret> or set {env_key}"
            ),
        }
    }
}

impl std::error::Error for ResolutionError {}

pub fn known_provider_ids() -> Vec<String> {
    load_builtin_providers().into_iter().map(|p| p.id).collect()
}

/// Resolve the active provider session from settings, the credential store,
/// and finally the provider's environment variable.
pub fn resolve_session<E>(
    settings: &Settings,
    credentials: &dyn CredentialStore,
    env_lookup: E,
) -> Result<ProviderSession, ResolutionError>
where
    E: Fn(&str) -> Option<String>,
{
    let (Some(provider_id), Some(model)) = (settings.provider.as_deref(), settings.model.as_deref())
    else {
        return Err(ResolutionError::NoModelSelected);
    };
    if model.trim().is_empty() {
        return Err(ResolutionError::NoModelSelected);
    }

    let provider = find_builtin_provider(provider_id)
        .ok_or_else(|| ResolutionError::UnknownProvider(provider_id.to_string()))?;

    let stored = match credentials.get(&provider.id) {
        Ok(secret) => secret,
        Err(err) => {
            warn!(provider = %provider.id, error = %err, "credential lookup failed");
            None
        }
    };

    let api_key = match stored.filter(|secret| !secret.is_empty()) {
        Some(secret) => secret,
        None => {
            let from_env = env_lookup(&provider.env_key).filter(|value| !value.is_empty());
            match from_env {
                Some(value) => {
                    debug!(provider = %provider.id, env = %provider.env_key, "using credential from environment");
                    value
                }
                None => {
                    return Err(ResolutionError::MissingCredential {
                        provider: provider.id.clone(),
                        env_key: provider.env_key.clone(),
                    })
                }
            }
        }
    };

    Ok(ProviderSession {
        provider,
        model: model.to_string(),
        api_key,
    })
}
