use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tokio_stream::wrappers::ReceiverStream;

use crate::providers::factory::resolve_profile;
use crate::providers::profile::ProviderProfile;
use crate::publisher::{ChannelPublisher, ProgressEvent};

const ENV_PREFIX: &str = "PARLEY";

/// Fields without a default, by their serde name and full key
const REQUIRED_FIELDS: &[(&str, &str)] = &[("model", "provider.model")];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a configuration key, e.g. `provider.model` is
/// `PARLEY_PROVIDER__MODEL`
pub fn to_env_var(key: &str) -> String {
    let key = REQUIRED_FIELDS
        .iter()
        .find(|(field, _)| *field == key)
        .map_or(key, |(_, path)| *path);
    format!("{}_{}", ENV_PREFIX, key.replace('.', "__").to_uppercase())
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub base_url: String,
    pub model: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl ProviderSettings {
    /// The profile this provider resolves to
    pub fn profile(&self) -> ProviderProfile {
        resolve_profile(&self.base_url, &self.model, self.kind.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub system_prompt: String,
    /// Tool names recognised in replies from models without native tool calling
    #[serde(default)]
    pub known_tools: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            rate_window_ms: default_rate_window_ms(),
            progress_capacity: default_progress_capacity(),
        }
    }
}

impl StreamSettings {
    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    /// A progress publisher whose queue holds `progress_capacity` events
    pub fn publisher(&self) -> (ChannelPublisher, ReceiverStream<(String, ProgressEvent)>) {
        ChannelPublisher::new(self.progress_capacity)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub stream: StreamSettings,
}

impl Settings {
    /// Load from defaults and `PARLEY_*` environment variables
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from defaults, then the given file, then the environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("provider.base_url", "")?
            .set_default("stream.rate_window_ms", default_rate_window_ms())?
            .set_default("stream.progress_capacity", default_progress_capacity() as u64)?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("agent.known_tools")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Settings>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let message = err.to_string();
                if let Some(field) = missing_field(&message) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(key) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(key),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    pub fn profile(&self) -> ProviderProfile {
        self.provider.profile()
    }
}

/// Extract `model` from a serde message like "missing field `model`"
fn missing_field(message: &str) -> Option<&str> {
    let start = message.find("missing field `")? + "missing field `".len();
    let rest = &message[start..];
    rest.find('`').map(|end| &rest[..end])
}

fn default_rate_window_ms() -> u64 {
    1000
}

fn default_progress_capacity() -> usize {
    100
}
