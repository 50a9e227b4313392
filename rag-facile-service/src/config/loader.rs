//! Configuration loading from files and environment variables.

use config::{Config, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::ServiceConfig;

/// Plain variables written by the generated `.env.template`, mapped onto config keys
const OPENAI_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "openai.api_key"),
    ("OPENAI_BASE_URL", "openai.base_url"),
    ("OPENAI_MODEL", "openai.model"),
];

/// Load configuration from `.env`, the optional config file, and env vars
pub fn load_config() -> ServiceResult<ServiceConfig> {
    // A missing .env is the normal case in production
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let overrides = OPENAI_ENV_OVERRIDES
        .iter()
        .map(|(var, key)| (*key, std::env::var(var).ok().filter(|v| !v.is_empty())));

    build_config(overrides)
}

fn build_config<'a>(
    overrides: impl IntoIterator<Item = (&'a str, Option<String>)>,
) -> ServiceResult<ServiceConfig> {
    let mut builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("RAG_FACILE")
                .separator("__")
                .try_parsing(true),
        );

    for (key, value) in overrides {
        builder = builder
            .set_override_option(key, value)
            .map_err(|e| ServiceError::Config {
                message: format!("Invalid override for {}: {}", key, e),
            })?;
    }

    builder
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}
