use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable that overrides `intel.api-key`
pub const INTEL_API_KEY_ENV: &str = "URLSCOPE_INTEL_API_KEY";

/// Loads and parses a configuration file from the given path
///
/// The intel API key is taken from `URLSCOPE_INTEL_API_KEY` when that
/// variable is set and non-empty.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use urlscope::config::load_config;
///
/// let config = load_config(Path::new("urlscope.toml")).unwrap();
/// println!("Workers: {}", config.pipeline.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let env_key = std::env::var(INTEL_API_KEY_ENV).ok();
    parse_config(&content, env_key)
}

/// Parses configuration text and applies the API key override
pub fn parse_config(content: &str, api_key_override: Option<String>) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;

    if let Some(key) = api_key_override.filter(|k| !k.trim().is_empty()) {
        config.intel.api_key = Some(key);
    }
    if config.intel.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
        config.intel.api_key = None;
    }

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with every run so runs made under different settings can be told
/// apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
