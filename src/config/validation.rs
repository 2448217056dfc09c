use crate::config::types::{
    ArchiveConfig, Config, FeaturesConfig, IntelConfig, OutputConfig, PipelineConfig,
    ResolverConfig, SourceConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_resolver_config(&config.resolver)?;
    validate_features_config(&config.features)?;
    validate_intel_config(&config.intel)?;
    validate_archive_config(&config.archive)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if config.location.trim().is_empty() {
        return Err(ConfigError::Validation(
            "source location cannot be empty".to_string(),
        ));
    }

    let lower = config.location.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(&config.location)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid source location: {}", e)))?;
    }

    validate_timeout("source timeout-secs", config.timeout_secs, 1, 600)
}

fn validate_resolver_config(config: &ResolverConfig) -> Result<(), ConfigError> {
    // Probes stay seconds-scale
    validate_timeout("probe-timeout-secs", config.probe_timeout_secs, 1, 9)?;

    if config.max_redirects > 30 {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be at most 30, got {}",
            config.max_redirects
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.max_body_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-body-bytes must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_features_config(config: &FeaturesConfig) -> Result<(), ConfigError> {
    if !(config.lexical || config.content || config.header || config.host) {
        return Err(ConfigError::Validation(
            "at least one feature family must be enabled".to_string(),
        ));
    }

    validate_timeout("certificate-timeout-secs", config.certificate_timeout_secs, 1, 60)?;
    validate_timeout("dns-timeout-secs", config.dns_timeout_secs, 1, 60)
}

fn validate_intel_config(config: &IntelConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid intel endpoint: {}", e)))?;

    validate_timeout("intel timeout-secs", config.timeout_secs, 1, 60)?;

    if config.retry_backoff_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "retry-backoff-ms must be at most 60000, got {}",
            config.retry_backoff_ms
        )));
    }

    Ok(())
}

fn validate_archive_config(config: &ArchiveConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid archive endpoint: {}", e)))?;

    validate_timeout("archive timeout-secs", config.timeout_secs, 1, 120)
}

fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.export_path.is_empty() {
        return Err(ConfigError::Validation(
            "export-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_timeout(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}
