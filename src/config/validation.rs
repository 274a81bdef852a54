use crate::config::types::{
    CaptureConfig, Config, FilterConfig, FilterKind, LoggingConfig, OutputConfig, RetryConfig,
    RunConfig, SourceConfig, UserAgentConfig, WorkConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on artifact retention (100 years)
const MAX_RETENTION_DAYS: u64 = 36_500;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_work_config(&config.work)?;
    validate_source_config(&config.source)?;
    validate_retry_config(&config.retry)?;
    validate_capture_config(&config.capture)?;
    validate_output_config(&config.output)?;
    validate_run_config(&config.run)?;
    validate_filter_config(&config.filter)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates the work item list
fn validate_work_config(config: &WorkConfig) -> Result<(), ConfigError> {
    if config.terms.is_empty() {
        return Err(ConfigError::Validation(
            "work.terms must contain at least one term".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for term in &config.terms {
        if term.trim().is_empty() {
            return Err(ConfigError::Validation(
                "work.terms cannot contain blank terms".to_string(),
            ));
        }
        if !seen.insert(term.as_str()) {
            return Err(ConfigError::Validation(format!(
                "work.terms contains '{}' more than once",
                term
            )));
        }
    }

    Ok(())
}

/// Validates source connection settings
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid source endpoint: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "Source endpoint '{}' must use http or https",
            config.endpoint
        )));
    }

    if config.access_token_env.is_empty() {
        return Err(ConfigError::Validation(
            "access_token_env cannot be empty".to_string(),
        ));
    }

    if config.token_param.is_empty() || config.term_param.is_empty() {
        return Err(ConfigError::Validation(
            "token_param and term_param cannot be empty".to_string(),
        ));
    }

    if config.page_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "page_limit must be >= 1, got {}",
            config.page_limit
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if !config.fields.iter().any(|f| f == "id") {
        return Err(ConfigError::Validation(
            "source.fields must request the 'id' field".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry and pacing settings
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.backoff_max_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
            config.backoff_max_ms, config.backoff_base_ms
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates capture settings
fn validate_capture_config(config: &CaptureConfig) -> Result<(), ConfigError> {
    if !config.min_free_gb.is_finite() || config.min_free_gb < 0.0 {
        return Err(ConfigError::Validation(format!(
            "min_free_gb must be a non-negative number, got {}",
            config.min_free_gb
        )));
    }

    if config.retention_days > MAX_RETENTION_DAYS {
        return Err(ConfigError::Validation(format!(
            "retention_days must be <= {}, got {}",
            MAX_RETENTION_DAYS, config.retention_days
        )));
    }

    if config.renderer_restart_every < 1 {
        return Err(ConfigError::Validation(
            "renderer_restart_every must be >= 1".to_string(),
        ));
    }

    if config.probe_timeout_secs < 1 || config.download_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "probe and download timeouts must be >= 1 second".to_string(),
        ));
    }

    if config.screenshots_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "screenshots_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output dir cannot be empty".to_string(),
        ));
    }

    if config.aggregate_file.is_empty() || config.state_file.is_empty() {
        return Err(ConfigError::Validation(
            "aggregate_file and state_file cannot be empty".to_string(),
        ));
    }

    if config.aggregate_file == config.state_file {
        return Err(ConfigError::Validation(
            "aggregate_file and state_file must differ".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    Ok(())
}

/// Validates run budgets
fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.max_runtime_secs < 1 {
        return Err(ConfigError::Validation(
            "max_runtime_secs must be >= 1".to_string(),
        ));
    }

    if config.max_items_per_run < 1 {
        return Err(ConfigError::Validation(
            "max_items_per_run must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the optional log file
fn validate_logging_config(config: &LoggingConfig) -> Result<(), ConfigError> {
    let Some(file) = &config.file else {
        return Ok(());
    };

    if file.file_name().is_none() {
        return Err(ConfigError::Validation(format!(
            "logging.file must name a file, got '{}'",
            file.display()
        )));
    }

    if config.max_files < 1 {
        return Err(ConfigError::Validation(
            "logging.max_files must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the record filter
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.kind == FilterKind::Markers {
        if config.markers.is_empty() {
            return Err(ConfigError::Validation(
                "filter.markers cannot be empty for the markers filter".to_string(),
            ));
        }
        if config.min_markers < 1 {
            return Err(ConfigError::Validation(
                "filter.min_markers must be >= 1".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    // Name and version are placed verbatim inside the header
    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}
