use crate::config::types::{
    Config, FilterConfig, LadderConfig, LlmConfig, OutputConfig, PhasesConfig, RetryConfig,
    RetryStageConfig, SchedulerConfig, TargetConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target_config(&config.target)?;
    validate_filter_config(&config.filter)?;
    validate_ladder_config(&config.ladder)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_retry_config(&config.retry)?;
    validate_phases_config(&config.phases)?;
    validate_llm_config(&config.llm)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the target base URL
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", config.base_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    match url.host_str() {
        Some(host) => validate_domain_string(host),
        None => Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        ))),
    }
}

fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.max_url_length < 16 {
        return Err(ConfigError::Validation(format!(
            "max-url-length must be >= 16, got {}",
            config.max_url_length
        )));
    }

    if let Some(ext) = config
        .blocked_extensions
        .iter()
        .find(|e| e.is_empty() || e.starts_with('.'))
    {
        return Err(ConfigError::Validation(format!(
            "blocked-extensions entries must be non-empty and given without a dot, got '{}'",
            ext
        )));
    }

    Ok(())
}

fn validate_ladder_config(config: &LadderConfig) -> Result<(), ConfigError> {
    if config.strategies.is_empty() {
        return Err(ConfigError::Validation(
            "ladder.strategies cannot be empty".to_string(),
        ));
    }

    if config.max_concurrent < 1 || config.max_concurrent > 200 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent must be between 1 and 200, got {}",
            config.max_concurrent
        )));
    }

    for strategy in &config.strategies {
        if config.timeouts.for_strategy(*strategy) == 0 {
            return Err(ConfigError::Validation(format!(
                "timeout for stage '{}' must be > 0",
                strategy
            )));
        }
    }

    if let Some(proxy) = &config.proxy_url {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy-url: {}", e)))?;
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.min_batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "min-batch-size must be >= 1, got {}",
            config.min_batch_size
        )));
    }

    if config.min_batch_size > config.initial_batch_size
        || config.initial_batch_size > config.max_batch_size
    {
        return Err(ConfigError::Validation(format!(
            "batch sizes must satisfy min <= initial <= max, got {} / {} / {}",
            config.min_batch_size, config.initial_batch_size, config.max_batch_size
        )));
    }

    if config.increase_step < 1 || config.decrease_step < 1 {
        return Err(ConfigError::Validation(
            "increase-step and decrease-step must be >= 1".to_string(),
        ));
    }

    if config.adaptation_start_batch < 1 {
        return Err(ConfigError::Validation(
            "adaptation-start-batch is 1-based and must be >= 1".to_string(),
        ));
    }

    if !(0.0..1.0).contains(&config.memory_headroom) {
        return Err(ConfigError::Validation(format!(
            "memory-headroom must be in [0, 1), got {}",
            config.memory_headroom
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    for (name, stage) in ["stage-a", "stage-b", "stage-c"].iter().zip(config.stages()) {
        validate_retry_stage(name, stage)?;
    }
    Ok(())
}

fn validate_retry_stage(name: &str, stage: &RetryStageConfig) -> Result<(), ConfigError> {
    if stage.batch_size < 1 || stage.concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "retry.{}: batch-size and concurrency must be >= 1",
            name
        )));
    }

    if stage.timeout_secs == 0 {
        return Err(ConfigError::Validation(format!(
            "retry.{}: timeout-secs must be > 0",
            name
        )));
    }

    Ok(())
}

fn validate_phases_config(config: &PhasesConfig) -> Result<(), ConfigError> {
    if config.probe_batch_size < 1 {
        return Err(ConfigError::Validation(
            "probe-batch-size must be >= 1".to_string(),
        ));
    }

    if config.phase_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "phase-timeout-secs must be > 0 when set".to_string(),
        ));
    }

    if config.parent.enabled && config.parent.max_levels < 1 {
        return Err(ConfigError::Validation(
            "parent.max-levels must be >= 1".to_string(),
        ));
    }

    for path in &config.directory.extra_paths {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "directory.extra-paths entries must start with '/', got '{}'",
                path
            )));
        }
    }

    Ok(())
}

fn validate_llm_config(config: &LlmConfig) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ConfigError::Validation(format!(
            "llm.temperature must be between 0 and 2, got {}",
            config.temperature
        )));
    }

    if let Some(endpoint) = &config.endpoint {
        Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid llm.endpoint: {}", e)))?;
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report-path cannot be empty".to_string(),
        ));
    }

    if config.urls_path.is_empty() {
        return Err(ConfigError::Validation(
            "urls-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a host name
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::Validation("Domain cannot be empty".to_string()));
    }

    // Check for invalid characters
    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
