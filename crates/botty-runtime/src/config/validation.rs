//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BottyConfig, LogOutput, LoggingConfig, RegistryConfig, RuntimeConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BottyConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_registry_config(&config.registry)?;
    validate_runtime_config(&config.runtime)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: {module:?}"
            )));
        }
    }

    Ok(())
}

fn validate_registry_config(registry: &RegistryConfig) -> ConfigResult<()> {
    if registry.max_messages_per_conversation == 0 {
        return Err(ConfigError::validation(
            "registry.max_messages_per_conversation must be at least 1",
        ));
    }
    Ok(())
}

fn validate_runtime_config(runtime: &RuntimeConfig) -> ConfigResult<()> {
    if runtime.handler_timeout_secs == Some(0) {
        return Err(ConfigError::validation(
            "runtime.handler_timeout_secs must be at least 1 when set",
        ));
    }

    if runtime.event_buffer == 0 {
        return Err(ConfigError::validation(
            "runtime.event_buffer must be at least 1",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_validate_default_config() {
        assert_ok!(validate_config(&BottyConfig::default()));
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = BottyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some("botty.log".into());
        assert_ok!(validate_config(&config));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = BottyConfig::default();
        config.runtime.handler_timeout_secs = Some(0);
        let err = assert_err!(validate_config(&config));
        assert!(err.to_string().contains("handler_timeout_secs"), "{err}");
    }

    #[test]
    fn test_zero_registry_capacity_rejected() {
        let mut config = BottyConfig::default();
        config.registry.max_messages_per_conversation = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bad_filter_target() {
        let mut config = BottyConfig::default();
        config
            .logging
            .filters
            .insert("botty framework".into(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
