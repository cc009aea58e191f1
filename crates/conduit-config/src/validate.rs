//! Post-merge validation.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, LlmSection, LoggingSection, ServerSection, TimeoutsSection};

/// Smallest frame limit that still fits a realistic envelope.
const MIN_FRAME_BYTES: usize = 1024;
/// Largest frame limit accepted.
const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
/// Upper bound on model/tool round trips.
const MAX_TOOL_ROUNDS: u32 = 32;
/// Accepted `logging.format` values.
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_server(&config.server)?;
    validate_timeouts(&config.timeouts)?;
    validate_llm(&config.llm)?;
    validate_logging(&config.logging)?;
    Ok(())
}

fn validate_server(server: &ServerSection) -> ConfigResult<()> {
    if !(MIN_FRAME_BYTES..=MAX_FRAME_BYTES).contains(&server.max_frame_bytes) {
        return Err(invalid(
            "server.max_frame_bytes",
            format!("must be between {MIN_FRAME_BYTES} and {MAX_FRAME_BYTES}"),
        ));
    }
    if server.outbound_queue == 0 {
        return Err(invalid("server.outbound_queue", "must be at least 1"));
    }
    if server
        .socket_path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(invalid("server.socket_path", "must not be empty"));
    }
    Ok(())
}

fn validate_timeouts(timeouts: &TimeoutsSection) -> ConfigResult<()> {
    for (field, value) in [
        ("timeouts.handshake_secs", timeouts.handshake_secs),
        ("timeouts.skill_call_secs", timeouts.skill_call_secs),
        ("timeouts.chat_request_secs", timeouts.chat_request_secs),
    ] {
        if value == 0 {
            return Err(invalid(field, "must be greater than zero"));
        }
    }
    if timeouts.chat_request_secs < timeouts.skill_call_secs {
        return Err(invalid(
            "timeouts.chat_request_secs",
            "must not be shorter than timeouts.skill_call_secs",
        ));
    }
    Ok(())
}

fn validate_llm(llm: &LlmSection) -> ConfigResult<()> {
    if llm.max_tool_rounds == 0 || llm.max_tool_rounds > MAX_TOOL_ROUNDS {
        return Err(invalid(
            "llm.max_tool_rounds",
            format!("must be between 1 and {MAX_TOOL_ROUNDS}"),
        ));
    }

    let mut names = HashSet::new();
    for provider in &llm.providers {
        if provider.name.is_empty() {
            return Err(invalid("llm.providers.name", "must not be empty"));
        }
        if !names.insert(provider.name.as_str()) {
            return Err(invalid(
                "llm.providers.name",
                format!("duplicate provider '{}'", provider.name),
            ));
        }
        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            return Err(invalid(
                "llm.providers.base_url",
                format!("provider '{}' needs an http(s) URL", provider.name),
            ));
        }
        if provider.model.is_empty() {
            return Err(invalid(
                "llm.providers.model",
                format!("provider '{}' has no model", provider.name),
            ));
        }
        if !(0.0..=2.0).contains(&provider.temperature) {
            return Err(invalid(
                "llm.providers.temperature",
                "must be between 0.0 and 2.0",
            ));
        }
    }

    if let Some(default) = &llm.default_provider
        && llm.provider(default).is_none()
    {
        return Err(invalid(
            "llm.default_provider",
            format!("no provider named '{default}'"),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingSection) -> ConfigResult<()> {
    if logging.level.trim().is_empty() {
        return Err(invalid("logging.level", "must not be empty"));
    }
    if !LOG_FORMATS.contains(&logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!("must be one of {}", LOG_FORMATS.join(", ")),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderSection;

    fn provider(name: &str) -> ProviderSection {
        ProviderSection {
            name: name.into(),
            base_url: "http://localhost:1234/v1".into(),
            model: "local-model".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_frame_limits() {
        let mut config = Config::default();
        config.server.max_frame_bytes = 10;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_chat_deadline_covers_skill_calls() {
        let mut config = Config::default();
        config.timeouts.chat_request_secs = 5;
        config.timeouts.skill_call_secs = 10;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_providers() {
        let mut config = Config::default();
        config.llm.providers = vec![provider("a"), provider("a")];
        assert!(validate(&config).is_err());

        config.llm.providers = vec![provider("a")];
        assert!(validate(&config).is_ok());

        config.llm.default_provider = Some("b".into());
        assert!(validate(&config).is_err());

        config.llm.default_provider = None;
        config.llm.providers[0].base_url = "ftp://x".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_log_format() {
        let mut config = Config::default();
        config.logging.format = "fancy".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }
}
