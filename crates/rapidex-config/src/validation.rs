// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, a usable port and well-formed CORS origins.

use crate::diagnostic::ConfigError;
use crate::model::RapidexConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of failing fast.
pub fn validate_config(config: &RapidexConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else if host.parse::<std::net::IpAddr>().is_err()
        && !host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        errors.push(ConfigError::validation(format!(
            "server.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if config.server.port == 0 {
        errors.push(ConfigError::validation("server.port must not be 0"));
    }

    for origin in &config.server.allowed_origins {
        if !is_http_origin(origin) {
            errors.push(ConfigError::validation(format!(
                "server.allowed_origins entry `{origin}` must be an http:// or https:// origin"
            )));
        }
    }

    if config.sessions.dir.trim().is_empty() {
        errors.push(ConfigError::validation("sessions.dir must not be empty"));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.queue.batch_size == 0 {
        errors.push(ConfigError::validation("queue.batch_size must be at least 1"));
    }

    if config.queue.poll_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "queue.poll_interval_secs must be at least 1",
        ));
    }

    if config.whatsapp.api_url.trim().is_empty() {
        errors.push(ConfigError::validation("whatsapp.api_url must not be empty"));
    } else if !is_http_origin(config.whatsapp.api_url.trim_end_matches('/')) {
        errors.push(ConfigError::validation(format!(
            "whatsapp.api_url `{}` must start with http:// or https://",
            config.whatsapp.api_url
        )));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// `scheme://host[:port][/path]` with an http(s) scheme and a non-empty host.
fn is_http_origin(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let authority = rest.split('/').next().unwrap_or_default();
            !authority.is_empty() && !authority.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&RapidexConfig::default()).is_ok());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = RapidexConfig::default();
        config.server.port = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "server.port"));
    }

    #[test]
    fn bad_origin_fails_validation() {
        let mut config = RapidexConfig::default();
        config.server.allowed_origins = vec!["rapidex.app.br".into(), "https://".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(has_error(&errors, "allowed_origins"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = RapidexConfig::default();
        config.sessions.dir = " ".into();
        config.storage.database_path = String::new();
        config.queue.batch_size = 0;
        config.queue.poll_interval_secs = 0;
        config.whatsapp.api_url = "ftp://gateway".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(has_error(&errors, "sessions.dir"));
        assert!(has_error(&errors, "database_path"));
        assert!(has_error(&errors, "batch_size"));
        assert!(has_error(&errors, "poll_interval_secs"));
        assert!(has_error(&errors, "api_url"));
    }

    #[test]
    fn hostname_host_is_accepted() {
        let mut config = RapidexConfig::default();
        config.server.host = "relay.internal".into();
        assert!(validate_config(&config).is_ok());
        config.server.host = "bad host!".into();
        assert!(validate_config(&config).is_err());
    }
}
