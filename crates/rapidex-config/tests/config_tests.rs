// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Rapidex configuration system.

use rapidex_config::diagnostic::ConfigError;
use rapidex_config::model::RapidexConfig;
use rapidex_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_rapidex_config() {
    let toml = r#"
[service]
name = "relay-test"
log_level = "debug"

[server]
host = "127.0.0.1"
port = 3000
allowed_origins = ["http://localhost:5173"]

[sessions]
dir = "/var/lib/rapidex/sessions"
reconnect_delay_secs = 2
qr_grace_secs = 1
connect_timeout_secs = 4
restore_on_startup = false

[queue]
enabled = false
poll_interval_secs = 30
batch_size = 10

[storage]
database_path = "/tmp/test.db"
wal_mode = false

[whatsapp]
api_url = "https://wa.example.com"
api_key = "secret"
instance_prefix = "t-"
device_name = "Test"
poll_interval_ms = 500
request_timeout_secs = 5
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "relay-test");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.server.allowed_origins, vec!["http://localhost:5173"]);
    assert_eq!(config.sessions.dir, "/var/lib/rapidex/sessions");
    assert_eq!(config.sessions.reconnect_delay().as_secs(), 2);
    assert_eq!(config.sessions.qr_grace().as_secs(), 1);
    assert_eq!(config.sessions.connect_timeout().as_secs(), 4);
    assert!(!config.sessions.restore_on_startup);
    assert!(!config.queue.enabled);
    assert_eq!(config.queue.poll_interval().as_secs(), 30);
    assert_eq!(config.queue.batch_size, 10);
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.whatsapp.api_url, "https://wa.example.com");
    assert_eq!(config.whatsapp.api_key.as_deref(), Some("secret"));
    assert_eq!(config.whatsapp.instance_prefix, "t-");
    assert_eq!(config.whatsapp.poll_interval_ms, 500);
}

/// Missing sections fall back to the production defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should deserialize");
    assert_eq!(config.service.name, "rapidex");
    assert_eq!(config.server.port, 8080);
    assert_eq!(
        config.server.allowed_origins,
        vec!["https://rapidex.app.br", "https://painel.rapidex.app.br"]
    );
    assert_eq!(config.sessions.dir, "sessions");
    assert_eq!(config.sessions.reconnect_delay_secs, 5);
    assert_eq!(config.sessions.qr_grace_secs, 3);
    assert_eq!(config.sessions.connect_timeout_secs, 10);
    assert!(config.sessions.restore_on_startup);
    assert!(config.queue.enabled);
    assert_eq!(config.queue.poll_interval_secs, 15);
    assert_eq!(config.queue.batch_size, 5);
    assert_eq!(config.storage.database_path, "rapidex.db");
    assert!(config.whatsapp.api_key.is_none());
}

/// Unknown field in [sessions] is rejected.
#[test]
fn unknown_field_in_sessions_produces_error() {
    let toml = r#"
[sessions]
reconect_delay_secs = 1
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("reconect_delay_secs"),
        "error should mention the bad key, got: {err_str}"
    );
}

/// Unknown top-level section is rejected.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[telegram]
bot_token = "x"
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Unknown key diagnostics carry the suggestion and the valid keys.
#[test]
fn diagnostic_suggests_close_key() {
    let toml = r#"
[queue]
batch_sise = 3
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail");
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key,
                suggestion,
                valid_keys,
                ..
            } => Some((key, suggestion, valid_keys)),
            _ => None,
        })
        .expect("should produce an UnknownKey error");
    assert_eq!(unknown.0, "batch_sise");
    assert_eq!(unknown.1.as_deref(), Some("batch_size"));
    assert!(unknown.2.contains("poll_interval_secs"));
}

/// Wrong value type is reported as InvalidType.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[server]
port = "eighty"
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("port"))),
        "expected an InvalidType error for port, got: {errors:?}"
    );
}

/// Config errors render through miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "prot".to_string(),
        suggestion: Some("port".to_string()),
        valid_keys: "host, port, allowed_origins".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help").to_string();
    assert!(help.contains("did you mean `port`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("prot"));
}

/// Validation runs after a successful load.
#[test]
fn validation_catches_zero_batch_size() {
    let toml = r#"
[queue]
batch_size = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero batch size should fail");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("batch_size"))
    ));
}

/// `RAPIDEX_*` variables override file values, and `PORT` overrides both.
#[test]
fn env_overrides_apply_in_order() {
    figment::Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file(
            "relay.toml",
            r#"
[server]
port = 3000

[sessions]
dir = "from-file"
"#,
        )?;
        jail.set_env("RAPIDEX_SESSIONS_DIR", "from-env");
        jail.set_env("RAPIDEX_SESSIONS_RECONNECT_DELAY_SECS", "9");
        jail.set_env("RAPIDEX_WHATSAPP_API_KEY", "k");
        jail.set_env("RAPIDEX_SERVER_PORT", "4000");
        jail.set_env("PORT", "5000");

        let config: RapidexConfig =
            load_and_validate_path(std::path::Path::new("relay.toml")).map_err(|errors| {
                figment::Error::from(format!("{errors:?}"))
            })?;
        assert_eq!(config.sessions.dir, "from-env");
        assert_eq!(config.sessions.reconnect_delay_secs, 9);
        assert_eq!(config.whatsapp.api_key.as_deref(), Some("k"));
        assert_eq!(config.server.port, 5000);
        Ok(())
    });
}

/// Without `PORT`, the prefixed variable wins over the file.
#[test]
fn prefixed_port_overrides_file() {
    figment::Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file("relay.toml", "[server]\nport = 3000\n")?;
        jail.set_env("RAPIDEX_SERVER_PORT", "4000");

        let config = load_and_validate_path(std::path::Path::new("relay.toml"))
            .map_err(|errors| figment::Error::from(format!("{errors:?}")))?;
        assert_eq!(config.server.port, 4000);
        Ok(())
    });
}
