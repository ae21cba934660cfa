// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./rapidex.toml` > `~/.config/rapidex/rapidex.toml` > `/etc/rapidex/rapidex.toml`
//! with environment variable overrides via `RAPIDEX_` prefix and the bare `PORT` variable.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RapidexConfig;

/// Top-level config sections, used to map `RAPIDEX_<SECTION>_<KEY>` to `section.key`.
const SECTIONS: &[&str] = &["service", "server", "sessions", "queue", "storage", "whatsapp"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/rapidex/rapidex.toml` (system-wide)
/// 3. `~/.config/rapidex/rapidex.toml` (user XDG config)
/// 4. `./rapidex.toml` (local directory)
/// 5. `RAPIDEX_*` environment variables
/// 6. `PORT`
pub fn load_config() -> Result<RapidexConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RapidexConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RapidexConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RapidexConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RapidexConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .merge(port_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RapidexConfig::default()))
        .merge(Toml::file("/etc/rapidex/rapidex.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("rapidex/rapidex.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("rapidex.toml"))
        .merge(env_provider())
        .merge(port_provider())
}

/// Environment provider mapping `RAPIDEX_SECTION_KEY` to `section.key`.
///
/// Only the section prefix is split off; the rest of the name is kept intact so
/// `RAPIDEX_SESSIONS_RECONNECT_DELAY_SECS` maps to `sessions.reconnect_delay_secs`.
fn env_provider() -> Env {
    Env::prefixed("RAPIDEX_").map(|key| map_env_key(key.as_str()).into())
}

/// The hosting platform's `PORT` variable maps to `server.port`.
fn port_provider() -> Env {
    Env::raw()
        .only(&["port"])
        .map(|_| "server.port".into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config key.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
