// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rapidex status` command implementation.
//!
//! Queries the relay's `/health` endpoint and prints uptime, live sessions
//! and queue counts. Falls back gracefully when the relay is not running.

use std::io::IsTerminal;
use std::time::Duration;

use rapidex_config::model::RapidexConfig;
use rapidex_core::{QueueCounts, RapidexError};
use rapidex_gateway::handlers::HealthResponse;
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub live_sessions: Option<usize>,
    pub queue: Option<QueueCounts>,
    pub host: String,
    pub port: u16,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// The listener binds `0.0.0.0` by default; query loopback in that case.
fn health_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "::1",
        other => other,
    }
}

/// Run the `rapidex status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(config: &RapidexConfig, json: bool, plain: bool) -> Result<(), RapidexError> {
    let host = health_host(&config.server.host).to_string();
    let port = config.server.port;
    let url = if host.contains(':') {
        format!("http://[{host}]:{port}/health")
    } else {
        format!("http://{host}:{port}/health")
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| RapidexError::Internal(format!("failed to create HTTP client: {e}")))?;

    let health = match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => Some(
            resp.json::<HealthResponse>()
                .await
                .map_err(|e| RapidexError::Internal(format!("failed to parse health response: {e}")))?,
        ),
        _ => None,
    };

    let report = match health {
        Some(health) => StatusResponse {
            running: true,
            uptime_human: Some(format_uptime(health.uptime_secs)),
            uptime_secs: Some(health.uptime_secs),
            status: health.status,
            live_sessions: Some(health.live_sessions),
            queue: health.queue,
            host,
            port,
        },
        None => StatusResponse {
            running: false,
            status: "not running".to_string(),
            uptime_secs: None,
            uptime_human: None,
            live_sessions: None,
            queue: None,
            host,
            port,
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        if report.running {
            print_status_running(&report, use_color);
        } else {
            print_status_offline(&report.host, report.port, use_color);
        }
    }

    Ok(())
}

/// Print running status with optional colors.
fn print_status_running(report: &StatusResponse, use_color: bool) {
    let uptime = report.uptime_human.as_deref().unwrap_or("-");

    println!();
    println!("  rapidex status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        let status = if report.status == "ok" {
            report.status.green()
        } else {
            report.status.yellow()
        };
        println!("    State:    {} {} (uptime: {})", "✓".green(), status, uptime);
    } else {
        println!("    State:    [OK] {} (uptime: {uptime})", report.status);
    }

    println!("    Sessions: {}", report.live_sessions.unwrap_or(0));
    if let Some(queue) = &report.queue {
        println!(
            "    Queue:    {} pending, {} sending, {} sent, {} failed",
            queue.pending, queue.sending, queue.sent, queue.failed
        );
    }
    println!();
}

/// Print offline status with optional colors.
fn print_status_offline(host: &str, port: u16, use_color: bool) {
    println!();
    println!("  rapidex status");
    println!("  {}", "-".repeat(35));

    if use_color {
        use colored::Colorize;
        println!("    State:    {} {}", "✗".red(), "not running".red());
    } else {
        println!("    State:    [FAIL] not running");
    }

    println!("    Endpoint: http://{host}:{port}/health");
    println!();
    println!("  Start with: rapidex serve");
    println!();
}
