// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! User-facing error strings are part of the public API and stay in
//! Portuguese, matching the panel that consumes them.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use rapidex_agent::DeliveryOutcome;
use rapidex_core::{ConnectionStatus, HealthStatus, QueueCounts, RapidexError, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::server::GatewayState;

pub const ERR_MISSING_EID: &str = "eid obrigatório";
pub const ERR_INVALID_EID: &str = "eid inválido";
pub const ERR_MISSING_PARAMS: &str = "Parâmetros faltando.";
pub const ERR_NOT_ON_WHATSAPP: &str = "Número não encontrado no WhatsApp.";
pub const MSG_QUEUED: &str = "Mensagem adicionada à fila.";

/// Query string carrying an establishment id.
#[derive(Debug, Deserialize)]
pub struct EidQuery {
    #[serde(default)]
    pub eid: Option<String>,
}

/// Body for `POST /send` and `POST /queue`.
///
/// `to` may arrive as a JSON string or number.
#[derive(Debug, Default, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub eid: Option<Value>,
    #[serde(default)]
    pub to: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QrResponse {
    pub qr: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub eid: String,
    pub conectado: bool,
    pub status: ConnectionStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub live_sessions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueCounts>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn internal_error(e: &RapidexError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

fn failure(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(SendResponse {
            success: false,
            error: Some(error),
            ..Default::default()
        }),
    )
        .into_response()
}

/// Parse a required, non-empty establishment id.
fn require_eid(raw: Option<&str>) -> Result<TenantId, Response> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Err(bad_request(ERR_MISSING_EID));
    };
    TenantId::parse(raw).map_err(|_| bad_request(ERR_INVALID_EID))
}

/// Text of a scalar JSON field; empty strings count as missing.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Validated fields of a message request.
struct Outbound {
    tenant: TenantId,
    to: String,
    message: String,
}

fn require_message(body: Result<Json<MessageRequest>, JsonRejection>) -> Result<Outbound, Response> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e, "rejected request body");
        bad_request(ERR_MISSING_PARAMS)
    })?;

    let eid = scalar_text(body.eid.as_ref());
    let to = scalar_text(body.to.as_ref());
    let message = body.message.filter(|m| !m.is_empty());
    let (Some(eid), Some(to), Some(message)) = (eid, to, message) else {
        return Err(bad_request(ERR_MISSING_PARAMS));
    };

    let tenant = TenantId::parse(&eid).map_err(|_| bad_request(ERR_INVALID_EID))?;
    Ok(Outbound {
        tenant,
        to,
        message,
    })
}

/// GET /
pub async fn get_index() -> Html<&'static str> {
    Html(concat!(
        "<!doctype html>\n",
        "<html><head><meta charset=\"utf-8\"><title>Rapidex WhatsApp</title></head><body>\n",
        "<h1>Rapidex WhatsApp Server</h1>\n",
        "<p>Status: <a href=\"/status?eid=1\">/status?eid=1</a></p>\n",
        "<p>QR: <a href=\"/qr?eid=1\">/qr?eid=1</a></p>\n",
        "<p>Health: <a href=\"/health\">/health</a></p>\n",
        "</body></html>\n"
    ))
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let mut degraded = false;

    match state.manager.connector().health_check().await {
        Ok(HealthStatus::Healthy) => {}
        Ok(other) => {
            debug!(health = ?other, "protocol backend not healthy");
            degraded = true;
        }
        Err(e) => {
            warn!(error = %e, "protocol health check failed");
            degraded = true;
        }
    }

    let queue = match &state.queue {
        Some(queue) => match queue.counts().await {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!(error = %e, "queue counts unavailable");
                degraded = true;
                None
            }
        },
        None => None,
    };

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        live_sessions: state.manager.registry().len(),
        queue,
    })
}

/// GET /qr?eid=
///
/// Returns the current QR if one is published. Otherwise starts (or reuses)
/// the tenant connection and waits the grace window for a QR to appear.
pub async fn get_qr(State(state): State<GatewayState>, Query(query): Query<EidQuery>) -> Response {
    let tenant = match require_eid(query.eid.as_deref()) {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };
    let publisher = state.manager.publisher();

    match publisher.qr(&tenant).await {
        Ok(Some(qr)) => return Json(QrResponse { qr: Some(qr) }).into_response(),
        Ok(None) => {}
        Err(e) => return internal_error(&e),
    }

    if state
        .manager
        .registry()
        .get(&tenant)
        .is_some_and(|h| h.is_connected())
    {
        return Json(QrResponse { qr: None }).into_response();
    }

    if let Err(e) = state.manager.get_or_create(&tenant).await {
        error!(tenant = %tenant, error = %e, "failed to start session for QR");
        return internal_error(&e);
    }

    match publisher
        .wait_for_qr(&tenant, state.manager.settings().qr_grace)
        .await
    {
        Ok(qr) => Json(QrResponse { qr }).into_response(),
        Err(e) => internal_error(&e),
    }
}

/// GET /status?eid=
pub async fn get_status(
    State(state): State<GatewayState>,
    Query(query): Query<EidQuery>,
) -> Response {
    let tenant = match require_eid(query.eid.as_deref()) {
        Ok(tenant) => tenant,
        Err(response) => return response,
    };

    match state.manager.status(&tenant).await {
        Ok(status) => Json(StatusResponse {
            eid: tenant.to_string(),
            conectado: status == ConnectionStatus::Connected,
            status,
        })
        .into_response(),
        Err(e) => internal_error(&e),
    }
}

/// POST /send
pub async fn post_send(
    State(state): State<GatewayState>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Response {
    let outbound = match require_message(body) {
        Ok(outbound) => outbound,
        Err(response) => return response,
    };

    match state
        .deliverer
        .deliver(&outbound.tenant, &outbound.to, &outbound.message)
        .await
    {
        Ok(DeliveryOutcome::Sent { .. }) => Json(SendResponse {
            success: true,
            ..Default::default()
        })
        .into_response(),
        Ok(DeliveryOutcome::NotOnWhatsApp) => {
            failure(StatusCode::OK, ERR_NOT_ON_WHATSAPP.to_string())
        }
        Err(e) => {
            error!(tenant = %outbound.tenant, error = %e, "direct send failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /queue
pub async fn post_queue(
    State(state): State<GatewayState>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Response {
    let outbound = match require_message(body) {
        Ok(outbound) => outbound,
        Err(response) => return response,
    };
    let Some(queue) = &state.queue else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "queue disabled".to_string());
    };

    match queue
        .enqueue(outbound.tenant.as_str(), &outbound.to, &outbound.message)
        .await
    {
        Ok(id) => {
            info!(tenant = %outbound.tenant, queue_id = id, "message queued");
            Json(SendResponse {
                success: true,
                message: Some(MSG_QUEUED.to_string()),
                id: Some(id),
                error: None,
            })
            .into_response()
        }
        Err(e) => {
            error!(tenant = %outbound.tenant, error = %e, "enqueue failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
