// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Evolution-API WhatsApp gateway.
//!
//! Provides [`EvolutionClient`] which handles authentication, request
//! construction and error mapping for the handful of endpoints the relay uses.

use std::time::Duration;

use rapidex_config::model::WhatsAppConfig;
use rapidex_core::RapidexError;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{
    ConnectResponse, ConnectionStateResponse, CreateInstanceRequest, NumberCheck,
    SendTextRequest, WhatsAppNumbersRequest,
};

/// Integration type requested for new instances.
const INTEGRATION: &str = "WHATSAPP-BAILEYS";

#[derive(Debug, Clone)]
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl EvolutionClient {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, RapidexError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            headers.insert(
                "apikey",
                HeaderValue::from_str(key).map_err(|e| {
                    RapidexError::Config(format!("invalid gateway API key header value: {e}"))
                })?,
            );
        }

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("{}/{}", config.device_name, env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| RapidexError::Protocol {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a gateway instance. Returns `false` if the name is already taken.
    pub async fn create_instance(&self, instance: &str, token: &str) -> Result<bool, RapidexError> {
        let response = self
            .client
            .post(self.url("/instance/create"))
            .json(&CreateInstanceRequest {
                instance_name: instance,
                token,
                qrcode: true,
                integration: INTEGRATION,
            })
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        let status = response.status();
        debug!(instance, status = %status, "create instance response");
        if status.is_success() {
            return Ok(true);
        }
        if matches!(status, StatusCode::FORBIDDEN | StatusCode::CONFLICT) {
            return Ok(false);
        }
        Err(api_error(response).await)
    }

    /// Connection state of an instance, or `None` if the instance is gone.
    pub async fn connection_state(&self, instance: &str) -> Result<Option<String>, RapidexError> {
        let response = self
            .client
            .get(self.url(&format!("/instance/connectionState/{instance}")))
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ConnectionStateResponse = parse(response).await?;
        Ok(Some(body.instance.state))
    }

    /// Current QR challenge for an instance that is pairing.
    pub async fn qr_code(&self, instance: &str) -> Result<Option<String>, RapidexError> {
        let response = self
            .client
            .get(self.url(&format!("/instance/connect/{instance}")))
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;
        let body: ConnectResponse = parse(response).await?;
        Ok(body.code.filter(|c| !c.is_empty()))
    }

    /// Check which of `numbers` exist on WhatsApp.
    pub async fn whatsapp_numbers(
        &self,
        instance: &str,
        numbers: &[&str],
    ) -> Result<Vec<NumberCheck>, RapidexError> {
        let response = self
            .client
            .post(self.url(&format!("/chat/whatsappNumbers/{instance}")))
            .json(&WhatsAppNumbersRequest {
                numbers: numbers.to_vec(),
            })
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;
        parse(response).await
    }

    pub async fn send_text(&self, instance: &str, number: &str, text: &str) -> Result<(), RapidexError> {
        let response = self
            .client
            .post(self.url(&format!("/message/sendText/{instance}")))
            .json(&SendTextRequest { number, text })
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }

    /// Whether the gateway answers at all.
    pub async fn ping(&self) -> Result<(), RapidexError> {
        let response = self
            .client
            .get(self.url("/"))
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request_failed(&self, e: reqwest::Error) -> RapidexError {
        if e.is_timeout() {
            return RapidexError::Timeout {
                duration: self.timeout,
            };
        }
        RapidexError::Protocol {
            message: format!("gateway request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

async fn api_error(response: reqwest::Response) -> RapidexError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RapidexError::protocol(format!("gateway returned {status}: {body}"))
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RapidexError> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    let body = response.text().await.map_err(|e| RapidexError::Protocol {
        message: format!("failed to read gateway response: {e}"),
        source: Some(Box::new(e)),
    })?;
    serde_json::from_str(&body).map_err(|e| RapidexError::Protocol {
        message: format!("failed to parse gateway response: {e}"),
        source: Some(Box::new(e)),
    })
}
