// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the Evolution-API gateway.

use serde::{Deserialize, Serialize};

/// Credentials persisted for a tenant: the gateway instance it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCredentials {
    pub instance: String,
    pub token: String,
}

/// `POST /instance/create` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest<'a> {
    pub instance_name: &'a str,
    pub token: &'a str,
    pub qrcode: bool,
    pub integration: &'a str,
}

/// `GET /instance/connectionState/{instance}` response.
#[derive(Debug, Deserialize)]
pub struct ConnectionStateResponse {
    pub instance: InstanceState,
}

#[derive(Debug, Deserialize)]
pub struct InstanceState {
    /// `open`, `connecting` or `close`.
    pub state: String,
}

/// `GET /instance/connect/{instance}` response while pairing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    /// Raw QR content to render; absent once paired.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub pairing_code: Option<String>,
}

/// `POST /chat/whatsappNumbers/{instance}` body.
#[derive(Debug, Serialize)]
pub struct WhatsAppNumbersRequest<'a> {
    pub numbers: Vec<&'a str>,
}

/// One entry of the `whatsappNumbers` response.
#[derive(Debug, Deserialize)]
pub struct NumberCheck {
    pub exists: bool,
    pub jid: String,
    #[serde(default)]
    pub number: Option<String>,
}

/// `POST /message/sendText/{instance}` body.
#[derive(Debug, Serialize)]
pub struct SendTextRequest<'a> {
    pub number: &'a str,
    pub text: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_request_uses_camel_case() {
        let body = serde_json::to_value(CreateInstanceRequest {
            instance_name: "rapidex-1",
            token: "t",
            qrcode: true,
            integration: "WHATSAPP-BAILEYS",
        })
        .unwrap();
        assert_eq!(body["instanceName"], "rapidex-1");
        assert_eq!(body["qrcode"], true);
    }

    #[test]
    fn connect_response_tolerates_missing_fields() {
        let r: ConnectResponse = serde_json::from_value(json!({"count": 0})).unwrap();
        assert!(r.code.is_none());
        let r: ConnectResponse =
            serde_json::from_value(json!({"code": "2@abc", "pairingCode": null})).unwrap();
        assert_eq!(r.code.as_deref(), Some("2@abc"));
    }

    #[test]
    fn number_check_parses_gateway_shape() {
        let checks: Vec<NumberCheck> = serde_json::from_value(json!([
            {"exists": true, "jid": "5511999990000@s.whatsapp.net", "number": "5511999990000"}
        ]))
        .unwrap();
        assert!(checks[0].exists);
        assert_eq!(checks[0].jid, "5511999990000@s.whatsapp.net");
    }
}
