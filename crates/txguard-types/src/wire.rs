//! JSON request/response bodies exchanged with clients.
//!
//! Field names are camelCase on the wire. The error body lives next to the
//! error type as [`crate::ErrorResponse`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RequestId, TxSignature};

/// Returned by the build phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResponse<Q> {
    /// Unsigned transaction, base64.
    pub transaction: String,
    pub request_id: RequestId,
    /// Last moment a confirm will be accepted.
    pub expires_at: DateTime<Utc>,
    /// Flow-specific preview (price, fees, ...).
    pub quote: Q,
}

/// Submitted by the client for the confirm phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// Kept as raw text so a malformed id surfaces as a validation error
    /// rather than a body decoding failure.
    pub request_id: String,
    /// Client-signed transaction, base64.
    pub signed_transaction: String,
}

/// Returned by a successful confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub success: bool,
    pub signature: TxSignature,
}

impl ConfirmResponse {
    #[must_use]
    pub fn settled(signature: TxSignature) -> Self {
        Self {
            success: true,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_request_uses_camel_case() {
        let req: ConfirmRequest = serde_json::from_str(
            r#"{"requestId": "abc", "signedTransaction": "AAAA"}"#,
        )
        .unwrap();
        assert_eq!(req.request_id, "abc");
        assert_eq!(req.signed_transaction, "AAAA");
    }

    #[test]
    fn build_response_shape() {
        let resp = BuildResponse {
            transaction: "AQID".to_string(),
            request_id: RequestId::generate(),
            expires_at: Utc::now(),
            quote: serde_json::json!({ "price": "1.5" }),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["transaction"], "AQID");
        assert_eq!(json["requestId"], resp.request_id.as_str());
        assert!(json.get("expiresAt").is_some());
        assert_eq!(json["quote"]["price"], "1.5");
    }

    #[test]
    fn confirm_response_settled() {
        let resp = ConfirmResponse::settled(TxSignature([3u8; 64]));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["signature"], "03".repeat(64));
    }
}
