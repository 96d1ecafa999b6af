//! Error types for the TxGuard handshake core.
//!
//! All errors use the `TG_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (malformed input)
//! - 2xx: Request lifecycle errors (missing / expired / lock contention)
//! - 3xx: Verification errors (fee payer, signature, tamper, freshness)
//! - 4xx: Domain safety errors (capacity)
//! - 5xx: Chain errors (submission, confirmation)
//! - 9xx: General / internal errors
//!
//! The `Display` text is the internal, detailed form meant for logs. Callers
//! facing untrusted clients should use [`TxGuardError::public_code`] and
//! [`TxGuardError::public_message`], which collapse every verification
//! failure into one generic rejection.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Central error enum for all TxGuard operations.
#[derive(Debug, Error)]
pub enum TxGuardError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The request failed validation (bad address, non-numeric amount, ...).
    #[error("TG_ERR_100: Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The request id is not a well-formed token.
    #[error("TG_ERR_101: Invalid request id")]
    InvalidRequestId,

    /// The resource key is empty or otherwise unusable.
    #[error("TG_ERR_102: Invalid resource key: {reason}")]
    InvalidResourceKey { reason: String },

    /// The transaction bytes could not be decoded.
    #[error("TG_ERR_103: Malformed transaction: {reason}")]
    MalformedTransaction { reason: String },

    // =================================================================
    // Request Lifecycle Errors (2xx)
    // =================================================================
    /// The request id was never issued, was already consumed, or is past its TTL.
    #[error("TG_ERR_200: Request not found or expired: {request_id}")]
    NotFoundOrExpired { request_id: String },

    /// Waiting for the resource lock exceeded the configured bound.
    #[error("TG_ERR_201: Timed out after {waited_ms}ms waiting for lock on {resource_key}")]
    LockTimeout { resource_key: String, waited_ms: u64 },

    // =================================================================
    // Verification Errors (3xx)
    // =================================================================
    /// The fee payer is missing or is not the expected identity.
    #[error("TG_ERR_300: Fee payer mismatch: {reason}")]
    FeePayerMismatch { reason: String },

    /// A required signature is missing or does not verify.
    #[error("TG_ERR_301: Invalid {label} signature: {reason}")]
    SignatureInvalid { label: String, reason: String },

    /// The message hash differs from the one recorded at build time.
    ///
    /// Carries hash prefixes only.
    #[error("TG_ERR_302: Transaction tampered: expected hash {expected}.., got {actual}..")]
    TamperDetected { expected: String, actual: String },

    /// The anti-replay blockhash is absent or no longer accepted by the chain.
    #[error("TG_ERR_303: Blockhash no longer valid: {reason}")]
    FreshnessExpired { reason: String },

    // =================================================================
    // Domain Safety Errors (4xx)
    // =================================================================
    /// The amount captured at build time exceeds what is left.
    #[error("TG_ERR_400: Capacity exceeded: requested {requested}, remaining {remaining}")]
    CapacityExceeded { requested: Decimal, remaining: Decimal },

    // =================================================================
    // Chain Errors (5xx)
    // =================================================================
    /// The node rejected the transaction before inclusion.
    #[error("TG_ERR_500: Submission failed: {reason}")]
    SubmissionFailed { reason: String },

    /// The transaction was accepted but confirmation polling timed out.
    #[error("TG_ERR_501: Confirmation ambiguous for {signature}: check chain state before retrying")]
    ConfirmationAmbiguous { signature: String },

    /// The transaction landed but its execution failed on-chain.
    #[error("TG_ERR_502: On-chain execution failed for {signature}: {reason}")]
    OnChainRejected { signature: String, reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// The custodial signer could not sign.
    #[error("TG_ERR_900: Signing error: {0}")]
    Signing(String),

    /// A collaborator (builder, ledger, chain client) failed unexpectedly.
    #[error("TG_ERR_901: Collaborator error: {0}")]
    Collaborator(String),

    /// Configuration error (invalid TTLs, bad environment values, ...).
    #[error("TG_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Unrecoverable internal error.
    #[error("TG_ERR_999: Internal error: {0}")]
    Internal(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, TxGuardError>;

/// Coarse classification of a [`TxGuardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFoundOrExpired,
    LockTimeout,
    TamperDetected,
    SignatureInvalid,
    FreshnessExpired,
    CapacityExceeded,
    SubmissionFailed,
    ConfirmationAmbiguous,
    OnChainRejected,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "VALIDATION",
            Self::NotFoundOrExpired => "NOT_FOUND_OR_EXPIRED",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::TamperDetected => "TAMPER_DETECTED",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::FreshnessExpired => "FRESHNESS_EXPIRED",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::SubmissionFailed => "SUBMISSION_FAILED",
            Self::ConfirmationAmbiguous => "CONFIRMATION_AMBIGUOUS",
            Self::OnChainRejected => "ON_CHAIN_REJECTED",
            Self::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

impl TxGuardError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. }
            | Self::InvalidRequestId
            | Self::InvalidResourceKey { .. }
            | Self::MalformedTransaction { .. } => ErrorKind::Validation,
            Self::NotFoundOrExpired { .. } => ErrorKind::NotFoundOrExpired,
            Self::LockTimeout { .. } => ErrorKind::LockTimeout,
            Self::FeePayerMismatch { .. } | Self::SignatureInvalid { .. } => {
                ErrorKind::SignatureInvalid
            }
            Self::TamperDetected { .. } => ErrorKind::TamperDetected,
            Self::FreshnessExpired { .. } => ErrorKind::FreshnessExpired,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::SubmissionFailed { .. } => ErrorKind::SubmissionFailed,
            Self::ConfirmationAmbiguous { .. } => ErrorKind::ConfirmationAmbiguous,
            Self::OnChainRejected { .. } => ErrorKind::OnChainRejected,
            Self::Signing(_)
            | Self::Collaborator(_)
            | Self::Configuration(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the failure was the caller's fault (a 4xx-equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation
                | ErrorKind::NotFoundOrExpired
                | ErrorKind::TamperDetected
                | ErrorKind::SignatureInvalid
                | ErrorKind::FreshnessExpired
                | ErrorKind::CapacityExceeded
        )
    }

    /// Whether the caller may safely retry with a fresh build.
    ///
    /// `ConfirmationAmbiguous` is deliberately `false`: the transaction may
    /// still land, so the caller must inspect the chain first.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SubmissionFailed | ErrorKind::LockTimeout
        )
    }

    /// Whether this failure should be treated as a security event.
    #[must_use]
    pub fn is_security_event(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TamperDetected | ErrorKind::SignatureInvalid | ErrorKind::FreshnessExpired
        )
    }

    /// HTTP-equivalent status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation
            | ErrorKind::TamperDetected
            | ErrorKind::SignatureInvalid
            | ErrorKind::FreshnessExpired => 400,
            ErrorKind::NotFoundOrExpired => 404,
            ErrorKind::CapacityExceeded => 409,
            ErrorKind::SubmissionFailed | ErrorKind::OnChainRejected => 502,
            ErrorKind::LockTimeout => 503,
            ErrorKind::ConfirmationAmbiguous => 504,
            ErrorKind::Internal => 500,
        }
    }

    /// Machine-readable code safe to expose to clients.
    ///
    /// Tamper, signature and freshness failures share one code so a client
    /// cannot learn which check it tripped.
    #[must_use]
    pub fn public_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "invalid_request",
            ErrorKind::NotFoundOrExpired => "request_not_found_or_expired",
            ErrorKind::LockTimeout => "resource_busy",
            ErrorKind::TamperDetected
            | ErrorKind::SignatureInvalid
            | ErrorKind::FreshnessExpired => "transaction_rejected",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::SubmissionFailed => "submission_failed",
            ErrorKind::ConfirmationAmbiguous => "confirmation_pending",
            ErrorKind::OnChainRejected => "transaction_failed",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Human-readable message safe to expose to clients.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest { reason } | Self::InvalidResourceKey { reason } => {
                format!("Invalid request: {reason}")
            }
            Self::InvalidRequestId => "Invalid request id".to_string(),
            Self::MalformedTransaction { .. } => "Transaction could not be decoded".to_string(),
            Self::NotFoundOrExpired { .. } => {
                "Request not found or expired, please start again".to_string()
            }
            Self::LockTimeout { .. } => "Resource is busy, please retry shortly".to_string(),
            Self::FeePayerMismatch { .. }
            | Self::SignatureInvalid { .. }
            | Self::TamperDetected { .. }
            | Self::FreshnessExpired { .. } => {
                "Transaction verification failed, please start again".to_string()
            }
            Self::CapacityExceeded { remaining, .. } => {
                format!("Requested amount exceeds remaining capacity of {remaining}")
            }
            Self::SubmissionFailed { .. } => {
                "Transaction was not accepted by the network, safe to retry".to_string()
            }
            Self::ConfirmationAmbiguous { signature } => format!(
                "Transaction {signature} was submitted but not yet confirmed; check its status before retrying"
            ),
            Self::OnChainRejected { signature, .. } => {
                format!("Transaction {signature} failed on-chain")
            }
            Self::Signing(_) | Self::Collaborator(_) | Self::Configuration(_) | Self::Internal(_) => {
                "Internal error".to_string()
            }
        }
    }
}

/// Wire body for a failed build or confirm call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,
    /// Machine-readable code (see [`TxGuardError::public_code`]).
    pub code: String,
    /// Client-safe message.
    pub error: String,
    /// Whether resubmitting with a fresh build is safe.
    pub retryable: bool,
}

impl From<&TxGuardError> for ErrorResponse {
    fn from(err: &TxGuardError) -> Self {
        Self {
            success: false,
            code: err.public_code().to_string(),
            error: err.public_message(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = TxGuardError::NotFoundOrExpired {
            request_id: "abc".into(),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("TG_ERR_200"), "Got: {msg}");
    }

    #[test]
    fn capacity_exceeded_display() {
        let err = TxGuardError::CapacityExceeded {
            requested: Decimal::new(100, 0),
            remaining: Decimal::new(50, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("TG_ERR_400"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
        assert!(err.public_message().contains("50"));
    }

    #[test]
    fn security_failures_share_public_code() {
        let errors = [
            TxGuardError::FeePayerMismatch {
                reason: "x".into(),
            },
            TxGuardError::SignatureInvalid {
                label: "user".into(),
                reason: "x".into(),
            },
            TxGuardError::TamperDetected {
                expected: "aaaaaaaa".into(),
                actual: "bbbbbbbb".into(),
            },
            TxGuardError::FreshnessExpired {
                reason: "x".into(),
            },
        ];
        let first = errors[0].public_message();
        for err in &errors {
            assert_eq!(err.public_code(), "transaction_rejected");
            assert_eq!(err.public_message(), first);
            assert!(err.is_security_event());
            assert!(err.is_client_error());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn tamper_message_does_not_leak_hashes() {
        let err = TxGuardError::TamperDetected {
            expected: "deadbeef".into(),
            actual: "cafebabe".into(),
        };
        assert!(format!("{err}").contains("deadbeef"));
        assert!(!err.public_message().contains("deadbeef"));
    }

    #[test]
    fn ambiguous_confirmation_is_not_retryable() {
        let ambiguous = TxGuardError::ConfirmationAmbiguous {
            signature: "sig".into(),
        };
        assert_eq!(ambiguous.kind(), ErrorKind::ConfirmationAmbiguous);
        assert!(!ambiguous.is_retryable());
        assert!(!ambiguous.is_client_error());
        assert_eq!(ambiguous.status_code(), 504);

        let submission = TxGuardError::SubmissionFailed {
            reason: "node down".into(),
        };
        assert!(submission.is_retryable());
        assert_ne!(submission.public_code(), ambiguous.public_code());
    }

    #[test]
    fn lock_timeout_is_distinct_from_not_found() {
        let timeout = TxGuardError::LockTimeout {
            resource_key: "pool".into(),
            waited_ms: 10,
        };
        let missing = TxGuardError::NotFoundOrExpired {
            request_id: "abc".into(),
        };
        assert_ne!(timeout.kind(), missing.kind());
        assert_ne!(timeout.public_code(), missing.public_code());
    }

    #[test]
    fn error_response_from_error() {
        let err = TxGuardError::SubmissionFailed {
            reason: "blockhash not found".into(),
        };
        let body = ErrorResponse::from(&err);
        assert!(!body.success);
        assert_eq!(body.code, "submission_failed");
        assert!(body.retryable);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "submission_failed");
        assert_eq!(json["retryable"], true);
    }

    #[test]
    fn all_errors_have_tg_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(TxGuardError::InvalidRequestId),
            Box::new(TxGuardError::MalformedTransaction {
                reason: "short".into(),
            }),
            Box::new(TxGuardError::Signing("no slot".into())),
            Box::new(TxGuardError::Internal("test".into())),
            Box::new(TxGuardError::OnChainRejected {
                signature: "s".into(),
                reason: "r".into(),
            }),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("TG_ERR_"),
                "Error missing TG_ERR_ prefix: {msg}"
            );
        }
    }
}
