// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::types::RiskLevel;

#[derive(Debug, Clone, PartialEq)]
pub enum GateError {
    // The risk service could not be reached (pre-flight, nothing attempted)
    ServiceUnavailable,
    // The risk service returned a verdict we could not interpret
    MalformedResponse(String),
    // The risk service rejected the submission; carries the explanation
    RiskRejected {
        risk_score: f64,
        risk_level: RiskLevel,
        risk_factors: Vec<String>,
    },
    // The user declined to sign, or cancelled the submission
    UserCancelled,
    // The signing account cannot cover the transaction fee
    InsufficientFunds,
    // Any signing failure other than rejection or insufficient funds
    SigningFailed(String),
    // Network-layer failure before a transaction hash was obtained
    BroadcastFailed(String),
    // The confirmation wait exceeded the configured ceiling; the
    // transaction may still land and is reconciled by the monitor
    ConfirmationTimeout { waited_secs: u64 },
    // Another submission for the same account is still in flight
    SubmissionInProgress,
    // A chain event whose shape no classifier recognizes
    UnrecognizedEvent(String),
    // Ledger/provider error
    ProviderError(String),
    // Internal error
    InternalError(String),
    // Uncategorized error
    Generic(String),
}

impl GateError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            GateError::ServiceUnavailable => "service_unavailable",
            GateError::MalformedResponse(_) => "malformed_response",
            GateError::RiskRejected { .. } => "risk_rejected",
            GateError::UserCancelled => "user_cancelled",
            GateError::InsufficientFunds => "insufficient_funds",
            GateError::SigningFailed(_) => "signing_failed",
            GateError::BroadcastFailed(_) => "broadcast_failed",
            GateError::ConfirmationTimeout { .. } => "confirmation_timeout",
            GateError::SubmissionInProgress => "submission_in_progress",
            GateError::UnrecognizedEvent(_) => "unrecognized_event",
            GateError::ProviderError(_) => "provider_error",
            GateError::InternalError(_) => "internal_error",
            GateError::Generic(_) => "generic",
        }
    }
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::ServiceUnavailable => write!(f, "risk service is unavailable"),
            GateError::MalformedResponse(msg) => {
                write!(f, "malformed risk service response: {}", msg)
            }
            GateError::RiskRejected {
                risk_score,
                risk_level,
                risk_factors,
            } => write!(
                f,
                "submission rejected by risk assessment (score {:.2}, level {}): {}",
                risk_score,
                risk_level,
                risk_factors.join(", ")
            ),
            GateError::UserCancelled => write!(f, "submission cancelled by user"),
            GateError::InsufficientFunds => write!(f, "insufficient funds for gas"),
            GateError::SigningFailed(msg) => write!(f, "signing failed: {}", msg),
            GateError::BroadcastFailed(msg) => write!(f, "broadcast failed: {}", msg),
            GateError::ConfirmationTimeout { waited_secs } => write!(
                f,
                "confirmation not observed within {}s; outcome unknown",
                waited_secs
            ),
            GateError::SubmissionInProgress => {
                write!(f, "another submission is already in progress for this account")
            }
            GateError::UnrecognizedEvent(name) => write!(f, "unrecognized event: {}", name),
            GateError::ProviderError(msg) => write!(f, "provider error: {}", msg),
            GateError::InternalError(msg) => write!(f, "internal error: {}", msg),
            GateError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for GateError {}

pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that error_type returns consistent, valid strings for all variants
    #[test]
    fn test_error_type_variants() {
        let errors = vec![
            (GateError::ServiceUnavailable, "service_unavailable"),
            (
                GateError::MalformedResponse("x".to_string()),
                "malformed_response",
            ),
            (
                GateError::RiskRejected {
                    risk_score: 0.92,
                    risk_level: RiskLevel::High,
                    risk_factors: vec!["known-flagged-address".to_string()],
                },
                "risk_rejected",
            ),
            (GateError::UserCancelled, "user_cancelled"),
            (GateError::InsufficientFunds, "insufficient_funds"),
            (GateError::SigningFailed("x".to_string()), "signing_failed"),
            (
                GateError::BroadcastFailed("x".to_string()),
                "broadcast_failed",
            ),
            (
                GateError::ConfirmationTimeout { waited_secs: 180 },
                "confirmation_timeout",
            ),
            (GateError::SubmissionInProgress, "submission_in_progress"),
            (
                GateError::UnrecognizedEvent("Foo".to_string()),
                "unrecognized_event",
            ),
            (GateError::ProviderError("x".to_string()), "provider_error"),
            (GateError::InternalError("x".to_string()), "internal_error"),
            (GateError::Generic("x".to_string()), "generic"),
        ];

        for (error, expected_type) in errors {
            assert_eq!(
                error.error_type(),
                expected_type,
                "error_type for {:?} should be '{}'",
                error,
                expected_type
            );
        }
    }

    /// Test that error_type values are valid Prometheus label values
    /// (lowercase, underscores only, no spaces or special chars)
    #[test]
    fn test_error_type_valid_prometheus_labels() {
        let errors_to_test = vec![
            GateError::ServiceUnavailable,
            GateError::UserCancelled,
            GateError::ConfirmationTimeout { waited_secs: 1 },
            GateError::SubmissionInProgress,
            GateError::ProviderError("test".to_string()),
        ];

        for error in errors_to_test {
            let error_type = error.error_type();
            assert!(!error_type.is_empty(), "error_type should not be empty");
            for c in error_type.chars() {
                assert!(
                    c.is_ascii_lowercase() || c == '_',
                    "error_type '{}' contains invalid character '{}' for Prometheus label",
                    error_type,
                    c
                );
            }
            assert!(!error_type.starts_with('_'));
            assert!(!error_type.ends_with('_'));
        }
    }

    /// Test that error_type is consistent regardless of payload content
    #[test]
    fn test_error_type_payload_independence() {
        let err1 = GateError::SigningFailed("short".to_string());
        let err2 = GateError::SigningFailed("a much longer signing error message".to_string());
        assert_eq!(err1.error_type(), err2.error_type());
    }

    #[test]
    fn test_display_carries_explanation() {
        let err = GateError::RiskRejected {
            risk_score: 0.92,
            risk_level: RiskLevel::High,
            risk_factors: vec!["known-flagged-address".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("0.92"));
        assert!(msg.contains("high"));
        assert!(msg.contains("known-flagged-address"));
    }
}
