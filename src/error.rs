//! Error taxonomy for the detection and mitigation pipeline.
//!
//! Detector failures are absorbed at the registry boundary and degrade to
//! zero findings; everything else propagates to the caller with the audit
//! trail attached, so "blocked for safety" stays distinguishable from
//! "infrastructure failure". A policy block is not an error at all — it is
//! the `Blocked` outcome on the dispatcher result.

use crate::finding::DetectionResult;
use crate::payload::AuditTrail;
use thiserror::Error;

/// A single detector failing for a single payload.
///
/// Isolated: logged at the registry, contributes zero findings, never
/// aborts sibling detectors.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    #[error("detector {name} exceeded its {timeout_ms}ms timeout")]
    Timeout { name: &'static str, timeout_ms: u64 },

    #[error("detector {name} panicked")]
    Panicked { name: &'static str },

    #[error("detector {name} failed: {reason}")]
    Failed { name: &'static str, reason: String },
}

/// Severity aggregation failure. Fatal for the request.
#[derive(Debug, Clone, Error)]
pub enum ScorerError {
    #[error("finding from {detector} has confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { detector: String, value: f64 },
}

/// Mitigation strategy failure. Fatal misconfiguration for the request.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("mandatory warning banner could not be injected")]
    BannerMissing,
}

/// Failure reported by a provider adapter
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("provider rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Terminal failure of a dispatched request.
///
/// Every variant carries the audit trail accumulated before the failure.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("internal scoring failure: {source}")]
    Internal {
        #[source]
        source: ScorerError,
        audit: AuditTrail,
    },

    #[error("pipeline misconfiguration: {source}")]
    Configuration {
        #[source]
        source: StrategyError,
        audit: AuditTrail,
    },

    #[error("provider failure: {source}")]
    Provider {
        #[source]
        source: ProviderError,
        /// Detection still completed; reported alongside the failure.
        detection: DetectionResult,
        audit: AuditTrail,
    },
}

impl ProxyError {
    /// The audit trail accumulated before the failure.
    pub fn audit(&self) -> &AuditTrail {
        match self {
            ProxyError::Internal { audit, .. } => audit,
            ProxyError::Configuration { audit, .. } => audit,
            ProxyError::Provider { audit, .. } => audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = DetectorError::Timeout {
            name: "pii",
            timeout_ms: 50,
        };
        assert_eq!(e.to_string(), "detector pii exceeded its 50ms timeout");

        let e = ProviderError::Rejected {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert!(e.to_string().contains("429"));
    }

    #[test]
    fn test_proxy_error_carries_audit() {
        let mut audit = AuditTrail::new();
        audit.push(crate::payload::AuditKind::Warned, "banner");
        let e = ProxyError::Provider {
            source: ProviderError::Unavailable("down".to_string()),
            detection: DetectionResult::default(),
            audit,
        };
        assert_eq!(e.audit().len(), 1);
    }
}
