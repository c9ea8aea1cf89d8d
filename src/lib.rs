//! Detection and mitigation pipeline for LLM traffic.
//!
//! Provides deterministic policy enforcement between client applications
//! and model providers:
//! - Prompt injection and jailbreak detection
//! - PII detection and redaction (email, SSN, phone, credit card, API key)
//! - Multimodal artifact screening (image, audio, video attachments)
//! - Symbolic-logic manipulation detection
//! - Severity aggregation with a configurable escalation policy
//! - Passive / Balanced / Aggressive mitigation strategies
//! - Per-request orchestration with parallel detector fan-out, per-detector
//!   timeouts, and fail-open isolation
//!
//! The crate is the pipeline core only: provider clients, front doors, and
//! the learning subsystem are external collaborators behind the
//! [`ProviderAdapter`] trait and the learning-event channel.

pub mod detection;
pub mod dispatcher;
pub mod error;
pub mod finding;
pub mod mitigation;
pub mod payload;
pub mod provider;
pub mod scoring;

pub use detection::{Detector, DetectorRegistry};
pub use dispatcher::{LearningEvent, Outcome, ProxyDispatcher, ProxyOutcome};
pub use error::{DetectorError, ProviderError, ProxyError, ScorerError, StrategyError};
pub use finding::{DetectionResult, Evidence, Severity, ThreatFinding, ThreatType};
pub use mitigation::{Mitigation, MitigationAction, MitigationStrategy, StrategyKind};
pub use payload::{
    Attachment, AuditEntry, AuditKind, AuditTrail, MediaAnalysis, Modality, RequestPayload,
    SanitizedPayload,
};
pub use provider::{ProviderAdapter, ProviderResponse};
pub use scoring::{ScoringPolicy, SeverityScorer};

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Per-detector enable flags and thresholds
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub prompt_injection_enabled: bool,
    pub jailbreak_enabled: bool,
    pub pii_enabled: bool,
    pub image_enabled: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub symbolic_enabled: bool,
    /// Audio perturbation level above which a finding is produced
    pub audio_perturbation_threshold: f64,
    /// Byte entropy (bits/byte) at which image data looks steganographic
    pub image_entropy_threshold: f64,
    /// Fraction of anomalous video frames that produces a finding
    pub video_anomaly_threshold: f64,
    /// Shannon entropy (bits/char) an API key body must reach
    pub api_key_entropy_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            prompt_injection_enabled: true,
            jailbreak_enabled: true,
            pii_enabled: true,
            image_enabled: true,
            audio_enabled: true,
            video_enabled: true,
            symbolic_enabled: true,
            audio_perturbation_threshold: 0.1,
            image_entropy_threshold: 7.95,
            video_anomaly_threshold: 0.5,
            api_key_entropy_threshold: 3.5,
        }
    }
}

/// Configuration for one pipeline instance.
///
/// Immutable after construction and threaded through explicitly, so
/// independently configured pipelines can coexist.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Mitigation strategy bound for the pipeline's lifetime
    pub strategy: StrategyKind,
    /// Minimum severity Balanced mode redacts
    pub redact_threshold: Severity,
    /// Time budget for each individual detector
    pub detector_timeout: Duration,
    /// Re-run detection and mitigation on provider responses
    pub inspect_responses: bool,
    /// Capacity of the learning-event channel
    pub learning_queue_capacity: usize,
    pub detectors: DetectorConfig,
    pub scoring: ScoringPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Balanced,
            redact_threshold: Severity::Medium,
            detector_timeout: Duration::from_millis(50),
            inspect_responses: false,
            learning_queue_capacity: 256,
            detectors: DetectorConfig::default(),
            scoring: ScoringPolicy::default(),
        }
    }
}

/// JSON-deserializable form of [`PipelineConfig`]
///
/// Field names use kebab-case to match typical YAML/JSON config style.
/// Unparseable enum values fall back to their defaults with a logged
/// warning rather than failing construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PipelineConfigJson {
    /// Mitigation strategy: "passive", "balanced", or "aggressive"
    pub strategy: String,
    /// Minimum severity Balanced mode redacts
    pub redact_threshold: String,
    /// Per-detector timeout in milliseconds
    pub detector_timeout_ms: u64,
    pub inspect_responses: bool,
    pub learning_queue_capacity: usize,
    pub prompt_injection_enabled: bool,
    pub jailbreak_enabled: bool,
    pub pii_enabled: bool,
    pub image_enabled: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub symbolic_enabled: bool,
    pub audio_perturbation_threshold: f64,
    pub image_entropy_threshold: f64,
    pub video_anomaly_threshold: f64,
    pub api_key_entropy_threshold: f64,
    /// Severity overrides as threat-type name to severity name
    pub severity_overrides: HashMap<String, String>,
    /// Severity assigned to unrecognized finding types
    pub unknown_type_severity: String,
    /// Escalate one level when findings tie at the maximum severity
    pub escalate_on_shared_max: bool,
}

impl Default for PipelineConfigJson {
    fn default() -> Self {
        Self {
            strategy: "balanced".to_string(),
            redact_threshold: "medium".to_string(),
            detector_timeout_ms: 50,
            inspect_responses: false,
            learning_queue_capacity: 256,
            prompt_injection_enabled: true,
            jailbreak_enabled: true,
            pii_enabled: true,
            image_enabled: true,
            audio_enabled: true,
            video_enabled: true,
            symbolic_enabled: true,
            audio_perturbation_threshold: 0.1,
            image_entropy_threshold: 7.95,
            video_anomaly_threshold: 0.5,
            api_key_entropy_threshold: 3.5,
            severity_overrides: HashMap::new(),
            unknown_type_severity: "low".to_string(),
            escalate_on_shared_max: true,
        }
    }
}

impl From<PipelineConfigJson> for PipelineConfig {
    fn from(json: PipelineConfigJson) -> Self {
        let strategy = json.strategy.parse::<StrategyKind>().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid strategy, using balanced");
            StrategyKind::Balanced
        });
        let redact_threshold = json.redact_threshold.parse::<Severity>().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid redact threshold, using medium");
            Severity::Medium
        });
        let unknown_type_severity =
            json.unknown_type_severity.parse::<Severity>().unwrap_or_else(|e| {
                warn!(error = %e, "Invalid unknown-type severity, using low");
                Severity::Low
            });

        let mut overrides = HashMap::new();
        for (type_name, severity_name) in &json.severity_overrides {
            match (
                type_name.parse::<ThreatType>(),
                severity_name.parse::<Severity>(),
            ) {
                (Ok(t), Ok(s)) => {
                    overrides.insert(t, s);
                }
                _ => {
                    warn!(
                        threat_type = type_name.as_str(),
                        severity = severity_name.as_str(),
                        "Ignoring invalid severity override"
                    );
                }
            }
        }

        Self {
            strategy,
            redact_threshold,
            detector_timeout: Duration::from_millis(json.detector_timeout_ms),
            inspect_responses: json.inspect_responses,
            learning_queue_capacity: json.learning_queue_capacity,
            detectors: DetectorConfig {
                prompt_injection_enabled: json.prompt_injection_enabled,
                jailbreak_enabled: json.jailbreak_enabled,
                pii_enabled: json.pii_enabled,
                image_enabled: json.image_enabled,
                audio_enabled: json.audio_enabled,
                video_enabled: json.video_enabled,
                symbolic_enabled: json.symbolic_enabled,
                audio_perturbation_threshold: json.audio_perturbation_threshold,
                image_entropy_threshold: json.image_entropy_threshold,
                video_anomaly_threshold: json.video_anomaly_threshold,
                api_key_entropy_threshold: json.api_key_entropy_threshold,
            },
            scoring: ScoringPolicy {
                overrides,
                unknown_type_severity,
                escalate_on_shared_max: json.escalate_on_shared_max,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.strategy, StrategyKind::Balanced);
        assert_eq!(config.redact_threshold, Severity::Medium);
        assert!(config.detectors.prompt_injection_enabled);
        assert!(config.detectors.pii_enabled);
        assert!((config.detectors.audio_perturbation_threshold - 0.1).abs() < f64::EPSILON);
        assert!(!config.inspect_responses);
    }

    #[test]
    fn test_json_config_parses_kebab_case() {
        let json = r#"{
            "strategy": "aggressive",
            "redact-threshold": "high",
            "detector-timeout-ms": 25,
            "audio-perturbation-threshold": 0.2,
            "severity-overrides": {"pii_email": "critical"}
        }"#;
        let parsed: PipelineConfigJson = serde_json::from_str(json).unwrap();
        let config: PipelineConfig = parsed.into();
        assert_eq!(config.strategy, StrategyKind::Aggressive);
        assert_eq!(config.redact_threshold, Severity::High);
        assert_eq!(config.detector_timeout, Duration::from_millis(25));
        assert!((config.detectors.audio_perturbation_threshold - 0.2).abs() < f64::EPSILON);
        assert_eq!(
            config.scoring.overrides.get(&ThreatType::PiiEmail),
            Some(&Severity::Critical)
        );
        // Unspecified fields keep their defaults
        assert!(config.detectors.jailbreak_enabled);
    }

    #[test]
    fn test_json_config_falls_back_on_invalid_values() {
        let json = r#"{
            "strategy": "nuclear",
            "redact-threshold": "extreme",
            "severity-overrides": {"not_a_type": "critical", "pii_ssn": "bogus"}
        }"#;
        let parsed: PipelineConfigJson = serde_json::from_str(json).unwrap();
        let config: PipelineConfig = parsed.into();
        assert_eq!(config.strategy, StrategyKind::Balanced);
        assert_eq!(config.redact_threshold, Severity::Medium);
        assert!(config.scoring.overrides.is_empty());
    }
}
