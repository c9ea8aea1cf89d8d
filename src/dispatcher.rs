//! Per-request orchestration: detect, score, mitigate, forward or block.
//!
//! The dispatcher owns no cross-request state. Each request flows through
//! detector fan-out, severity aggregation, and mitigation; blocked requests
//! terminate before the provider is ever contacted. Response inspection,
//! when enabled, runs the same pipeline symmetrically over the completion
//! text. Learning events are emitted over a bounded broadcast channel that
//! never blocks the request path; lagging subscribers lose the oldest
//! events first.

use crate::detection::DetectorRegistry;
use crate::error::ProxyError;
use crate::finding::DetectionResult;
use crate::mitigation::{Mitigation, MitigationAction, MitigationStrategy};
use crate::payload::{AuditKind, RequestPayload, SanitizedPayload};
use crate::provider::{ProviderAdapter, ProviderResponse};
use crate::scoring::SeverityScorer;
use crate::{DetectorConfig, PipelineConfig};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Terminal status of a dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Forwarded to the provider (possibly sanitized)
    Allowed,
    /// Rejected by policy; the provider response, if any, was withheld
    Blocked,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Blocked => "blocked",
        }
    }
}

/// Final result of one dispatched request
#[derive(Debug, Clone)]
pub struct ProxyOutcome {
    pub outcome: Outcome,
    /// The sanitized request payload with its full audit trail
    pub request: SanitizedPayload,
    pub detection: DetectionResult,
    /// Provider response; content is the sanitized text when response
    /// inspection is enabled, and absent for blocked requests
    pub response: Option<ProviderResponse>,
    /// Sanitized response payload when response inspection ran and passed
    pub response_payload: Option<SanitizedPayload>,
    /// Detection result of response inspection, when it ran
    pub response_detection: Option<DetectionResult>,
    pub completed_at: DateTime<Utc>,
}

/// Read-only detection snapshot emitted to the external learning subsystem
#[derive(Debug, Clone)]
pub struct LearningEvent {
    pub request_id: Uuid,
    pub detection: DetectionResult,
    pub sanitized: SanitizedPayload,
    pub action: MitigationAction,
    pub outcome: Outcome,
}

/// Orchestrates the detection and mitigation pipeline for one configured
/// strategy and provider
pub struct ProxyDispatcher {
    config: PipelineConfig,
    detector_config: Arc<DetectorConfig>,
    registry: DetectorRegistry,
    scorer: SeverityScorer,
    strategy: MitigationStrategy,
    provider: Arc<dyn ProviderAdapter>,
    learning: broadcast::Sender<LearningEvent>,
}

impl ProxyDispatcher {
    /// Build a dispatcher with the standard detector set for the given
    /// configuration.
    pub fn new(config: PipelineConfig, provider: Arc<dyn ProviderAdapter>) -> Self {
        let registry = DetectorRegistry::from_config(&config.detectors);
        Self::with_registry(config, registry, provider)
    }

    /// Build a dispatcher around a caller-assembled registry.
    pub fn with_registry(
        config: PipelineConfig,
        registry: DetectorRegistry,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Self {
        let (learning, _) = broadcast::channel(config.learning_queue_capacity.max(1));
        Self {
            detector_config: Arc::new(config.detectors.clone()),
            registry,
            scorer: SeverityScorer::new(config.scoring.clone()),
            strategy: MitigationStrategy::new(config.strategy, config.redact_threshold),
            provider,
            learning,
            config,
        }
    }

    /// Subscribe to learning events. Slow subscribers lag and lose the
    /// oldest events; the request path is never affected.
    pub fn subscribe_learning(&self) -> broadcast::Receiver<LearningEvent> {
        self.learning.subscribe()
    }

    /// Process one request end to end.
    pub async fn dispatch(&self, payload: RequestPayload) -> Result<ProxyOutcome, ProxyError> {
        let payload = Arc::new(payload);
        let request_id = payload.id;

        let (detection, mitigation) = self.inspect(Arc::clone(&payload)).await?;
        let Mitigation {
            payload: mut sanitized,
            action,
        } = mitigation;

        debug!(
            request_id = %request_id,
            findings = detection.len(),
            action = action.as_str(),
            "Request inspected"
        );

        if action == MitigationAction::Block {
            info!(request_id = %request_id, "Request blocked by policy");
            self.emit_learning(request_id, &detection, &sanitized, action, Outcome::Blocked);
            return Ok(ProxyOutcome {
                outcome: Outcome::Blocked,
                request: sanitized,
                detection,
                response: None,
                response_payload: None,
                response_detection: None,
                completed_at: Utc::now(),
            });
        }

        let mut response = self
            .provider
            .send(&sanitized)
            .await
            .map_err(|source| ProxyError::Provider {
                source,
                detection: detection.clone(),
                audit: sanitized.audit.clone(),
            })?;

        let mut response_payload = None;
        let mut response_detection = None;
        if self.config.inspect_responses {
            let reply = Arc::new(RequestPayload::new(response.content.clone()));
            let (reply_detection, reply_mitigation) = self.inspect(reply).await?;

            if reply_mitigation.action == MitigationAction::Block {
                warn!(request_id = %request_id, "Provider response blocked by policy");
                sanitized
                    .audit
                    .push(AuditKind::Blocked, "response blocked by policy");
                self.emit_learning(
                    request_id,
                    &reply_detection,
                    &reply_mitigation.payload,
                    reply_mitigation.action,
                    Outcome::Blocked,
                );
                return Ok(ProxyOutcome {
                    outcome: Outcome::Blocked,
                    request: sanitized,
                    detection,
                    response: None,
                    response_payload: None,
                    response_detection: Some(reply_detection),
                    completed_at: Utc::now(),
                });
            }

            // The caller sees the sanitized completion text
            response.content = reply_mitigation.payload.prompt.clone();
            response_payload = Some(reply_mitigation.payload);
            response_detection = Some(reply_detection);
        }

        self.emit_learning(request_id, &detection, &sanitized, action, Outcome::Allowed);
        Ok(ProxyOutcome {
            outcome: Outcome::Allowed,
            request: sanitized,
            detection,
            response: Some(response),
            response_payload,
            response_detection,
            completed_at: Utc::now(),
        })
    }

    /// Fan out, aggregate, and mitigate one payload snapshot.
    async fn inspect(
        &self,
        payload: Arc<RequestPayload>,
    ) -> Result<(DetectionResult, Mitigation), ProxyError> {
        let findings = self
            .registry
            .run_all(
                Arc::clone(&payload),
                Arc::clone(&self.detector_config),
                self.config.detector_timeout,
            )
            .await;

        let detection = self
            .scorer
            .aggregate(findings)
            .map_err(|source| ProxyError::Internal {
                source,
                audit: Default::default(),
            })?;

        let mitigation = self
            .strategy
            .mitigate(&payload, &detection)
            .map_err(|source| ProxyError::Configuration {
                source,
                audit: Default::default(),
            })?;

        Ok((detection, mitigation))
    }

    fn emit_learning(
        &self,
        request_id: Uuid,
        detection: &DetectionResult,
        sanitized: &SanitizedPayload,
        action: MitigationAction,
        outcome: Outcome,
    ) {
        // Fire and forget: send only fails when nobody subscribed, and a
        // lagging subscriber drops its oldest events, never this call
        let _ = self.learning.send(LearningEvent {
            request_id,
            detection: detection.clone(),
            sanitized: sanitized.clone(),
            action,
            outcome,
        });
    }
}
