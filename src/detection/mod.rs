//! Detection modules and the parallel detector registry.

pub mod jailbreak;
pub mod media;
pub mod pii;
pub mod prompt_injection;
pub mod symbolic;

pub use jailbreak::JailbreakDetector;
pub use media::{AudioPerturbationDetector, ImageArtifactDetector, VideoArtifactDetector};
pub use pii::PiiDetector;
pub use prompt_injection::PromptInjectionDetector;
pub use symbolic::SymbolicLogicDetector;

use crate::error::DetectorError;
use crate::finding::ThreatFinding;
use crate::payload::{Modality, RequestPayload};
use crate::DetectorConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A stateless analyzer mapping a payload snapshot to zero or more findings.
///
/// Implementations must be purely computational over already-resolved
/// in-memory fields: no I/O, no shared mutable state, safely abandonable
/// mid-flight.
pub trait Detector: Send + Sync {
    /// Stable name used in logs and finding attribution
    fn name(&self) -> &'static str;

    /// Modalities this detector wants to see
    fn modalities(&self) -> &'static [Modality];

    /// Analyze the payload and return findings
    fn detect(
        &self,
        payload: &RequestPayload,
        config: &DetectorConfig,
    ) -> Result<Vec<ThreatFinding>, DetectorError>;
}

/// Holds the active detector set and fans requests out to all applicable
/// detectors in parallel, isolating per-detector failures and timeouts.
pub struct DetectorRegistry {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorRegistry {
    /// An empty registry. Use [`DetectorRegistry::from_config`] for the
    /// standard detector set.
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Registry holding every detector enabled in the configuration.
    pub fn from_config(config: &DetectorConfig) -> Self {
        let mut registry = Self::new();
        if config.prompt_injection_enabled {
            registry.register(Arc::new(PromptInjectionDetector::new()));
        }
        if config.jailbreak_enabled {
            registry.register(Arc::new(JailbreakDetector::new()));
        }
        if config.pii_enabled {
            registry.register(Arc::new(PiiDetector::new()));
        }
        if config.image_enabled {
            registry.register(Arc::new(ImageArtifactDetector::new()));
        }
        if config.audio_enabled {
            registry.register(Arc::new(AudioPerturbationDetector::new()));
        }
        if config.video_enabled {
            registry.register(Arc::new(VideoArtifactDetector::new()));
        }
        if config.symbolic_enabled {
            registry.register(Arc::new(SymbolicLogicDetector::new()));
        }
        registry
    }

    /// Add a detector to the active set.
    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        debug!(detector = detector.name(), "Registering detector");
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every applicable detector over the payload snapshot in parallel.
    ///
    /// Each detector executes as its own task on the blocking pool under an
    /// individual timeout. A detector that errors, panics, or times out
    /// contributes zero findings and a logged [`DetectorError`]; siblings
    /// are unaffected. Dropping the returned future abandons outstanding
    /// tasks and discards partial results.
    pub async fn run_all(
        &self,
        payload: Arc<RequestPayload>,
        config: Arc<DetectorConfig>,
        timeout: Duration,
    ) -> Vec<ThreatFinding> {
        let available = payload.available_modalities();

        let handles: Vec<_> = self
            .detectors
            .iter()
            .filter(|d| d.modalities().iter().any(|m| available.contains(m)))
            .map(|detector| {
                let detector = Arc::clone(detector);
                let payload = Arc::clone(&payload);
                let config = Arc::clone(&config);
                let name = detector.name();
                let handle =
                    tokio::task::spawn_blocking(move || detector.detect(&payload, &config));
                (name, tokio::time::timeout(timeout, handle))
            })
            .collect();

        let mut findings = Vec::new();
        for (name, task) in handles {
            match task.await {
                Ok(Ok(Ok(batch))) => {
                    debug!(detector = name, count = batch.len(), "Detector completed");
                    findings.extend(batch);
                }
                Ok(Ok(Err(e))) => {
                    warn!(detector = name, error = %e, "Detector failed, contributing zero findings");
                }
                Ok(Err(join_err)) => {
                    let e = if join_err.is_panic() {
                        DetectorError::Panicked { name }
                    } else {
                        DetectorError::Failed {
                            name,
                            reason: join_err.to_string(),
                        }
                    };
                    warn!(detector = name, error = %e, "Detector task aborted, contributing zero findings");
                }
                Err(_elapsed) => {
                    let e = DetectorError::Timeout {
                        name,
                        timeout_ms: timeout.as_millis() as u64,
                    };
                    warn!(detector = name, error = %e, "Detector timed out, contributing zero findings");
                }
            }
        }
        findings
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Evidence, Severity, ThreatType};

    struct FixedDetector;

    impl Detector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn modalities(&self) -> &'static [Modality] {
            &[Modality::Text]
        }

        fn detect(
            &self,
            _payload: &RequestPayload,
            _config: &DetectorConfig,
        ) -> Result<Vec<ThreatFinding>, DetectorError> {
            Ok(vec![ThreatFinding::new(
                ThreatType::Unclassified,
                Modality::Text,
                0.5,
                Severity::Low,
                Evidence::span(0, 1),
                "fixed",
            )])
        }
    }

    struct FaultyDetector;

    impl Detector for FaultyDetector {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn modalities(&self) -> &'static [Modality] {
            &[Modality::Text]
        }

        fn detect(
            &self,
            _payload: &RequestPayload,
            _config: &DetectorConfig,
        ) -> Result<Vec<ThreatFinding>, DetectorError> {
            panic!("boom")
        }
    }

    struct SlowDetector;

    impl Detector for SlowDetector {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn modalities(&self) -> &'static [Modality] {
            &[Modality::Text]
        }

        fn detect(
            &self,
            _payload: &RequestPayload,
            _config: &DetectorConfig,
        ) -> Result<Vec<ThreatFinding>, DetectorError> {
            std::thread::sleep(Duration::from_secs(5));
            Ok(Vec::new())
        }
    }

    fn snapshot(prompt: &str) -> Arc<RequestPayload> {
        Arc::new(RequestPayload::new(prompt))
    }

    #[tokio::test]
    async fn test_from_config_registers_enabled_detectors() {
        let registry = DetectorRegistry::from_config(&DetectorConfig::default());
        assert_eq!(registry.len(), 7);

        let config = DetectorConfig {
            pii_enabled: false,
            symbolic_enabled: false,
            ..Default::default()
        };
        assert_eq!(DetectorRegistry::from_config(&config).len(), 5);
    }

    #[tokio::test]
    async fn test_faulty_detector_is_isolated() {
        let mut registry = DetectorRegistry::new();
        registry.register(Arc::new(FaultyDetector));
        registry.register(Arc::new(FixedDetector));

        let findings = registry
            .run_all(
                snapshot("hello"),
                Arc::new(DetectorConfig::default()),
                Duration::from_millis(500),
            )
            .await;
        // The sibling's finding survives the panic
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detector, "fixed");
    }

    #[tokio::test]
    async fn test_timeout_fails_open() {
        let mut registry = DetectorRegistry::new();
        registry.register(Arc::new(SlowDetector));
        registry.register(Arc::new(FixedDetector));

        let started = std::time::Instant::now();
        let findings = registry
            .run_all(
                snapshot("hello"),
                Arc::new(DetectorConfig::default()),
                Duration::from_millis(50),
            )
            .await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].detector, "fixed");
        // Bounded by the per-detector timeout, not the slow detector's sleep
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_modality_filtering() {
        let mut registry = DetectorRegistry::new();
        registry.register(Arc::new(FixedDetector));

        // Text-only detector never sees a payload without prompt text
        let payload = Arc::new(RequestPayload::new(""));
        let findings = registry
            .run_all(
                payload,
                Arc::new(DetectorConfig::default()),
                Duration::from_millis(500),
            )
            .await;
        assert!(findings.is_empty());
    }
}
