//! Severity aggregation.
//!
//! Folds the findings of all detectors into one [`DetectionResult`].
//! Aggregation is commutative over input order (findings are sorted into a
//! canonical order before emission) and idempotent on repeated application
//! to the same set.

use crate::error::ScorerError;
use crate::finding::{DetectionResult, Severity, ThreatFinding, ThreatType};
use std::collections::HashMap;

/// Configurable severity policy applied during aggregation.
///
/// The escalation behavior is a policy table rather than a hardcoded rule
/// so deployments can tune it without touching detector constants.
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    /// Per-type severity overrides applied before aggregation
    pub overrides: HashMap<ThreatType, Severity>,
    /// Severity assigned to findings the policy does not recognize
    pub unknown_type_severity: Severity,
    /// Escalate one level when two or more findings share the maximum
    pub escalate_on_shared_max: bool,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            unknown_type_severity: Severity::Low,
            escalate_on_shared_max: true,
        }
    }
}

/// Aggregates findings into one order-independent detection result
#[derive(Debug, Clone, Default)]
pub struct SeverityScorer {
    policy: ScoringPolicy,
}

impl SeverityScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    /// Fold findings into a [`DetectionResult`].
    ///
    /// Overall severity is the maximum across findings; when two or more
    /// findings share that maximum it escalates one level, capped at
    /// `Critical`. Confidence outside [0, 1] is rejected — findings built
    /// through [`ThreatFinding::new`] are clamped, so this only guards
    /// values constructed by hand.
    pub fn aggregate(
        &self,
        mut findings: Vec<ThreatFinding>,
    ) -> Result<DetectionResult, ScorerError> {
        for f in &findings {
            if !f.confidence.is_finite() || !(0.0..=1.0).contains(&f.confidence) {
                return Err(ScorerError::ConfidenceOutOfRange {
                    detector: f.detector.clone(),
                    value: f.confidence,
                });
            }
        }

        for f in &mut findings {
            if let Some(&severity) = self.policy.overrides.get(&f.threat_type) {
                f.severity = severity;
            } else if f.threat_type == ThreatType::Unclassified {
                f.severity = self.policy.unknown_type_severity;
            }
        }

        // Canonical order makes aggregation commutative over input order
        findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let overall_severity = findings.iter().map(|f| f.severity).max().map(|max| {
            let at_max = findings.iter().filter(|f| f.severity == max).count();
            if at_max >= 2 && self.policy.escalate_on_shared_max {
                max.escalate()
            } else {
                max
            }
        });

        Ok(DetectionResult {
            findings,
            overall_severity,
        })
    }
}
