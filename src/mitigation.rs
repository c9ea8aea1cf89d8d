//! Mitigation strategies: Passive, Balanced, Aggressive.
//!
//! Exactly one strategy is bound per pipeline instance for its lifetime;
//! selection is configuration, not a per-request transition. Strategy
//! application is a pure function: identical `(payload, detection result)`
//! inputs always yield an identical [`SanitizedPayload`], and content
//! outside redacted spans is byte-identical to the original.

use crate::error::StrategyError;
use crate::finding::{DetectionResult, Evidence, Severity, ThreatType};
use crate::payload::{AuditKind, AuditTrail, RequestPayload, SanitizedPayload};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What the pipeline should do with the request after mitigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MitigationAction {
    /// Forward unchanged
    None,
    /// Forward with a warning injected
    Warn,
    /// Forward with flagged content redacted
    Redact,
    /// Do not forward; terminal rejection
    Block,
}

impl MitigationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MitigationAction::None => "none",
            MitigationAction::Warn => "warn",
            MitigationAction::Redact => "redact",
            MitigationAction::Block => "block",
        }
    }
}

/// Which strategy variant a pipeline is configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Observe and record, never transform, never block
    Passive,
    /// Redact above a threshold, always warn on findings
    #[default]
    Balanced,
    /// Redact everything, block on critical findings
    Aggressive,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Passive => "passive",
            StrategyKind::Balanced => "balanced",
            StrategyKind::Aggressive => "aggressive",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passive" => Ok(StrategyKind::Passive),
            "balanced" => Ok(StrategyKind::Balanced),
            "aggressive" => Ok(StrategyKind::Aggressive),
            _ => Err(StrategyError::UnknownStrategy(s.to_string())),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a strategy to one payload
#[derive(Debug, Clone)]
pub struct Mitigation {
    pub payload: SanitizedPayload,
    pub action: MitigationAction,
}

/// A configured mitigation strategy
#[derive(Debug, Clone)]
pub struct MitigationStrategy {
    kind: StrategyKind,
    /// Minimum finding severity that Balanced mode redacts
    redact_threshold: Severity,
}

const BANNER_PREFIX: &str = "[promptgate warning:";

/// Visible warning banner stating finding count and top severity.
fn warning_banner(count: usize, top: Severity) -> String {
    format!(
        "{} {} finding(s), top severity {}]\n",
        BANNER_PREFIX, count, top
    )
}

impl MitigationStrategy {
    pub fn new(kind: StrategyKind, redact_threshold: Severity) -> Self {
        Self {
            kind,
            redact_threshold,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Apply the strategy. Never mutates its input.
    pub fn mitigate(
        &self,
        payload: &RequestPayload,
        result: &DetectionResult,
    ) -> Result<Mitigation, StrategyError> {
        match self.kind {
            StrategyKind::Passive => Ok(self.passive(payload, result)),
            StrategyKind::Balanced => self.balanced(payload, result),
            StrategyKind::Aggressive => Ok(self.aggressive(payload, result)),
        }
    }

    /// Returns the payload unchanged; records an observation when findings
    /// are non-empty; never blocks.
    fn passive(&self, payload: &RequestPayload, result: &DetectionResult) -> Mitigation {
        let mut sanitized = SanitizedPayload::passthrough(payload);
        if !result.is_empty() {
            sanitized.audit.push(
                AuditKind::Observed,
                format!(
                    "{} finding(s) observed, top severity {}",
                    result.len(),
                    result.top_finding_severity().unwrap_or(Severity::Low)
                ),
            );
        }
        Mitigation {
            payload: sanitized,
            action: MitigationAction::None,
        }
    }

    /// Redacts findings at or above the threshold; independently of any
    /// redaction, prepends the warning banner whenever findings exist.
    fn balanced(
        &self,
        payload: &RequestPayload,
        result: &DetectionResult,
    ) -> Result<Mitigation, StrategyError> {
        let mut audit = AuditTrail::new();

        let spans: Vec<_> = result
            .findings
            .iter()
            .filter(|f| f.severity >= self.redact_threshold)
            .filter_map(|f| match f.evidence {
                Evidence::Span { start, end } => Some((start, end, f.threat_type)),
                Evidence::Attachment { .. } => None,
            })
            .collect();
        let (body, redacted) = redact_spans(&payload.prompt, spans, &mut audit);

        // Flagged attachments are not stripped in Balanced mode; the trail
        // still records them so the caller can act
        for f in &result.findings {
            if let Evidence::Attachment { attachment_id } = &f.evidence {
                audit.push(
                    AuditKind::Observed,
                    format!("attachment {} flagged: {}", attachment_id, f.threat_type),
                );
            }
        }

        let prompt = if result.is_empty() {
            body
        } else {
            // Banner states what was found; tie escalation only affects the
            // aggregated overall severity, not any individual finding
            let top = result.top_finding_severity().unwrap_or(Severity::Low);
            audit.push(
                AuditKind::Warned,
                format!("warning banner injected ({} finding(s))", result.len()),
            );
            format!("{}{}", warning_banner(result.len(), top), body)
        };

        // Mandatory post-condition: findings must never be returned unmarked
        if !result.is_empty() && !prompt.starts_with(BANNER_PREFIX) {
            return Err(StrategyError::BannerMissing);
        }

        let action = if redacted > 0 {
            MitigationAction::Redact
        } else if !result.is_empty() {
            MitigationAction::Warn
        } else {
            MitigationAction::None
        };

        Ok(Mitigation {
            payload: SanitizedPayload {
                source_id: payload.id,
                prompt,
                attachments: payload.attachments.clone(),
                metadata: payload.metadata.clone(),
                audit,
            },
            action,
        })
    }

    /// Redacts every finding with its type-specific placeholder, removes
    /// flagged attachments, and blocks whenever any finding is critical.
    fn aggressive(&self, payload: &RequestPayload, result: &DetectionResult) -> Mitigation {
        let mut audit = AuditTrail::new();

        let spans: Vec<_> = result
            .findings
            .iter()
            .filter_map(|f| match f.evidence {
                Evidence::Span { start, end } => Some((start, end, f.threat_type)),
                Evidence::Attachment { .. } => None,
            })
            .collect();
        let (body, redacted) = redact_spans(&payload.prompt, spans, &mut audit);

        let flagged: BTreeSet<&str> = result
            .findings
            .iter()
            .filter_map(|f| match &f.evidence {
                Evidence::Attachment { attachment_id } => Some(attachment_id.as_str()),
                Evidence::Span { .. } => None,
            })
            .collect();
        let attachments: Vec<_> = payload
            .attachments
            .iter()
            .filter(|a| !flagged.contains(a.id.as_str()))
            .cloned()
            .collect();
        for id in &flagged {
            audit.push(AuditKind::Removed, format!("attachment {} removed", id));
        }

        let neutralized = redacted + flagged.len();
        let prompt = if neutralized > 0 {
            format!(
                "[promptgate notice: {} segment(s) redacted, {} attachment(s) removed]\n{}",
                redacted,
                flagged.len(),
                body
            )
        } else {
            body
        };

        let action = if result.has_critical_finding() {
            audit.push(
                AuditKind::Blocked,
                format!(
                    "blocked by policy: critical finding ({} total)",
                    result.len()
                ),
            );
            MitigationAction::Block
        } else if neutralized > 0 {
            MitigationAction::Redact
        } else if !result.is_empty() {
            audit.push(AuditKind::Observed, "findings without redactable evidence");
            MitigationAction::Warn
        } else {
            MitigationAction::None
        };

        Mitigation {
            payload: SanitizedPayload {
                source_id: payload.id,
                prompt,
                attachments,
                metadata: payload.metadata.clone(),
                audit,
            },
            action,
        }
    }
}

/// Replace the given spans with their type-specific placeholders.
///
/// Spans are applied in ascending start order; overlapping spans extend the
/// covered region without emitting original bytes twice. Content outside
/// redacted spans is copied byte-for-byte. Returns the rewritten text and
/// the number of placeholders inserted.
fn redact_spans(
    text: &str,
    mut spans: Vec<(usize, usize, ThreatType)>,
    audit: &mut AuditTrail,
) -> (String, usize) {
    spans.sort_by_key(|&(start, end, _)| (start, end));

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut redacted = 0usize;

    for (start, end, threat_type) in spans {
        if end > text.len()
            || start >= end
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            continue;
        }
        if end <= cursor {
            // Fully covered by an earlier redaction
            continue;
        }
        if start >= cursor {
            out.push_str(&text[cursor..start]);
            out.push_str(threat_type.redaction());
            redacted += 1;
            audit.push(
                AuditKind::Redacted,
                format!("{} span {}..{}", threat_type, start, end),
            );
        } else {
            // Overlaps the previous redaction; widen it silently
            audit.push(
                AuditKind::Redacted,
                format!("{} span {}..{} (merged)", threat_type, start, end),
            );
        }
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    (out, redacted)
}
