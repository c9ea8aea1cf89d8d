//! Threat findings and aggregated detection results.

use crate::payload::Modality;
use serde::{Deserialize, Serialize};

/// Severity of a single finding or of an aggregated result.
///
/// Ordering is derived, so `Low < Medium < High < Critical` holds and
/// `Ord::max` can be used directly when aggregating.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Get the severity name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// One level up, capped at `Critical`.
    pub fn escalate(self) -> Severity {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High => Severity::Critical,
            Severity::Critical => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Category of a detected threat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    PromptInjection,
    Jailbreak,
    PiiEmail,
    PiiSsn,
    PiiPhone,
    PiiCreditCard,
    PiiApiKey,
    PiiIpAddress,
    ImageTextInjection,
    SteganographicPayload,
    AudioPerturbation,
    VideoArtifact,
    SymbolicManipulation,
    LogicContradiction,
    /// A finding whose category is not recognized by the scoring policy.
    Unclassified,
}

impl ThreatType {
    /// Get the wire name for this threat type
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::PromptInjection => "prompt_injection",
            ThreatType::Jailbreak => "jailbreak",
            ThreatType::PiiEmail => "pii_email",
            ThreatType::PiiSsn => "pii_ssn",
            ThreatType::PiiPhone => "pii_phone",
            ThreatType::PiiCreditCard => "pii_credit_card",
            ThreatType::PiiApiKey => "pii_api_key",
            ThreatType::PiiIpAddress => "pii_ip_address",
            ThreatType::ImageTextInjection => "image_text_injection",
            ThreatType::SteganographicPayload => "steganographic_payload",
            ThreatType::AudioPerturbation => "audio_perturbation",
            ThreatType::VideoArtifact => "video_artifact",
            ThreatType::SymbolicManipulation => "symbolic_manipulation",
            ThreatType::LogicContradiction => "logic_contradiction",
            ThreatType::Unclassified => "unclassified",
        }
    }

    /// Get the redaction placeholder inserted when a span of this type is removed
    pub fn redaction(&self) -> &'static str {
        match self {
            ThreatType::PromptInjection => "[INSTRUCTION REDACTED]",
            ThreatType::Jailbreak => "[JAILBREAK REDACTED]",
            ThreatType::PiiEmail => "[EMAIL REDACTED]",
            ThreatType::PiiSsn => "[SSN REDACTED]",
            ThreatType::PiiPhone => "[PHONE REDACTED]",
            ThreatType::PiiCreditCard => "[CARD REDACTED]",
            ThreatType::PiiApiKey => "[API KEY REDACTED]",
            ThreatType::PiiIpAddress => "[IP REDACTED]",
            ThreatType::ImageTextInjection => "[IMAGE TEXT REDACTED]",
            ThreatType::SteganographicPayload => "[PAYLOAD REDACTED]",
            ThreatType::AudioPerturbation => "[AUDIO REDACTED]",
            ThreatType::VideoArtifact => "[VIDEO REDACTED]",
            ThreatType::SymbolicManipulation => "[LOGIC REDACTED]",
            ThreatType::LogicContradiction => "[LOGIC REDACTED]",
            ThreatType::Unclassified => "[CONTENT REDACTED]",
        }
    }
}

impl std::str::FromStr for ThreatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt_injection" => Ok(ThreatType::PromptInjection),
            "jailbreak" => Ok(ThreatType::Jailbreak),
            "pii_email" => Ok(ThreatType::PiiEmail),
            "pii_ssn" => Ok(ThreatType::PiiSsn),
            "pii_phone" => Ok(ThreatType::PiiPhone),
            "pii_credit_card" => Ok(ThreatType::PiiCreditCard),
            "pii_api_key" => Ok(ThreatType::PiiApiKey),
            "pii_ip_address" => Ok(ThreatType::PiiIpAddress),
            "image_text_injection" => Ok(ThreatType::ImageTextInjection),
            "steganographic_payload" => Ok(ThreatType::SteganographicPayload),
            "audio_perturbation" => Ok(ThreatType::AudioPerturbation),
            "video_artifact" => Ok(ThreatType::VideoArtifact),
            "symbolic_manipulation" => Ok(ThreatType::SymbolicManipulation),
            "logic_contradiction" => Ok(ThreatType::LogicContradiction),
            "unclassified" => Ok(ThreatType::Unclassified),
            _ => Err(format!("Invalid threat type: {}", s)),
        }
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the payload a finding was observed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    /// Byte offsets into the prompt text, `start..end`
    Span { start: usize, end: usize },
    /// The attachment the finding refers to
    Attachment { attachment_id: String },
}

impl Evidence {
    pub fn span(start: usize, end: usize) -> Self {
        Evidence::Span { start, end }
    }

    pub fn attachment(id: impl Into<String>) -> Self {
        Evidence::Attachment {
            attachment_id: id.into(),
        }
    }

    /// Canonical ordering key used when sorting findings deterministically.
    fn sort_key(&self) -> (u8, usize, usize, &str) {
        match self {
            Evidence::Span { start, end } => (0, *start, *end, ""),
            Evidence::Attachment { attachment_id } => (1, 0, 0, attachment_id.as_str()),
        }
    }
}

/// One detector's assertion of an observed adversarial pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatFinding {
    pub threat_type: ThreatType,
    pub modality: Modality,
    /// Detector confidence, always within [0, 1]
    pub confidence: f64,
    pub severity: Severity,
    pub evidence: Evidence,
    /// Name of the detector that produced this finding
    pub detector: String,
    /// Short human-readable description of what was matched
    pub detail: String,
}

impl ThreatFinding {
    /// Create a finding, clamping confidence into [0, 1].
    pub fn new(
        threat_type: ThreatType,
        modality: Modality,
        confidence: f64,
        severity: Severity,
        evidence: Evidence,
        detector: impl Into<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            threat_type,
            modality,
            confidence,
            severity,
            evidence,
            detector: detector.into(),
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Canonical ordering key; independent of the order findings were produced in.
    pub(crate) fn sort_key(&self) -> (&'static str, (u8, usize, usize, &str), &str) {
        (
            self.threat_type.as_str(),
            self.evidence.sort_key(),
            self.detector.as_str(),
        )
    }
}

/// The aggregated, request-scoped outcome of running all applicable detectors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Findings in canonical order
    pub findings: Vec<ThreatFinding>,
    /// Maximum severity across findings (escalated on ties), `None` when clean
    pub overall_severity: Option<Severity>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    /// Whether any finding on its own reached `Critical`.
    ///
    /// Distinct from `overall_severity`, which may be `Critical` only
    /// through tie escalation.
    pub fn has_critical_finding(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity == Severity::Critical)
    }

    /// Highest per-finding severity, before tie escalation.
    pub fn top_finding_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}
