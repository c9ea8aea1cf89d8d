//! Request payloads, attachments, and the audit trail.
//!
//! A [`RequestPayload`] is immutable once constructed; the dispatcher hands
//! detectors an `Arc` snapshot of it. Attachment analysis fields are
//! already-resolved in-memory values produced by upstream media decoding, so
//! detectors stay purely computational and never perform I/O.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Content modality a detector can declare interest in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
            Modality::Video => "video",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-computed analysis of an attachment's decoded content.
///
/// All fields default to "nothing observed" so callers only populate what
/// their media front-end actually extracted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaAnalysis {
    /// Shannon entropy of the raw bytes, in bits per byte (0..=8)
    pub byte_entropy: f64,
    /// OCR output, speech transcript, or per-frame extracted text
    pub extracted_text: Option<String>,
    /// Embedded metadata fields as (name, value) pairs (EXIF, XMP, ...)
    pub metadata_fields: Vec<(String, String)>,
    /// Measured signal perturbation level (audio)
    pub perturbation: f64,
    /// Whether a suspicious frequency shift was observed (audio)
    pub frequency_shift: bool,
    /// Fraction of frames flagged as anomalous (video)
    pub frame_anomaly_ratio: f64,
}

impl MediaAnalysis {
    /// Analysis seeded from raw bytes: computes byte entropy, leaves the
    /// extraction fields for the caller.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            byte_entropy: byte_entropy(data),
            ..Default::default()
        }
    }
}

/// Shannon entropy over a byte slice, in bits per byte.
pub fn byte_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    let mut entropy = 0.0f64;
    for &c in &counts {
        if c > 0 {
            let p = c as f64 / len;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// A non-text attachment referenced by a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub modality: Modality,
    pub analysis: MediaAnalysis,
}

impl Attachment {
    pub fn new(id: impl Into<String>, modality: Modality, analysis: MediaAnalysis) -> Self {
        Self {
            id: id.into(),
            modality,
            analysis,
        }
    }

    /// Build an attachment from base64-encoded inline bytes, computing the
    /// byte-entropy part of the analysis from the decoded data.
    pub fn from_base64(
        id: impl Into<String>,
        modality: Modality,
        data: &str,
    ) -> Result<Self, base64::DecodeError> {
        let decoded = BASE64.decode(data)?;
        Ok(Self {
            id: id.into(),
            modality,
            analysis: MediaAnalysis::from_bytes(&decoded),
        })
    }
}

/// An inbound request as seen by the pipeline.
///
/// Immutable once constructed; builder-style methods consume and return
/// the value so construction sites stay terse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub id: Uuid,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub metadata: HashMap<String, String>,
}

impl RequestPayload {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            attachments: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Modalities for which this payload actually carries content.
    pub fn available_modalities(&self) -> Vec<Modality> {
        let mut modalities = Vec::with_capacity(1 + self.attachments.len());
        if !self.prompt.is_empty() {
            modalities.push(Modality::Text);
        }
        for a in &self.attachments {
            if !modalities.contains(&a.modality) {
                modalities.push(a.modality);
            }
        }
        modalities
    }

    /// Attachments of the given modality.
    pub fn attachments_of(&self, modality: Modality) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(move |a| a.modality == modality)
    }
}

/// Kind of action recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Findings were observed but the payload was left untouched
    Observed,
    /// A warning banner was injected into the prompt
    Warned,
    /// A span of the prompt was replaced with a placeholder
    Redacted,
    /// An attachment was removed from the payload
    Removed,
    /// The request or response was blocked by policy
    Blocked,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Observed => "observed",
            AuditKind::Warned => "warned",
            AuditKind::Redacted => "redacted",
            AuditKind::Removed => "removed",
            AuditKind::Blocked => "blocked",
        }
    }
}

/// One entry in the audit trail.
///
/// Entries carry no wall-clock timestamp: mitigation is a pure function and
/// must produce byte-identical output for identical input. Ordering is the
/// sequence number, assigned at append time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u32,
    pub kind: AuditKind,
    pub detail: String,
}

/// Append-only, total-ordered record of actions taken on a payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, assigning the next sequence number.
    pub fn push(&mut self, kind: AuditKind, detail: impl Into<String>) {
        let seq = self.entries.len() as u32;
        self.entries.push(AuditEntry {
            seq,
            kind,
            detail: detail.into(),
        });
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry of the given kind was recorded.
    pub fn contains(&self, kind: AuditKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }
}

/// A payload after mitigation, paired with the audit trail of what was done
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedPayload {
    /// Id of the request payload this was derived from
    pub source_id: Uuid,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub metadata: HashMap<String, String>,
    pub audit: AuditTrail,
}

impl SanitizedPayload {
    /// An untouched copy of the original payload with an empty trail.
    pub fn passthrough(payload: &RequestPayload) -> Self {
        Self {
            source_id: payload.id,
            prompt: payload.prompt.clone(),
            attachments: payload.attachments.clone(),
            metadata: payload.metadata.clone(),
            audit: AuditTrail::new(),
        }
    }
}
