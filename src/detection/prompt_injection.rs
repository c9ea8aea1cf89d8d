//! Prompt injection detection.
//!
//! Detects attempts to override system prompts or inject malicious
//! instructions, combining a phrase bank with a structural heuristic
//! (an imperative clause opening the untrusted segment). Confidence
//! scales with the number of independent matched signals.

use crate::detection::Detector;
use crate::error::DetectorError;
use crate::finding::{Evidence, Severity, ThreatFinding, ThreatType};
use crate::payload::{Modality, RequestPayload};
use crate::DetectorConfig;
use regex::{Regex, RegexSet};

/// Patterns that indicate prompt injection attempts
const INJECTION_PATTERNS: &[&str] = &[
    // Direct instruction override
    r"(?i)ignore\s+(all\s+)?previous\s+instructions?",
    r"(?i)ignore\s+(all\s+)?prior\s+instructions?",
    r"(?i)disregard\s+(all\s+)?previous",
    r"(?i)forget\s+(all\s+)?(your\s+)?instructions?",
    r"(?i)override\s+(your\s+)?instructions?",
    // New instruction injection
    r"(?i)new\s+instructions?:",
    r"(?i)updated\s+instructions?:",
    r"(?i)system\s+prompt:",
    r"(?i)\[system\]",
    r"(?i)<system>",
    // Role manipulation
    r"(?i)you\s+are\s+now\s+a",
    r"(?i)act\s+as\s+if\s+you",
    r"(?i)pretend\s+(to\s+be|you\s+are)",
    r"(?i)roleplay\s+as",
    r"(?i)simulate\s+being",
    // Prompt extraction
    r"(?i)reveal\s+(your\s+)?system\s+prompt",
    r"(?i)show\s+(me\s+)?(your\s+)?instructions",
    r"(?i)what\s+(are|is)\s+(your\s+)?system\s+prompt",
    r"(?i)print\s+(your\s+)?initial\s+prompt",
    // Context manipulation
    r"(?i)end\s+of\s+system\s+prompt",
    r"(?i)</?(system|instructions?)>",
    r"(?i)\[/?INST\]",
    r"(?i)<<SYS>>",
];

/// Imperative verbs that, opening the prompt, suggest an instruction
/// aimed at the model rather than content for it
const IMPERATIVE_OPENERS: &[&str] = &[
    "ignore",
    "disregard",
    "forget",
    "override",
    "pretend",
    "act",
    "reveal",
    "print",
    "execute",
    "obey",
    "repeat",
    "bypass",
];

/// Confidence for a single matched signal; each further independent
/// signal adds [`CONFIDENCE_STEP`], capped at 0.99.
const BASE_CONFIDENCE: f64 = 0.55;
const CONFIDENCE_STEP: f64 = 0.15;

/// Detector for prompt injection attempts
pub struct PromptInjectionDetector {
    pattern_set: RegexSet,
    patterns: Vec<Regex>,
}

impl Default for PromptInjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptInjectionDetector {
    /// Create a new prompt injection detector
    pub fn new() -> Self {
        let pattern_set =
            RegexSet::new(INJECTION_PATTERNS).expect("Failed to compile injection patterns");
        let patterns = INJECTION_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("Failed to compile injection pattern"))
            .collect();
        Self {
            pattern_set,
            patterns,
        }
    }

    /// Whether the text opens with a bare imperative aimed at the model.
    fn opens_with_imperative(text: &str) -> bool {
        let first_word = text
            .trim_start()
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or("");
        IMPERATIVE_OPENERS
            .iter()
            .any(|v| first_word.eq_ignore_ascii_case(v))
    }

    /// Earliest phrase-bank match in the text, as byte offsets.
    fn first_match_span(&self, text: &str, matched: &[usize]) -> Option<(usize, usize)> {
        matched
            .iter()
            .filter_map(|&i| self.patterns[i].find(text))
            .map(|m| (m.start(), m.end()))
            .min()
    }
}

impl Detector for PromptInjectionDetector {
    fn name(&self) -> &'static str {
        "prompt_injection"
    }

    fn modalities(&self) -> &'static [Modality] {
        &[Modality::Text]
    }

    fn detect(
        &self,
        payload: &RequestPayload,
        _config: &DetectorConfig,
    ) -> Result<Vec<ThreatFinding>, DetectorError> {
        let text = payload.prompt.as_str();
        let matched: Vec<usize> = self.pattern_set.matches(text).into_iter().collect();
        let structural = Self::opens_with_imperative(text);

        let signals = matched.len() + usize::from(structural);
        if signals == 0 {
            return Ok(Vec::new());
        }

        // One signal is suspicious; two independent signals are decisive
        let severity = if signals >= 2 {
            Severity::Critical
        } else {
            Severity::High
        };
        let confidence = BASE_CONFIDENCE + CONFIDENCE_STEP * (signals as f64 - 1.0);

        let evidence = match self.first_match_span(text, &matched) {
            Some((start, end)) => Evidence::span(start, end),
            // Structural signal only: the opening clause is the evidence
            None => Evidence::span(0, text.len().min(64)),
        };

        let mut detail = format!("{} injection signal(s)", signals);
        if structural {
            detail.push_str(", imperative opener");
        }

        Ok(vec![ThreatFinding::new(
            ThreatType::PromptInjection,
            Modality::Text,
            confidence.min(0.99),
            severity,
            evidence,
            self.name(),
        )
        .with_detail(detail)])
    }
}
