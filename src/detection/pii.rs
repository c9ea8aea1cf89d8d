//! PII (Personally Identifiable Information) detection.
//!
//! Per-class format validators: email and SSN are structural patterns,
//! credit cards must additionally pass the Luhn checksum, API keys combine
//! a vendor prefix with a Shannon-entropy threshold over the key body.
//! Phone numbers and public IP addresses are detected as lower-severity
//! classes. Every match becomes its own finding so redaction can insert
//! per-field markers.

use crate::detection::Detector;
use crate::error::DetectorError;
use crate::finding::{Evidence, Severity, ThreatFinding, ThreatType};
use crate::payload::{Modality, RequestPayload};
use crate::DetectorConfig;
use regex::Regex;

/// Fixed per-class severities and confidences
const CLASSES: &[(ThreatType, Severity, f64)] = &[
    (ThreatType::PiiEmail, Severity::Medium, 0.9),
    (ThreatType::PiiSsn, Severity::High, 0.85),
    (ThreatType::PiiPhone, Severity::Medium, 0.7),
    (ThreatType::PiiCreditCard, Severity::High, 0.95),
    (ThreatType::PiiApiKey, Severity::Critical, 0.9),
    (ThreatType::PiiIpAddress, Severity::Low, 0.6),
];

fn class_profile(threat_type: ThreatType) -> (Severity, f64) {
    CLASSES
        .iter()
        .find(|(t, _, _)| *t == threat_type)
        .map(|(_, s, c)| (*s, *c))
        .unwrap_or((Severity::Low, 0.5))
}

/// Detector for personally identifiable information
pub struct PiiDetector {
    email_regex: Regex,
    ssn_regex: Regex,
    phone_regex: Regex,
    credit_card_regex: Regex,
    api_key_regex: Regex,
    ip_regex: Regex,
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PiiDetector {
    /// Create a new PII detector
    pub fn new() -> Self {
        Self {
            email_regex: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")
                .expect("Invalid email regex"),
            ssn_regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("Invalid SSN regex"),
            phone_regex: Regex::new(r"\b(?:\+1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")
                .expect("Invalid phone regex"),
            credit_card_regex: Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b")
                .expect("Invalid credit card regex"),
            api_key_regex: Regex::new(
                r"\b(?:sk-[A-Za-z0-9_-]{16,}|AKIA[0-9A-Z]{16}|ghp_[A-Za-z0-9]{20,}|xox[baprs]-[A-Za-z0-9-]{10,})\b",
            )
            .expect("Invalid API key regex"),
            ip_regex: Regex::new(
                r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
            )
            .expect("Invalid IP regex"),
        }
    }

    fn push(matches: &mut Vec<(ThreatType, usize, usize)>, t: ThreatType, start: usize, end: usize) {
        matches.push((t, start, end));
    }

    fn scan(&self, text: &str, api_key_entropy_threshold: f64) -> Vec<(ThreatType, usize, usize)> {
        let mut matches = Vec::new();

        for m in self.email_regex.find_iter(text) {
            Self::push(&mut matches, ThreatType::PiiEmail, m.start(), m.end());
        }

        for m in self.ssn_regex.find_iter(text) {
            Self::push(&mut matches, ThreatType::PiiSsn, m.start(), m.end());
        }

        for m in self.phone_regex.find_iter(text) {
            Self::push(&mut matches, ThreatType::PiiPhone, m.start(), m.end());
        }

        // Structural match alone is not enough for cards: the Luhn
        // checksum separates account numbers from arbitrary digit runs
        for m in self.credit_card_regex.find_iter(text) {
            if luhn_valid(m.as_str()) {
                Self::push(&mut matches, ThreatType::PiiCreditCard, m.start(), m.end());
            }
        }

        // Vendor prefix narrows the candidates; entropy of the key body
        // separates real credentials from placeholder strings
        for m in self.api_key_regex.find_iter(text) {
            let body = m
                .as_str()
                .split_once(['-', '_'])
                .map(|(_, rest)| rest)
                .unwrap_or(m.as_str());
            if char_entropy(body) >= api_key_entropy_threshold {
                Self::push(&mut matches, ThreatType::PiiApiKey, m.start(), m.end());
            }
        }

        // Skip localhost and common private ranges for less noise
        for m in self.ip_regex.find_iter(text) {
            let ip = m.as_str();
            if !ip.starts_with("127.")
                && !ip.starts_with("10.")
                && !ip.starts_with("192.168.")
                && !ip.starts_with("0.")
            {
                Self::push(&mut matches, ThreatType::PiiIpAddress, m.start(), m.end());
            }
        }

        matches.sort_by_key(|&(_, start, _)| start);
        matches
    }
}

impl Detector for PiiDetector {
    fn name(&self) -> &'static str {
        "pii"
    }

    fn modalities(&self) -> &'static [Modality] {
        &[Modality::Text]
    }

    fn detect(
        &self,
        payload: &RequestPayload,
        config: &DetectorConfig,
    ) -> Result<Vec<ThreatFinding>, DetectorError> {
        let findings = self
            .scan(&payload.prompt, config.api_key_entropy_threshold)
            .into_iter()
            .map(|(threat_type, start, end)| {
                let (severity, confidence) = class_profile(threat_type);
                ThreatFinding::new(
                    threat_type,
                    Modality::Text,
                    confidence,
                    severity,
                    Evidence::span(start, end),
                    self.name(),
                )
                .with_detail(format!("{} at {}..{}", threat_type, start, end))
            })
            .collect();
        Ok(findings)
    }
}

/// Luhn checksum over the digits of a candidate card number.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 12 {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Shannon entropy over the characters of a string, in bits per character.
fn char_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0u32) += 1;
    }
    let len = s.chars().count() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(text: &str) -> Vec<ThreatFinding> {
        PiiDetector::new()
            .detect(&RequestPayload::new(text), &DetectorConfig::default())
            .unwrap()
    }

    #[test]
    fn test_detects_email() {
        let findings = detect("Contact me at john@example.com please");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].threat_type, ThreatType::PiiEmail);
        let Evidence::Span { start, end } = findings[0].evidence else {
            panic!("expected span");
        };
        assert_eq!(
            &"Contact me at john@example.com please"[start..end],
            "john@example.com"
        );
    }

    #[test]
    fn test_detects_ssn() {
        let findings = detect("My SSN is 123-45-6789");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].threat_type, ThreatType::PiiSsn);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_detects_phone() {
        let findings = detect("Call me at 555-123-4567");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].threat_type, ThreatType::PiiPhone);
    }

    #[test]
    fn test_luhn_gates_credit_cards() {
        // 4111 1111 1111 1111 is the classic Luhn-valid test number
        let valid = detect("Card: 4111-1111-1111-1111");
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].threat_type, ThreatType::PiiCreditCard);

        // Same shape, fails the checksum: not an account number
        let invalid = detect("Order: 1234-5678-9012-3456");
        assert!(invalid
            .iter()
            .all(|f| f.threat_type != ThreatType::PiiCreditCard));
    }

    #[test]
    fn test_detects_api_key() {
        let findings = detect("use sk-Ab3dE9fGh2JkLmN0pQrStUvWx here");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].threat_type, ThreatType::PiiApiKey);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_low_entropy_key_candidate_skipped() {
        let findings = detect("token sk-aaaaaaaaaaaaaaaaaaaa is a placeholder");
        assert!(findings
            .iter()
            .all(|f| f.threat_type != ThreatType::PiiApiKey));
    }

    #[test]
    fn test_private_ips_skipped() {
        assert!(detect("server at 192.168.1.1 and 10.0.0.1").is_empty());
        let public = detect("hit 8.8.8.8 directly");
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].threat_type, ThreatType::PiiIpAddress);
    }

    #[test]
    fn test_no_pii() {
        assert!(detect("Hello, how are you today?").is_empty());
    }

    #[test]
    fn test_multiple_matches_sorted_by_position() {
        let findings = detect("Email: john@example.com, SSN: 123-45-6789");
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].threat_type, ThreatType::PiiEmail);
        assert_eq!(findings[1].threat_type, ThreatType::PiiSsn);
    }

    #[test]
    fn test_luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("4111-1111-1111-1111"));
        assert!(!luhn_valid("1234567890123456"));
        assert!(!luhn_valid("411"));
    }
}
