//! PAN verification: input rules, outcome evaluation and form merges.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::backend::{PanStatus, PanValidation};
use crate::onboarding::model::FormRecord;

static PAN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").unwrap());

/// Shortest director name worth sending to the registry.
pub const MIN_NAME_LEN: usize = 3;

/// A PAN the registry accepted for the given director.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanMatch {
    pub pan: String,
    pub registered_name: String,
    /// Absent when restored from a saved session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Trim and upper-case PAN input.
pub fn normalize(pan: &str) -> String {
    pan.trim().to_ascii_uppercase()
}

pub fn is_valid_format(pan: &str) -> bool {
    PAN_PATTERN.is_match(pan)
}

/// The `(pan, name)` pair to verify, if the record has both in usable shape.
pub fn inputs(record: &FormRecord) -> Option<(String, String)> {
    let pan = normalize(&record.pan_number);
    let name = record.director_name.trim();
    if is_valid_format(&pan) && name.chars().count() >= MIN_NAME_LEN {
        Some((pan, name.to_string()))
    } else {
        None
    }
}

/// Decide the outcome of a registry response.
///
/// Verified only when the registry says `valid` and the name match score
/// reaches `threshold` (inclusive).
pub fn evaluate(pan: &str, response: &PanValidation, threshold: u8) -> Result<PanMatch, String> {
    if response.status != PanStatus::Valid {
        return Err("PAN could not be verified".to_string());
    }
    if response.name_match_score < f64::from(threshold) {
        return Err(format!(
            "Director name does not match PAN records (score {})",
            response.name_match_score
        ));
    }
    Ok(PanMatch {
        pan: pan.to_string(),
        registered_name: response.matched_name.trim().to_string(),
        score: Some(response.name_match_score),
    })
}

/// Verified identity overwrites whatever name the user typed.
pub fn merge_verified(record: &mut FormRecord, matched: &PanMatch) {
    if !matched.registered_name.is_empty() {
        record.director_name = matched.registered_name.clone();
    }
    record.pan_number = matched.pan.clone();
    record.is_pan_verified = true;
    record.pan_document_required = false;
}

pub fn merge_failed(record: &mut FormRecord) {
    record.is_pan_verified = false;
    record.pan_document_required = true;
}

/// A source field changed after the flow resolved.
///
/// The document requirement from an earlier failure stays until a later
/// check succeeds.
pub fn merge_reset(record: &mut FormRecord) {
    record.is_pan_verified = false;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: PanStatus, score: f64) -> PanValidation {
        PanValidation {
            status,
            matched_name: "RAVI KUMAR".into(),
            name_match_score: score,
        }
    }

    #[test]
    fn format_rules() {
        assert!(is_valid_format("ABCDE1234F"));
        assert!(!is_valid_format("abcde1234f"));
        assert!(!is_valid_format("ABCD1234F"));
        assert!(!is_valid_format("ABCDE12345"));
        assert_eq!(normalize(" abcde1234f "), "ABCDE1234F");
    }

    #[test]
    fn inputs_need_pan_and_name() {
        let mut record = FormRecord {
            pan_number: "abcde1234f".into(),
            director_name: "Ra".into(),
            ..Default::default()
        };
        assert!(inputs(&record).is_none());

        record.director_name = " Ravi ".into();
        assert_eq!(
            inputs(&record),
            Some(("ABCDE1234F".to_string(), "Ravi".to_string()))
        );

        record.pan_number = "ABCDE1234".into();
        assert!(inputs(&record).is_none());
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(evaluate("ABCDE1234F", &response(PanStatus::Valid, 79.0), 80).is_err());
        let ok = evaluate("ABCDE1234F", &response(PanStatus::Valid, 80.0), 80).unwrap();
        assert_eq!(ok.registered_name, "RAVI KUMAR");
        assert!(evaluate("ABCDE1234F", &response(PanStatus::Valid, 79.5), 80).is_err());
    }

    #[test]
    fn invalid_status_fails_regardless_of_score() {
        assert!(evaluate("ABCDE1234F", &response(PanStatus::Invalid, 100.0), 80).is_err());
        assert!(evaluate("ABCDE1234F", &response(PanStatus::Unknown, 100.0), 80).is_err());
    }

    #[test]
    fn merges_toggle_document_requirement() {
        let mut record = FormRecord {
            director_name: "Ravi K".into(),
            ..Default::default()
        };
        merge_failed(&mut record);
        assert!(record.requires_pan_document());

        let matched = evaluate("ABCDE1234F", &response(PanStatus::Valid, 95.0), 80).unwrap();
        merge_verified(&mut record, &matched);
        assert_eq!(record.director_name, "RAVI KUMAR");
        assert!(record.is_pan_verified);
        assert!(!record.pan_document_required);

        merge_reset(&mut record);
        assert!(!record.is_pan_verified);
        assert!(!record.requires_pan_document());
    }

    #[test]
    fn reset_keeps_an_earlier_failure_binding() {
        let mut record = FormRecord::default();
        merge_failed(&mut record);
        merge_reset(&mut record);
        assert!(record.requires_pan_document());
    }
}
