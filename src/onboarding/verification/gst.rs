//! GST verification: input rules, state codes and form merges.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::backend::GstValidation;
use crate::onboarding::model::FormRecord;

static GSTIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").unwrap()
});

/// GST state codes (first two digits of a GSTIN).
const STATE_CODES: &[(&str, &str)] = &[
    ("01", "Jammu and Kashmir"),
    ("02", "Himachal Pradesh"),
    ("03", "Punjab"),
    ("04", "Chandigarh"),
    ("05", "Uttarakhand"),
    ("06", "Haryana"),
    ("07", "Delhi"),
    ("08", "Rajasthan"),
    ("09", "Uttar Pradesh"),
    ("10", "Bihar"),
    ("11", "Sikkim"),
    ("12", "Arunachal Pradesh"),
    ("13", "Nagaland"),
    ("14", "Manipur"),
    ("15", "Mizoram"),
    ("16", "Tripura"),
    ("17", "Meghalaya"),
    ("18", "Assam"),
    ("19", "West Bengal"),
    ("20", "Jharkhand"),
    ("21", "Odisha"),
    ("22", "Chhattisgarh"),
    ("23", "Madhya Pradesh"),
    ("24", "Gujarat"),
    ("25", "Daman and Diu"),
    ("26", "Dadra and Nagar Haveli and Daman and Diu"),
    ("27", "Maharashtra"),
    ("28", "Andhra Pradesh"),
    ("29", "Karnataka"),
    ("30", "Goa"),
    ("31", "Lakshadweep"),
    ("32", "Kerala"),
    ("33", "Tamil Nadu"),
    ("34", "Puducherry"),
    ("35", "Andaman and Nicobar Islands"),
    ("36", "Telangana"),
    ("37", "Andhra Pradesh"),
    ("38", "Ladakh"),
    ("97", "Other Territory"),
];

/// Registry details of a verified GSTIN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GstDetails {
    pub gst_number: String,
    pub trade_name: String,
    pub legal_name: String,
}

pub fn normalize(gst_number: &str) -> String {
    gst_number.trim().to_ascii_uppercase()
}

pub fn is_valid_format(gst_number: &str) -> bool {
    GSTIN_PATTERN.is_match(gst_number)
}

/// The GSTIN to verify, if the record holds a well-formed one.
pub fn input(record: &FormRecord) -> Option<String> {
    let gst = normalize(&record.gst_number);
    is_valid_format(&gst).then_some(gst)
}

/// State name for a two-digit GST state code.
pub fn state_name(code: &str) -> Option<&'static str> {
    STATE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Accept or reject a registry response. A GSTIN with no registered name
/// is treated as unknown.
pub fn evaluate(gst_number: &str, response: &GstValidation) -> Result<GstDetails, String> {
    let trade_name = response.trade_name.trim();
    let legal_name = response.legal_name.trim();
    if trade_name.is_empty() && legal_name.is_empty() {
        return Err("GST number could not be verified".to_string());
    }
    Ok(GstDetails {
        gst_number: gst_number.to_string(),
        trade_name: if trade_name.is_empty() {
            legal_name.to_string()
        } else {
            trade_name.to_string()
        },
        legal_name: legal_name.to_string(),
    })
}

fn fill_if_empty(field: &mut String, value: &str) {
    if field.trim().is_empty() && !value.trim().is_empty() {
        *field = value.trim().to_string();
    }
}

/// Apply registry data. Company fields the user already typed are kept.
pub fn merge_verified(record: &mut FormRecord, details: &GstDetails, response: &GstValidation) {
    let address = &response.address;

    record.trade_name = details.trade_name.clone();
    fill_if_empty(&mut record.company_name, &details.trade_name);
    fill_if_empty(&mut record.address, &address.full);

    let city = if address.city.trim().is_empty() {
        &address.district
    } else {
        &address.city
    };
    fill_if_empty(&mut record.city, city);

    let code = if address.state_code.trim().is_empty() {
        details.gst_number.get(..2).unwrap_or_default()
    } else {
        address.state_code.trim()
    };
    fill_if_empty(&mut record.state, state_name(code).unwrap_or(code));
    fill_if_empty(&mut record.pincode, &address.pincode);

    record.gst_document = None;
    record.is_gst_verified = true;
    record.gst_document_required = false;
}

pub fn merge_failed(record: &mut FormRecord) {
    record.is_gst_verified = false;
    record.gst_document_required = true;
}

/// The GSTIN changed after the flow resolved.
pub fn merge_reset(record: &mut FormRecord) {
    record.trade_name.clear();
    record.is_gst_verified = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GstAddress;
    use crate::onboarding::model::FileRef;

    fn acme() -> GstValidation {
        GstValidation {
            trade_name: "Acme Traders".into(),
            legal_name: "Acme Traders Private Limited".into(),
            address: GstAddress {
                full: "12 MG Road, Bengaluru".into(),
                city: String::new(),
                district: "Bengaluru Urban".into(),
                state_code: "29".into(),
                pincode: "560001".into(),
            },
        }
    }

    #[test]
    fn format_rules() {
        assert!(is_valid_format("29ABCDE1234F1Z5"));
        assert!(!is_valid_format("29ABCDE1234F0Z5"));
        assert!(!is_valid_format("29ABCDE1234F1Y5"));
        assert!(!is_valid_format("2ABCDE1234F1Z5"));
        assert_eq!(normalize(" 29abcde1234f1z5"), "29ABCDE1234F1Z5");
    }

    #[test]
    fn state_lookup() {
        assert_eq!(state_name("29"), Some("Karnataka"));
        assert_eq!(state_name("27"), Some("Maharashtra"));
        assert_eq!(state_name("99"), None);
    }

    #[test]
    fn fills_empty_company_fields() {
        let mut record = FormRecord {
            gst_number: "29ABCDE1234F1Z5".into(),
            gst_document: Some(FileRef::new("gst.pdf", "application/pdf", 10)),
            gst_document_required: true,
            ..Default::default()
        };
        let response = acme();
        let details = evaluate("29ABCDE1234F1Z5", &response).unwrap();
        merge_verified(&mut record, &details, &response);

        assert_eq!(record.trade_name, "Acme Traders");
        assert_eq!(record.company_name, "Acme Traders");
        assert_eq!(record.address, "12 MG Road, Bengaluru");
        assert_eq!(record.city, "Bengaluru Urban");
        assert_eq!(record.state, "Karnataka");
        assert_eq!(record.pincode, "560001");
        assert!(record.gst_document.is_none());
        assert!(record.is_gst_verified);
        assert!(!record.requires_gst_document());
    }

    #[test]
    fn never_overwrites_user_input() {
        let mut record = FormRecord {
            company_name: "My Co".into(),
            city: "Mysuru".into(),
            ..Default::default()
        };
        let response = acme();
        let details = evaluate("29ABCDE1234F1Z5", &response).unwrap();
        merge_verified(&mut record, &details, &response);

        assert_eq!(record.company_name, "My Co");
        assert_eq!(record.city, "Mysuru");
        assert_eq!(record.trade_name, "Acme Traders");
    }

    #[test]
    fn falls_back_to_legal_name_and_gstin_state() {
        let response = GstValidation {
            trade_name: " ".into(),
            legal_name: "Acme Pvt Ltd".into(),
            address: GstAddress {
                city: "Pune".into(),
                ..Default::default()
            },
        };
        let details = evaluate("27ABCDE1234F1Z5", &response).unwrap();
        assert_eq!(details.trade_name, "Acme Pvt Ltd");

        let mut record = FormRecord::default();
        merge_verified(&mut record, &details, &response);
        assert_eq!(record.company_name, "Acme Pvt Ltd");
        assert_eq!(record.city, "Pune");
        assert_eq!(record.state, "Maharashtra");
    }

    #[test]
    fn unknown_state_code_is_kept_raw() {
        let mut response = acme();
        response.address.state_code = "99".into();
        let details = evaluate("29ABCDE1234F1Z5", &response).unwrap();
        let mut record = FormRecord::default();
        merge_verified(&mut record, &details, &response);
        assert_eq!(record.state, "99");
    }

    #[test]
    fn nameless_response_is_a_failure() {
        assert!(evaluate("29ABCDE1234F1Z5", &GstValidation::default()).is_err());
    }

    #[test]
    fn failure_and_reset() {
        let mut record = FormRecord {
            trade_name: "Acme".into(),
            is_gst_verified: true,
            ..Default::default()
        };
        merge_reset(&mut record);
        assert!(record.trade_name.is_empty());
        assert!(!record.is_gst_verified);

        merge_failed(&mut record);
        assert!(record.requires_gst_document());
    }
}
