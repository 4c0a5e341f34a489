//! Onboarding form data model.

use serde::{Deserialize, Serialize};

/// Reference to a file the user uploaded (certificate, PAN card, photo...).
///
/// The upload itself is handled elsewhere; the wizard only tracks that a
/// file is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size_bytes,
            uri: None,
        }
    }
}

/// Everything collected for one onboarding attempt.
///
/// Serialized in camelCase; missing fields fall back to defaults so that
/// snapshots written by older builds still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormRecord {
    // Account verification
    pub email: String,
    pub is_email_verified: bool,
    pub mobile_number: String,

    // e-KYC
    pub gst_number: String,
    pub gst_document: Option<FileRef>,
    pub is_gst_verified: bool,
    /// Set when a GST lookup failed; the certificate upload becomes mandatory.
    pub gst_document_required: bool,
    pub trade_name: String,

    // Company details
    pub company_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,

    // Director details
    pub director_name: String,
    pub pan_number: String,
    pub is_pan_verified: bool,
    /// Set when a PAN check failed; the PAN card upload becomes mandatory.
    pub pan_document_required: bool,
    pub pan_document: Option<FileRef>,
    pub aadhar_number: String,
    pub designation: String,
    pub director_address: String,
    pub photo: Option<FileRef>,
    pub signature: Option<FileRef>,
}

/// A single field write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Email(String),
    IsEmailVerified(bool),
    MobileNumber(String),
    GstNumber(String),
    GstDocument(Option<FileRef>),
    TradeName(String),
    CompanyName(String),
    Address(String),
    City(String),
    State(String),
    Pincode(String),
    DirectorName(String),
    PanNumber(String),
    IsPanVerified(bool),
    PanDocument(Option<FileRef>),
    AadharNumber(String),
    Designation(String),
    DirectorAddress(String),
    Photo(Option<FileRef>),
    Signature(Option<FileRef>),
}

impl FieldValue {
    /// The camelCase wire name of the field.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::IsEmailVerified(_) => "isEmailVerified",
            Self::MobileNumber(_) => "mobileNumber",
            Self::GstNumber(_) => "gstNumber",
            Self::GstDocument(_) => "gstDocument",
            Self::TradeName(_) => "tradeName",
            Self::CompanyName(_) => "companyName",
            Self::Address(_) => "address",
            Self::City(_) => "city",
            Self::State(_) => "state",
            Self::Pincode(_) => "pincode",
            Self::DirectorName(_) => "directorName",
            Self::PanNumber(_) => "panNumber",
            Self::IsPanVerified(_) => "isPanVerified",
            Self::PanDocument(_) => "panDocument",
            Self::AadharNumber(_) => "aadharNumber",
            Self::Designation(_) => "designation",
            Self::DirectorAddress(_) => "directorAddress",
            Self::Photo(_) => "photo",
            Self::Signature(_) => "signature",
        }
    }

    /// Parse a text field write from its wire name, as typed at a prompt.
    ///
    /// Boolean and file fields are not settable this way.
    pub fn parse_text(field: &str, value: &str) -> Option<Self> {
        let v = value.to_string();
        Some(match field {
            "email" => Self::Email(v),
            "mobileNumber" => Self::MobileNumber(v),
            "gstNumber" => Self::GstNumber(v),
            "tradeName" => Self::TradeName(v),
            "companyName" => Self::CompanyName(v),
            "address" => Self::Address(v),
            "city" => Self::City(v),
            "state" => Self::State(v),
            "pincode" => Self::Pincode(v),
            "directorName" => Self::DirectorName(v),
            "panNumber" => Self::PanNumber(v),
            "aadharNumber" => Self::AadharNumber(v),
            "designation" => Self::Designation(v),
            "directorAddress" => Self::DirectorAddress(v),
            _ => return None,
        })
    }
}

impl FormRecord {
    /// Write one field.
    pub fn apply(&mut self, value: FieldValue) {
        match value {
            FieldValue::Email(v) => self.email = v,
            FieldValue::IsEmailVerified(v) => self.is_email_verified = v,
            FieldValue::MobileNumber(v) => self.mobile_number = v,
            FieldValue::GstNumber(v) => self.gst_number = v,
            FieldValue::GstDocument(v) => self.gst_document = v,
            FieldValue::TradeName(v) => self.trade_name = v,
            FieldValue::CompanyName(v) => self.company_name = v,
            FieldValue::Address(v) => self.address = v,
            FieldValue::City(v) => self.city = v,
            FieldValue::State(v) => self.state = v,
            FieldValue::Pincode(v) => self.pincode = v,
            FieldValue::DirectorName(v) => self.director_name = v,
            FieldValue::PanNumber(v) => self.pan_number = v,
            FieldValue::IsPanVerified(v) => self.is_pan_verified = v,
            FieldValue::PanDocument(v) => self.pan_document = v,
            FieldValue::AadharNumber(v) => self.aadhar_number = v,
            FieldValue::Designation(v) => self.designation = v,
            FieldValue::DirectorAddress(v) => self.director_address = v,
            FieldValue::Photo(v) => self.photo = v,
            FieldValue::Signature(v) => self.signature = v,
        }
    }

    /// Apply every field present in `patch`.
    pub fn apply_patch(&mut self, patch: FormPatch) {
        for value in patch.into_values() {
            self.apply(value);
        }
    }

    /// Whether the PAN card upload is currently mandatory.
    pub fn requires_pan_document(&self) -> bool {
        self.pan_document_required && !self.is_pan_verified
    }

    /// Whether the GST certificate upload is currently mandatory.
    pub fn requires_gst_document(&self) -> bool {
        self.gst_document_required && !self.is_gst_verified
    }
}

/// A partial update: only `Some` fields are written.
///
/// Deserializes from the same camelCase shape as [`FormRecord`], which is
/// how the backend reports prior progress on OTP confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gst_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gst_document: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan_document: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aadhar_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub director_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<FileRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<FileRef>,
}

impl FormPatch {
    /// Flatten into individual field writes, in declaration order.
    pub fn into_values(self) -> Vec<FieldValue> {
        let mut values = Vec::new();
        if let Some(v) = self.email {
            values.push(FieldValue::Email(v));
        }
        if let Some(v) = self.mobile_number {
            values.push(FieldValue::MobileNumber(v));
        }
        if let Some(v) = self.gst_number {
            values.push(FieldValue::GstNumber(v));
        }
        if let Some(v) = self.gst_document {
            values.push(FieldValue::GstDocument(Some(v)));
        }
        if let Some(v) = self.trade_name {
            values.push(FieldValue::TradeName(v));
        }
        if let Some(v) = self.company_name {
            values.push(FieldValue::CompanyName(v));
        }
        if let Some(v) = self.address {
            values.push(FieldValue::Address(v));
        }
        if let Some(v) = self.city {
            values.push(FieldValue::City(v));
        }
        if let Some(v) = self.state {
            values.push(FieldValue::State(v));
        }
        if let Some(v) = self.pincode {
            values.push(FieldValue::Pincode(v));
        }
        if let Some(v) = self.director_name {
            values.push(FieldValue::DirectorName(v));
        }
        if let Some(v) = self.pan_number {
            values.push(FieldValue::PanNumber(v));
        }
        if let Some(v) = self.pan_document {
            values.push(FieldValue::PanDocument(Some(v)));
        }
        if let Some(v) = self.aadhar_number {
            values.push(FieldValue::AadharNumber(v));
        }
        if let Some(v) = self.designation {
            values.push(FieldValue::Designation(v));
        }
        if let Some(v) = self.director_address {
            values.push(FieldValue::DirectorAddress(v));
        }
        if let Some(v) = self.photo {
            values.push(FieldValue::Photo(Some(v)));
        }
        if let Some(v) = self.signature {
            values.push(FieldValue::Signature(Some(v)));
        }
        values
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Storage keys used for wizard persistence.
pub mod storage_keys {
    /// Key the session snapshot is stored under.
    pub const SESSION_SNAPSHOT: &str = "kyc_onboarding_session";
}
