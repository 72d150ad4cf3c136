use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Loosely-typed map for the open-ended response sections
pub type OpaqueMap = BTreeMap<String, Value>;

/// Flash check response as returned by the verification service.
///
/// Only `passed` is required; everything else defaults so that minor upstream
/// additions or omissions don't fail the whole check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub answer: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: ExtractedPayload,

    #[serde(default)]
    pub alerts: Option<OpaqueMap>,

    #[serde(default)]
    pub follow_up: Option<String>,

    #[serde(default)]
    pub recommendation: Option<String>,

    #[serde(default)]
    pub evidence: Option<OpaqueMap>,

    #[serde(default)]
    pub verification_data: Option<OpaqueMap>,

    #[serde(default)]
    pub input_data: Option<InputData>,

    /// String or number, depending on the service version
    #[serde(default)]
    pub command_instance_id: Option<Value>,

    #[serde(default)]
    pub created_at: Option<Value>,

    #[serde(default)]
    pub updated_at: Option<Value>,

    /// Identifiers and timestamps we only pass through for display
    #[serde(flatten)]
    pub extra: OpaqueMap,
}

impl VerificationResult {
    /// Source URL of the document as stored by the service
    pub fn document_url(&self) -> Option<&str> {
        self.input_data
            .as_ref()
            .and_then(|d| d.document.as_ref())
            .and_then(|d| d.url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Case identifier used to look the document up through the proxy
    pub fn case_id(&self) -> Option<String> {
        display_value(self.command_instance_id.as_ref())
    }

    pub fn created_at(&self) -> Option<String> {
        display_value(self.created_at.as_ref())
    }

    pub fn updated_at(&self) -> Option<String> {
        display_value(self.updated_at.as_ref())
    }
}

/// Pass-through scalar rendered for display; strings lose their quotes
fn display_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `null` is treated like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPayload {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub document_date: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub document_address: Option<DocumentAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentAddress {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    #[serde(default)]
    pub document: Option<InputDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDocument {
    #[serde(default)]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let json = r#"{
            "passed": true,
            "answer": "Document is a recent utility bill",
            "payload": {
                "document_type": "utility_bill",
                "document_date": "2024-05-01",
                "company_name": "Acme Ltd",
                "document_address": {
                    "street": "1 High St",
                    "city": "London",
                    "postal_code": "E1 6AN",
                    "country_code": "GB"
                }
            },
            "alerts": null,
            "follow_up": "None required",
            "input_data": {"document": {"url": "https://x/doc.pdf?token=abc"}},
            "command_instance_id": "case-1",
            "created_at": "2024-05-02T10:00:00Z",
            "check_instance_id": "chk-9"
        }"#;

        let result: VerificationResult = serde_json::from_str(json).unwrap();
        assert!(result.passed);
        assert_eq!(result.payload.company_name.as_deref(), Some("Acme Ltd"));
        assert!(result.alerts.is_none());
        assert_eq!(result.document_url(), Some("https://x/doc.pdf?token=abc"));
        assert_eq!(result.case_id().as_deref(), Some("case-1"));
        assert_eq!(result.created_at().as_deref(), Some("2024-05-02T10:00:00Z"));
        assert_eq!(result.extra["check_instance_id"], "chk-9");
    }

    #[test]
    fn test_missing_verdict_is_unrecognized() {
        let json = r#"{"answer": "ok"}"#;
        assert!(serde_json::from_str::<VerificationResult>(json).is_err());
    }

    #[test]
    fn test_alerts_accept_arbitrary_values() {
        let json = r#"{"passed": false, "alerts": {"date": "too old", "score": 0.2}}"#;
        let result: VerificationResult = serde_json::from_str(json).unwrap();
        assert!(result.document_url().is_none());
        let alerts = result.alerts.unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts["score"], serde_json::json!(0.2));
    }

    #[test]
    fn test_null_answer_and_payload_default() {
        let json = r#"{"passed": true, "answer": null, "payload": null}"#;
        let result: VerificationResult = serde_json::from_str(json).unwrap();
        assert!(result.passed);
        assert_eq!(result.answer, "");
        assert_eq!(result.payload, ExtractedPayload::default());
    }

    #[test]
    fn test_numeric_identifiers_pass_through() {
        let json = r#"{
            "passed": false,
            "command_instance_id": 12345,
            "created_at": 1714640000,
            "updated_at": null
        }"#;
        let result: VerificationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.case_id().as_deref(), Some("12345"));
        assert_eq!(result.created_at().as_deref(), Some("1714640000"));
        assert!(result.updated_at().is_none());
    }
}
