use serde::Serialize;
use std::fmt;

use crate::config::{AppConfig, CheckConfiguration};
use crate::document::Document;
use crate::error::{CheckError, Result};

/// Where a flash check goes and the fixed identifiers it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckTarget {
    pub endpoint: String,
    pub agent_key: String,
    pub check_id: String,
    pub source_type: String,
}

impl CheckTarget {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.check_endpoint(),
            agent_key: config.agent_key.clone(),
            check_id: config.check_id.clone(),
            source_type: config.source_type.clone(),
        }
    }
}

/// Everything needed to run one flash check
#[derive(Clone)]
pub struct VerificationRequest {
    pub target: CheckTarget,
    pub credential: String,
    pub document: Document,
    pub configuration: CheckConfiguration,
}

impl VerificationRequest {
    /// Local guard: a request with no credential or no accepted types is never sent
    pub fn validate(&self) -> Result<()> {
        if self.credential.trim().is_empty() {
            return Err(CheckError::configuration("an API key is required"));
        }
        if self.configuration.accepted_types().is_empty() {
            return Err(CheckError::configuration(
                "at least one accepted document type is required",
            ));
        }
        Ok(())
    }

    /// Request body with the given document payload in place of the real one
    pub fn body_with_payload<'a>(&'a self, b64_document: &'a str) -> FlashCheckBody<'a> {
        FlashCheckBody {
            agent_key: &self.target.agent_key,
            check_id: &self.target.check_id,
            check_args: CheckArgs {
                validity_period: self.configuration.validity_period().days(),
                accepted_documents: self.configuration.accepted_tags(),
            },
            kyb_schema: KybSchema {
                self_attested_data: SelfAttestedData {
                    proof_of_address_documents: vec![ProofOfAddressDocument {
                        b64_document,
                        file_name: self.document.file_name(),
                        source_type: &self.target.source_type,
                    }],
                },
            },
        }
    }

    pub fn body(&self) -> FlashCheckBody<'_> {
        self.body_with_payload(self.document.payload())
    }
}

impl fmt::Debug for VerificationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationRequest")
            .field("target", &self.target)
            .field("credential", &"<redacted>")
            .field("document", &self.document)
            .field("configuration", &self.configuration)
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct FlashCheckBody<'a> {
    pub agent_key: &'a str,
    pub check_id: &'a str,
    pub check_args: CheckArgs,
    pub kyb_schema: KybSchema<'a>,
}

#[derive(Debug, Serialize)]
pub struct CheckArgs {
    pub validity_period: u32,
    pub accepted_documents: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct KybSchema<'a> {
    pub self_attested_data: SelfAttestedData<'a>,
}

#[derive(Debug, Serialize)]
pub struct SelfAttestedData<'a> {
    pub proof_of_address_documents: Vec<ProofOfAddressDocument<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ProofOfAddressDocument<'a> {
    pub b64_document: &'a str,
    pub file_name: &'a str,
    pub source_type: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocumentType, ValidityPeriod};
    use crate::document::{DocumentEncoder, SourceFile};

    async fn request(credential: &str, validity: ValidityPeriod) -> VerificationRequest {
        let document = DocumentEncoder::encode(SourceFile::new(
            "bill.pdf",
            None,
            b"%PDF-1.7".to_vec(),
        ))
        .await
        .unwrap();
        VerificationRequest {
            target: CheckTarget::from_config(&AppConfig::default()),
            credential: credential.to_string(),
            document,
            configuration: CheckConfiguration::new(
                [DocumentType::UtilityBill, DocumentType::BankStatement],
                validity,
            )
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_empty_credential_is_rejected() {
        let req = request("   ", ValidityPeriod::OneYear).await;
        assert!(matches!(
            req.validate(),
            Err(CheckError::Configuration { .. })
        ));
        assert!(request("key", ValidityPeriod::OneYear).await.validate().is_ok());
    }

    #[tokio::test]
    async fn test_body_shape() {
        for validity in ValidityPeriod::ALL {
            let req = request("key", validity).await;
            let body = serde_json::to_value(req.body()).unwrap();

            assert_eq!(body["agent_key"], "kyb-agent");
            assert_eq!(body["check_id"], "proof_of_address");
            assert_eq!(body["check_args"]["validity_period"], validity.days());
            assert_eq!(
                body["check_args"]["accepted_documents"],
                serde_json::json!(["bank_statement", "utility_bill"])
            );

            let doc = &body["kyb_schema"]["self_attested_data"]["proof_of_address_documents"][0];
            assert_eq!(doc["b64_document"], req.document.payload());
            assert_eq!(doc["file_name"], "bill.pdf");
            assert_eq!(doc["source_type"], "file_upload");
        }
    }

    #[tokio::test]
    async fn test_debug_redacts_credential() {
        let req = request("super-secret", ValidityPeriod::OneYear).await;
        assert!(!format!("{:?}", req).contains("super-secret"));
    }
}
