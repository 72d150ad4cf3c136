//! reqwest-backed verification client

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error, info};

use super::request::VerificationRequest;
use super::response::VerificationResult;
use super::VerificationClient;
use crate::error::{CheckError, Result};

#[derive(Clone)]
pub struct HttpVerificationClient {
    http_client: reqwest::Client,
}

impl HttpVerificationClient {
    /// Build a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckError::Internal {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl VerificationClient for HttpVerificationClient {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationResult> {
        request.validate()?;

        info!(
            "Submitting '{}' to {}",
            request.document.file_name(),
            request.target.endpoint
        );

        let response = self
            .http_client
            .post(&request.target.endpoint)
            .bearer_auth(&request.credential)
            .json(&request.body())
            .send()
            .await
            .map_err(|e| {
                error!("Flash check request failed: {}", e);
                CheckError::from(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read flash check response: {}", e);
            CheckError::from(e)
        })?;

        if !status.is_success() {
            error!("Flash check returned {}: {}", status, body);
            return Err(classify_status(status, body));
        }

        debug!("Flash check response: {} bytes", body.len());

        serde_json::from_str(&body).map_err(|e| {
            error!("Unrecognized flash check response: {}", e);
            CheckError::transport(format!("unexpected response body: {}", e))
        })
    }
}

fn classify_status(status: StatusCode, body: String) -> CheckError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CheckError::Auth {
            status: status.as_u16(),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => CheckError::Validation {
            status: status.as_u16(),
            message: service_message(&body),
        },
        _ => CheckError::transport(format!("unexpected status {}", status)),
    }
}

/// Pull a readable message out of an error body, falling back to the raw text
fn service_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}
