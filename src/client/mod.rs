//! Verification service client
//!
//! One request, one response: no retries. Callers decide what a failure means.

mod http;
pub mod request;
pub mod response;

use async_trait::async_trait;
use std::sync::Arc;

pub use http::HttpVerificationClient;
pub use request::{CheckTarget, VerificationRequest};
pub use response::{DocumentAddress, VerificationResult};

use crate::error::Result;

#[async_trait]
pub trait VerificationClient: Send + Sync {
    /// Run a single flash check round trip
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationResult>;
}

/// Shared verification client type
pub type SharedVerificationClient = Arc<dyn VerificationClient>;
