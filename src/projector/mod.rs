//! Turns a raw verification result into what the user sees

pub mod transcript;

use serde::Serialize;
use tracing::warn;

use crate::client::{DocumentAddress, VerificationResult};

pub use transcript::audit_transcript;

/// Display-ready view of a finished check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckView {
    pub passed: bool,
    pub answer: String,
    pub document_type: Option<String>,
    pub document_date: Option<String>,
    pub company_name: Option<String>,
    pub street: Option<String>,
    pub address_summary: Option<String>,
    /// One line per alert, `key: message`
    pub warnings: Vec<String>,
    pub follow_up: Option<String>,
    pub recommendation: Option<String>,
    pub document_url: Option<String>,
    pub case_id: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl CheckView {
    /// Plain-text result panel
    pub fn render(&self) -> String {
        let mut out = Vec::new();

        out.push(format!(
            "Result: {}",
            if self.passed { "PASSED" } else { "FAILED" }
        ));
        if !self.answer.is_empty() {
            out.push(self.answer.clone());
        }
        if let Some(elapsed) = self.elapsed_seconds {
            out.push(format!("Processed in {:.2}s", elapsed));
        }

        let fields = [
            ("Company", &self.company_name),
            ("Document type", &self.document_type),
            ("Document date", &self.document_date),
        ];
        for (label, value) in fields {
            if let Some(v) = value {
                out.push(format!("{}: {}", label, v));
            }
        }

        if self.street.is_some() || self.address_summary.is_some() {
            out.push("Address:".to_string());
            for line in self
                .street
                .iter()
                .chain(self.address_summary.iter())
                .flat_map(|s| s.lines())
            {
                out.push(format!("  {}", line));
            }
        }

        if !self.warnings.is_empty() {
            out.push("Warnings:".to_string());
            for w in &self.warnings {
                out.push(format!("  - {}", w));
            }
        }

        if let Some(follow_up) = &self.follow_up {
            out.push(format!("Follow-up: {}", follow_up));
        }
        if let Some(recommendation) = &self.recommendation {
            out.push(format!("Recommendation: {}", recommendation));
        }
        if let Some(url) = &self.document_url {
            out.push(format!("View document: {}", url));
        }

        out.join("\n")
    }
}

pub struct ResponseProjector {
    proxy_endpoint: String,
}

impl ResponseProjector {
    /// `proxy_endpoint` is the full `.../getDocument` URL
    pub fn new(proxy_endpoint: impl Into<String>) -> Self {
        Self {
            proxy_endpoint: proxy_endpoint.into(),
        }
    }

    /// The viewer link needs both the stored document URL and a case id
    pub fn project(&self, result: &VerificationResult, elapsed_seconds: Option<f64>) -> CheckView {
        let address = result.payload.document_address.as_ref();
        let case_id = result.case_id();

        let document_url = match (result.document_url(), case_id.as_deref()) {
            (Some(url), Some(case_id)) => Some(self.viewer_url(case_id, url)),
            (Some(_), None) => {
                warn!("Response has a document URL but no command_instance_id; no viewer link");
                None
            }
            (None, _) => None,
        };

        CheckView {
            passed: result.passed,
            answer: result.answer.clone(),
            document_type: non_empty(&result.payload.document_type),
            document_date: non_empty(&result.payload.document_date),
            company_name: non_empty(&result.payload.company_name),
            street: address.and_then(|a| non_empty(&a.street)),
            address_summary: address.and_then(address_summary),
            warnings: warning_lines(result),
            follow_up: non_empty(&result.follow_up),
            recommendation: non_empty(&result.recommendation),
            document_url,
            case_id,
            elapsed_seconds,
            created_at: result.created_at(),
            updated_at: result.updated_at(),
        }
    }

    /// Route a document URL through the proxy. The original URL travels
    /// intact, query string included.
    pub fn viewer_url(&self, case_id: &str, original_url: &str) -> String {
        format!(
            "{}?case_id={}&expired_url={}",
            self.proxy_endpoint,
            urlencoding::encode(case_id),
            urlencoding::encode(original_url)
        )
    }
}

/// City, state and postal code joined by ", ", country code on its own line
pub fn address_summary(address: &DocumentAddress) -> Option<String> {
    let locality = [&address.city, &address.state, &address.postal_code]
        .into_iter()
        .filter_map(|f| non_empty(f))
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = Vec::new();
    if !locality.is_empty() {
        lines.push(locality);
    }
    if let Some(country) = non_empty(&address.country_code) {
        lines.push(country);
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn warning_lines(result: &VerificationResult) -> Vec<String> {
    result
        .alerts
        .iter()
        .flatten()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("{}: {}", key, s),
            other => format!("{}: {}", key, other),
        })
        .collect()
}

fn non_empty(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
