//! Copy-pasteable reproduction of a flash check request

use crate::client::VerificationRequest;

pub const CREDENTIAL_PLACEHOLDER: &str = "<YOUR_API_KEY>";

/// Render `request` as a curl command.
///
/// The credential is always replaced by [`CREDENTIAL_PLACEHOLDER`] and the
/// document payload by a marker naming the file, so the output is safe to share.
pub fn audit_transcript(request: &VerificationRequest) -> String {
    let payload_marker = format!("<BASE64_OF:{}>", request.document.file_name());
    let body = request.body_with_payload(&payload_marker);
    // Serializing borrowed strings and integers can't fail
    let body_json = serde_json::to_string_pretty(&body).unwrap_or_default();

    format!(
        "curl -X POST {} \\\n  -H {} \\\n  -H {} \\\n  -d {}",
        shell_quote(&request.target.endpoint),
        shell_quote(&format!("Authorization: Bearer {}", CREDENTIAL_PLACEHOLDER)),
        shell_quote("Content-Type: application/json"),
        shell_quote(&body_json)
    )
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
