//! Demo front end: one HTML page plus the JSON API it talks to

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::{DocumentType, ValidityPeriod};
use crate::document::SourceFile;
use crate::error::CheckError;
use crate::logging::SharedLogBuffer;
use crate::managers::SharedCheckManager;
use crate::session::SessionSnapshot;

/// Largest upload accepted by `POST /api/check`
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: SharedCheckManager,
    pub log_buffer: SharedLogBuffer,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/session", get(session))
        .route("/api/check", post(check))
        .route("/api/resubmit", post(resubmit))
        .route("/api/document", delete(remove_document))
        .route("/api/config/types/:tag", post(toggle_type))
        .route("/api/config/validity", put(select_validity))
        .route("/api/credential", put(set_credential))
        .route("/api/transcript", get(transcript))
        .route("/api/logs", get(logs))
        .route("/api/logs/stream", get(logs_stream))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the front end until the process is stopped
pub async fn start_web_server(port: u16, state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web front end listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// API error body; service failures all surface as one generic message
struct ApiError(CheckError);

impl From<CheckError> for ApiError {
    fn from(err: CheckError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CheckError::Configuration { .. } | CheckError::InvalidOption { .. } => {
                StatusCode::BAD_REQUEST
            }
            CheckError::Format { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CheckError::Busy => StatusCode::CONFLICT,
            CheckError::Auth { .. } | CheckError::Validation { .. } | CheckError::Transport { .. } => {
                StatusCode::BAD_GATEWAY
            }
            CheckError::StoreLoad { .. } | CheckError::StoreSave { .. } | CheckError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": self.0.user_message() })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> &'static str {
    "Flash check front end running"
}

/// GET /api/session
async fn session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.manager.snapshot())
}

/// POST /api/check - multipart upload with a `file` field
async fn check(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let mut source = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| CheckError::InvalidOption {
        message: format!("malformed upload: {}", e),
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| CheckError::InvalidOption {
            message: format!("failed to read upload: {}", e),
        })?;
        source = Some(SourceFile::new(file_name, content_type, bytes.to_vec()));
        break;
    }

    let source = source.ok_or_else(|| CheckError::InvalidOption {
        message: "no file field in upload".to_string(),
    })?;

    info!("Upload received: '{}' ({} bytes)", source.file_name, source.bytes.len());
    let view = state.manager.submit_file(source).await?;
    Ok(Json(view).into_response())
}

/// POST /api/resubmit
async fn resubmit(State(state): State<AppState>) -> ApiResult<Response> {
    let view = state.manager.resubmit().await?;
    Ok(Json(view).into_response())
}

/// DELETE /api/document
async fn remove_document(State(state): State<AppState>) -> Json<SessionSnapshot> {
    state.manager.remove_document();
    Json(state.manager.snapshot())
}

/// POST /api/config/types/:tag - toggle one accepted document type
async fn toggle_type(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let tag: DocumentType = tag.parse()?;
    if !state.manager.toggle_type(tag) {
        warn!("Kept {}: at least one document type must stay accepted", tag);
    }
    Ok(Json(state.manager.snapshot()))
}

#[derive(Deserialize)]
struct ValidityBody {
    days: u32,
}

/// PUT /api/config/validity
async fn select_validity(
    State(state): State<AppState>,
    Json(body): Json<ValidityBody>,
) -> ApiResult<Json<SessionSnapshot>> {
    state.manager.select_validity_days(body.days)?;
    Ok(Json(state.manager.snapshot()))
}

#[derive(Deserialize)]
struct CredentialBody {
    api_key: String,
}

/// PUT /api/credential
async fn set_credential(
    State(state): State<AppState>,
    Json(body): Json<CredentialBody>,
) -> ApiResult<Json<serde_json::Value>> {
    state.manager.set_credential(&body.api_key).await?;
    Ok(Json(serde_json::json!({
        "has_credential": state.manager.credential_is_set()
    })))
}

/// GET /api/transcript - curl form of the pending request, key redacted
async fn transcript(State(state): State<AppState>) -> ApiResult<String> {
    Ok(state.manager.transcript()?)
}

#[derive(Deserialize)]
struct LogsQuery {
    count: Option<usize>,
    /// `text` for one formatted line per entry, JSON otherwise
    format: Option<String>,
}

/// GET /api/logs
async fn logs(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> Response {
    let entries = state.log_buffer.recent(query.count.unwrap_or(100));
    match query.format.as_deref() {
        Some("text") => entries
            .iter()
            .map(|e| e.format())
            .collect::<Vec<_>>()
            .join("\n")
            .into_response(),
        _ => Json(entries).into_response(),
    }
}

/// GET /api/logs/stream - SSE endpoint for live logs
async fn logs_stream(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.log_buffer.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => Event::default()
            .json_data(&entry)
            .ok()
            .map(Ok::<_, Infallible>),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// GET / - the check page
async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.manager.snapshot()))
}

fn render_page(snapshot: &SessionSnapshot) -> String {
    let in_flight = matches!(snapshot.state, "validating" | "submitting");

    let type_boxes: Vec<String> = DocumentType::ALL
        .iter()
        .map(|t| {
            let checked = snapshot.accepted_types.iter().any(|a| a == t.tag());
            format!(
                r#"<label><input type="checkbox" {checked} onchange="toggleType('{tag}')"> {label}</label>"#,
                checked = if checked { "checked" } else { "" },
                tag = t.tag(),
                label = html_escape(t.label()),
            )
        })
        .collect();

    let validity_options: Vec<String> = ValidityPeriod::ALL
        .iter()
        .map(|p| {
            format!(
                r#"<option value="{days}" {selected}>{label}</option>"#,
                days = p.days(),
                selected = if p.days() == snapshot.validity_days { "selected" } else { "" },
                label = p.label(),
            )
        })
        .collect();

    let status = match (&snapshot.file_name, snapshot.state) {
        (Some(name), state) => format!("{} &middot; {}", html_escape(name), state),
        (None, state) => state.to_string(),
    };

    let error = snapshot
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="error">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    let result = snapshot
        .view
        .as_ref()
        .map(|v| {
            let link = v
                .document_url
                .as_deref()
                .map(|u| format!(r#"<p><a href="{0}" target="_blank">View document</a></p>"#, html_escape(u)))
                .unwrap_or_default();
            format!(
                r#"<pre class="{class}">{body}</pre>{link}"#,
                class = if v.passed { "pass" } else { "fail" },
                body = html_escape(&v.render()),
                link = link,
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Flash Check</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 760px; margin: 40px auto; color: #333; }}
        fieldset {{ border: 1px solid #ddd; border-radius: 8px; margin-bottom: 20px; }}
        label {{ display: inline-block; min-width: 220px; padding: 4px 0; }}
        .error {{ background: #fff5f5; color: #c53030; padding: 12px; border-radius: 8px; margin: 12px 0; }}
        pre {{ padding: 16px; border-radius: 8px; white-space: pre-wrap; }}
        pre.pass {{ background: #f0fff4; border-left: 4px solid #38a169; }}
        pre.fail {{ background: #fff5f5; border-left: 4px solid #e53e3e; }}
        .status {{ color: #888; }}
    </style>
</head>
<body>
    <h1>Proof of address flash check</h1>

    <fieldset>
        <legend>API key</legend>
        <input id="api-key" type="password" placeholder="{key_hint}">
        <button onclick="saveKey()">Save</button>
    </fieldset>

    <fieldset>
        <legend>Accepted documents</legend>
        {type_boxes}
    </fieldset>

    <fieldset>
        <legend>Validity period</legend>
        <select onchange="setValidity(this.value)">{validity_options}</select>
    </fieldset>

    <fieldset>
        <legend>Document</legend>
        <input id="file" type="file" accept="application/pdf,.pdf">
        <button onclick="runCheck()" {disabled}>Run check</button>
        <button onclick="call('POST', '/api/resubmit')" {disabled}>Resubmit</button>
        <button onclick="call('DELETE', '/api/document')">Remove document</button>
        <a href="/api/transcript" target="_blank">View request</a>
        <p class="status">{status}</p>
    </fieldset>

    {error}
    {result}

    <script>
        async function call(method, url, body) {{
            const opts = {{ method }};
            if (body !== undefined) {{
                opts.headers = {{ 'Content-Type': 'application/json' }};
                opts.body = JSON.stringify(body);
            }}
            await fetch(url, opts);
            location.reload();
        }}
        function toggleType(tag) {{ call('POST', '/api/config/types/' + tag); }}
        function setValidity(days) {{ call('PUT', '/api/config/validity', {{ days: Number(days) }}); }}
        function saveKey() {{ call('PUT', '/api/credential', {{ api_key: document.getElementById('api-key').value }}); }}
        async function runCheck() {{
            const input = document.getElementById('file');
            if (!input.files.length) return;
            const form = new FormData();
            form.append('file', input.files[0]);
            await fetch('/api/check', {{ method: 'POST', body: form }});
            location.reload();
        }}
    </script>
</body>
</html>"#,
        key_hint = if snapshot.has_credential { "(saved)" } else { "not set" },
        type_boxes = type_boxes.join("\n        "),
        validity_options = validity_options.join(""),
        disabled = if in_flight { "disabled" } else { "" },
        status = status,
        error = error,
        result = result,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{VerificationClient, VerificationRequest, VerificationResult};
    use crate::config::AppConfig;
    use crate::logging::create_log_buffer;
    use crate::managers::CheckManager;
    use crate::state::MemoryCredentialStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    struct AlwaysPasses;

    #[async_trait]
    impl VerificationClient for AlwaysPasses {
        async fn verify(
            &self,
            _request: &VerificationRequest,
        ) -> crate::error::Result<VerificationResult> {
            Ok(serde_json::from_str(r#"{"passed": true, "answer": "ok", "command_instance_id": "case-1"}"#)
                .unwrap())
        }
    }

    async fn spawn_app() -> String {
        let manager = CheckManager::load(
            &AppConfig::default(),
            Arc::new(AlwaysPasses),
            Arc::new(MemoryCredentialStore::new()),
        )
        .await
        .unwrap();
        let state = AppState {
            manager: Arc::new(manager),
            log_buffer: create_log_buffer(16),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.ok();
        });
        format!("http://{}", addr)
    }

    fn upload(name: &str, mime: &str) -> reqwest::multipart::Form {
        let part = reqwest::multipart::Part::bytes(b"%PDF-1.7".to_vec())
            .file_name(name.to_string())
            .mime_str(mime)
            .unwrap();
        reqwest::multipart::Form::new().part("file", part)
    }

    #[tokio::test]
    async fn test_check_requires_credential_then_succeeds() {
        let base = spawn_app().await;
        let http = reqwest::Client::new();

        let resp = http
            .post(format!("{}/api/check", base))
            .multipart(upload("bill.pdf", "application/pdf"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        let resp = http
            .put(format!("{}/api/credential", base))
            .json(&serde_json::json!({"api_key": "key"}))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let resp = http
            .post(format!("{}/api/resubmit", base))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        let view: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(view["passed"], true);

        let snapshot: serde_json::Value = http
            .get(format!("{}/api/session", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(snapshot["state"], "succeeded");
    }

    #[tokio::test]
    async fn test_non_pdf_upload_is_rejected() {
        let base = spawn_app().await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/check", base))
            .multipart(upload("scan.png", "image/png"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 415);
    }

    #[tokio::test]
    async fn test_config_endpoints() {
        let base = spawn_app().await;
        let http = reqwest::Client::new();

        let snapshot: serde_json::Value = http
            .put(format!("{}/api/config/validity", base))
            .json(&serde_json::json!({"days": 365}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(snapshot["validity_days"], 365);

        let resp = http
            .put(format!("{}/api/config/validity", base))
            .json(&serde_json::json!({"days": 30}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);

        let snapshot: serde_json::Value = http
            .post(format!("{}/api/config/types/phone_bill", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(snapshot["accepted_types"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("phone_bill")));

        let resp = http
            .post(format!("{}/api/config/types/passport", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[test]
    fn test_page_disables_submit_while_in_flight() {
        let snapshot = SessionSnapshot {
            state: "submitting",
            file_name: Some("bill.pdf".to_string()),
            error: None,
            elapsed_seconds: None,
            view: None,
            result: None,
            accepted_types: vec!["utility_bill".to_string()],
            validity_days: 90,
            has_credential: true,
        };
        let page = render_page(&snapshot);
        assert!(page.contains(r#"onclick="runCheck()" disabled"#));
        assert!(page.contains("bill.pdf &middot; submitting"));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href='x'>"), "&lt;a href=&#39;x&#39;&gt;");
    }
}
