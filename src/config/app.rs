use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from the environment (after `.env` is loaded)
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Verification service base URL
    pub api_url: String,
    /// Path of the flash check endpoint, appended to `api_url`
    pub check_path: String,
    /// Host the viewer URLs are routed through
    pub proxy_url: String,
    /// Fixed `agent_key` body field
    pub agent_key: String,
    /// Fixed `check_id` body field
    pub check_id: String,
    /// `source_type` of the submitted document
    pub source_type: String,
    /// Upper bound on a single request
    pub timeout: Duration,
    /// Directory holding persisted state
    pub state_path: PathBuf,
    /// Port of the demo front end
    pub web_port: u16,
    /// Seeds the credential store when it holds nothing
    pub api_key_seed: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.example.com".to_string(),
            check_path: "/v1/flash-check".to_string(),
            proxy_url: "https://proxy.example.com".to_string(),
            agent_key: "kyb-agent".to_string(),
            check_id: "proof_of_address".to_string(),
            source_type: "file_upload".to_string(),
            timeout: Duration::from_secs(120),
            state_path: PathBuf::from("state"),
            web_port: 3000,
            api_key_seed: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("FLASHCHECK_API_URL").unwrap_or(defaults.api_url),
            check_path: std::env::var("FLASHCHECK_CHECK_PATH").unwrap_or(defaults.check_path),
            proxy_url: std::env::var("FLASHCHECK_PROXY_URL").unwrap_or(defaults.proxy_url),
            agent_key: std::env::var("FLASHCHECK_AGENT_KEY").unwrap_or(defaults.agent_key),
            check_id: std::env::var("FLASHCHECK_CHECK_ID").unwrap_or(defaults.check_id),
            source_type: std::env::var("FLASHCHECK_SOURCE_TYPE").unwrap_or(defaults.source_type),
            timeout: std::env::var("FLASHCHECK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            state_path: std::env::var("STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
            web_port: std::env::var("WEB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.web_port),
            api_key_seed: std::env::var("FLASHCHECK_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
        }
    }

    /// Full URL the flash check is posted to
    pub fn check_endpoint(&self) -> String {
        join_url(&self.api_url, &self.check_path)
    }

    /// Proxy endpoint viewer URLs are built on
    pub fn document_proxy_endpoint(&self) -> String {
        join_url(&self.proxy_url, "/getDocument")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.state_path.join("credentials.json")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
