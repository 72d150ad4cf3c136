use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::client::{CheckTarget, SharedVerificationClient};
use crate::config::{AppConfig, CheckConfiguration, DocumentType};
use crate::document::{DocumentEncoder, SourceFile};
use crate::error::{CheckError, Result};
use crate::projector::{audit_transcript, CheckView, ResponseProjector};
use crate::session::{CheckEvent, CheckSession, Effect, SessionSnapshot};
use crate::state::{SharedCredentialStore, API_KEY_KEY};

/// Drives a [`CheckSession`] through encoding and the network round trip.
///
/// The session lock is only taken between awaits, so a second submission
/// arriving mid-flight sees `Submitting` and is turned away with `Busy`.
pub struct CheckManager {
    session: Mutex<CheckSession>,
    client: SharedVerificationClient,
    store: SharedCredentialStore,
}

impl CheckManager {
    /// Build a manager, reading the credential from the store once
    pub async fn load(
        config: &AppConfig,
        client: SharedVerificationClient,
        store: SharedCredentialStore,
    ) -> Result<Self> {
        let mut credential = store.get(API_KEY_KEY).await?.unwrap_or_default();
        if credential.is_empty() {
            if let Some(seed) = &config.api_key_seed {
                info!("Seeding credential store from FLASHCHECK_API_KEY");
                store.set(API_KEY_KEY, seed).await?;
                credential = seed.clone();
            }
        }

        let session = CheckSession::new(
            CheckTarget::from_config(config),
            ResponseProjector::new(config.document_proxy_endpoint()),
            CheckConfiguration::default(),
            credential,
        );
        Ok(Self::new(session, client, store))
    }

    pub fn new(
        session: CheckSession,
        client: SharedVerificationClient,
        store: SharedCredentialStore,
    ) -> Self {
        Self {
            session: Mutex::new(session),
            client,
            store,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().snapshot()
    }

    pub fn credential_is_set(&self) -> bool {
        !self.session.lock().credential().trim().is_empty()
    }

    /// Persist a new credential, then use it for subsequent submissions
    pub async fn set_credential(&self, credential: &str) -> Result<()> {
        let credential = credential.trim();
        self.store.set(API_KEY_KEY, credential).await?;
        self.session.lock().set_credential(credential);
        info!("API key updated");
        Ok(())
    }

    pub fn configure(&self, configuration: CheckConfiguration) {
        self.session.lock().set_configuration(configuration);
    }

    pub fn toggle_type(&self, tag: DocumentType) -> bool {
        self.session.lock().toggle_type(tag)
    }

    pub fn select_validity_days(&self, days: u32) -> Result<()> {
        self.session.lock().select_validity_days(days)
    }

    pub fn remove_document(&self) {
        let _ = self.session.lock().apply(CheckEvent::RemoveDocument);
    }

    /// Audit transcript of what the held document would be sent as
    pub fn transcript(&self) -> Result<String> {
        let request = self.session.lock().current_request()?;
        Ok(audit_transcript(&request))
    }

    /// Validate, encode and submit a file, returning the projected result
    pub async fn submit_file(&self, source: SourceFile) -> Result<CheckView> {
        let dropped = self.session.lock().apply(CheckEvent::FileDropped {
            file_name: source.file_name.clone(),
        })?;
        let token = match dropped {
            Effect::Encode { token } => token,
            _ => {
                return Err(CheckError::Internal {
                    message: "file drop did not start encoding".to_string(),
                })
            }
        };

        let encoded = DocumentEncoder::encode(source).await;

        let effect = {
            let mut session = self.session.lock();
            match encoded {
                Ok(document) => session.apply(CheckEvent::Encoded { token, document })?,
                Err(e) => {
                    session.apply(CheckEvent::EncodeFailed {
                        token,
                        message: e.user_message(),
                    })?;
                    return Err(e);
                }
            }
        };

        self.run(effect).await
    }

    /// Submit the held document again with the current configuration
    pub async fn resubmit(&self) -> Result<CheckView> {
        let effect = {
            let mut session = self.session.lock();
            session.apply(CheckEvent::Resubmit)?
        };
        self.run(effect).await
    }

    async fn run(&self, effect: Effect) -> Result<CheckView> {
        let (token, request) = match effect {
            Effect::Submit { token, request } => (token, request),
            _ => {
                return Err(CheckError::Internal {
                    message: "document was removed before submission".to_string(),
                })
            }
        };

        let outcome = self.client.verify(&request).await;
        let received_at = Instant::now();

        let mut session = self.session.lock();
        match outcome {
            Ok(result) => {
                match session.apply(CheckEvent::Responded {
                    token,
                    result,
                    received_at,
                })? {
                    Effect::Completed(view) => Ok(view),
                    _ => Err(CheckError::Internal {
                        message: "check was cancelled before the response arrived".to_string(),
                    }),
                }
            }
            Err(e) => {
                error!("Flash check failed: {:?}", e);
                session.apply(CheckEvent::RequestFailed {
                    token,
                    message: e.user_message(),
                })?;
                Err(e)
            }
        }
    }
}

/// Shared check manager type
pub type SharedCheckManager = Arc<CheckManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{VerificationClient, VerificationRequest, VerificationResult};
    use crate::state::{CredentialStore, MemoryCredentialStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Answers every request with a fixed body. With a gate, the first call
    /// waits for a go signal.
    struct FakeClient {
        calls: AtomicUsize,
        response: fn() -> Result<VerificationResult>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeClient {
        fn new(response: fn() -> Result<VerificationResult>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response,
                gate: None,
            }
        }
    }

    #[async_trait]
    impl VerificationClient for FakeClient {
        async fn verify(&self, _request: &VerificationRequest) -> Result<VerificationResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let (Some(gate), 0) = (&self.gate, call) {
                gate.notified().await;
            }
            (self.response)()
        }
    }

    fn passed() -> Result<VerificationResult> {
        Ok(serde_json::from_str(
            r#"{
                "passed": true,
                "answer": "Recent utility bill",
                "alerts": {"a": "msg"},
                "input_data": {"document": {"url": "https://x/doc.pdf?token=abc"}},
                "command_instance_id": "case-1"
            }"#,
        )
        .unwrap())
    }

    fn rejected() -> Result<VerificationResult> {
        Err(CheckError::Auth { status: 401 })
    }

    async fn manager(credential: &str, client: Arc<FakeClient>) -> CheckManager {
        let store = Arc::new(MemoryCredentialStore::new());
        store.set(API_KEY_KEY, credential).await.unwrap();
        CheckManager::load(&AppConfig::default(), client, store)
            .await
            .unwrap()
    }

    fn pdf() -> SourceFile {
        SourceFile::new("bill.pdf", Some("application/pdf".to_string()), b"%PDF-1.7".to_vec())
    }

    #[tokio::test]
    async fn test_submit_file_success() {
        let client = Arc::new(FakeClient::new(passed));
        let manager = manager("key", client.clone()).await;

        let view = manager.submit_file(pdf()).await.unwrap();
        assert!(view.passed);
        assert_eq!(view.warnings, vec!["a: msg".to_string()]);
        assert_eq!(
            view.document_url.as_deref(),
            Some("https://proxy.example.com/getDocument?case_id=case-1&expired_url=https%3A%2F%2Fx%2Fdoc.pdf%3Ftoken%3Dabc")
        );
        assert!(view.elapsed_seconds.is_some());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.snapshot().state, "succeeded");
    }

    #[tokio::test]
    async fn test_empty_credential_never_calls_client() {
        let client = Arc::new(FakeClient::new(passed));
        let manager = manager("", client.clone()).await;

        let err = manager.submit_file(pdf()).await.unwrap_err();
        assert!(matches!(err, CheckError::Configuration { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state, "idle");
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_non_pdf_never_reaches_client() {
        let client = Arc::new(FakeClient::new(passed));
        let manager = manager("key", client.clone()).await;

        let err = manager
            .submit_file(SourceFile::new("scan.png", Some("image/png".to_string()), vec![1, 2, 3]))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckError::Format { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state, "idle");
        assert!(snapshot.error.unwrap().contains("scan.png"));
    }

    #[tokio::test]
    async fn test_service_failure_moves_to_failed() {
        let client = Arc::new(FakeClient::new(rejected));
        let manager = manager("bad-key", client).await;

        let err = manager.submit_file(pdf()).await.unwrap_err();
        assert!(matches!(err, CheckError::Auth { .. }));

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state, "failed");
        assert!(snapshot.error.unwrap().starts_with("Verification failed"));
        assert!(snapshot.elapsed_seconds.is_none());
    }

    #[tokio::test]
    async fn test_fixing_credential_then_resubmitting() {
        let client = Arc::new(FakeClient::new(passed));
        let manager = manager("", client.clone()).await;
        assert!(manager.submit_file(pdf()).await.is_err());

        manager.set_credential("key").await.unwrap();
        let view = manager.resubmit().await.unwrap();
        assert!(view.passed);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_submission_while_in_flight_is_busy() {
        let gate = Arc::new(Notify::new());
        let client = Arc::new(FakeClient {
            gate: Some(gate.clone()),
            ..FakeClient::new(passed)
        });
        let manager = Arc::new(manager("key", client.clone()).await);

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.submit_file(pdf()).await }
        });

        for _ in 0..100 {
            if manager.snapshot().state == "submitting" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.snapshot().state, "submitting");

        let err = manager.submit_file(pdf()).await.unwrap_err();
        assert!(matches!(err, CheckError::Busy));

        gate.notify_one();
        let view = first.await.unwrap().unwrap();
        assert!(view.passed);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_during_flight_discards_response() {
        let gate = Arc::new(Notify::new());
        let client = Arc::new(FakeClient {
            gate: Some(gate.clone()),
            ..FakeClient::new(passed)
        });
        let manager = Arc::new(manager("key", client).await);

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.submit_file(pdf()).await }
        });
        for _ in 0..100 {
            if manager.snapshot().state == "submitting" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        manager.remove_document();
        gate.notify_one();

        assert!(first.await.unwrap().is_err());
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.state, "idle");
        assert!(snapshot.view.is_none());
    }

    #[tokio::test]
    async fn test_stale_submission_does_not_get_newer_view() {
        let gate = Arc::new(Notify::new());
        let client = Arc::new(FakeClient {
            gate: Some(gate.clone()),
            ..FakeClient::new(passed)
        });
        let manager = Arc::new(manager("key", client.clone()).await);

        let first = tokio::spawn({
            let manager = manager.clone();
            async move { manager.submit_file(pdf()).await }
        });
        for _ in 0..100 {
            if manager.snapshot().state == "submitting" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        manager.remove_document();
        let second = manager.submit_file(pdf()).await.unwrap();
        assert!(second.passed);
        assert_eq!(manager.snapshot().state, "succeeded");

        gate.notify_one();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, CheckError::Internal { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.snapshot().state, "succeeded");
    }

    #[tokio::test]
    async fn test_seed_credential_from_config() {
        let store: Arc<MemoryCredentialStore> = Arc::new(MemoryCredentialStore::new());
        let config = AppConfig {
            api_key_seed: Some("seeded".to_string()),
            ..AppConfig::default()
        };
        let manager = CheckManager::load(&config, Arc::new(FakeClient::new(passed)), store.clone())
            .await
            .unwrap();

        assert!(manager.credential_is_set());
        assert_eq!(
            store.get(API_KEY_KEY).await.unwrap().as_deref(),
            Some("seeded")
        );
    }

    #[tokio::test]
    async fn test_transcript_requires_document() {
        let manager = manager("key", Arc::new(FakeClient::new(passed))).await;
        assert!(manager.transcript().is_err());

        manager.submit_file(pdf()).await.unwrap();
        let transcript = manager.transcript().unwrap();
        assert!(transcript.contains("bill.pdf"));
        assert!(!transcript.contains("Bearer key"));
    }
}
