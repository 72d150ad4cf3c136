//! The flash check lifecycle as an explicit state machine.
//!
//! `Idle → Validating → Submitting → {Succeeded, Failed}`, with
//! `RemoveDocument` returning to a clean `Idle` from anywhere. All mutation
//! goes through [`CheckSession::apply`]; I/O is left to the caller, which is
//! told what to send through the returned [`Effect`].

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{CheckTarget, VerificationRequest, VerificationResult};
use crate::config::{CheckConfiguration, DocumentType};
use crate::document::Document;
use crate::error::{CheckError, Result};
use crate::projector::{CheckView, ResponseProjector};

/// Correlates an encode result or a response with the step that produced it
pub type RequestToken = Uuid;

#[derive(Debug)]
pub enum CheckState {
    /// Waiting for a file. May still hold a document the guard refused.
    Idle {
        document: Option<Document>,
        error: Option<String>,
    },
    Validating {
        file_name: String,
        token: RequestToken,
    },
    Submitting {
        document: Document,
        token: RequestToken,
        started_at: Instant,
    },
    Succeeded {
        document: Document,
        result: Box<VerificationResult>,
        view: CheckView,
        elapsed_seconds: f64,
    },
    Failed {
        document: Document,
        error: String,
    },
}

impl CheckState {
    fn idle() -> Self {
        CheckState::Idle {
            document: None,
            error: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CheckState::Idle { .. } => "idle",
            CheckState::Validating { .. } => "validating",
            CheckState::Submitting { .. } => "submitting",
            CheckState::Succeeded { .. } => "succeeded",
            CheckState::Failed { .. } => "failed",
        }
    }

    fn document(&self) -> Option<&Document> {
        match self {
            CheckState::Idle { document, .. } => document.as_ref(),
            CheckState::Validating { .. } => None,
            CheckState::Submitting { document, .. }
            | CheckState::Succeeded { document, .. }
            | CheckState::Failed { document, .. } => Some(document),
        }
    }

    fn is_in_flight(&self) -> bool {
        matches!(
            self,
            CheckState::Validating { .. } | CheckState::Submitting { .. }
        )
    }
}

#[derive(Debug)]
pub enum CheckEvent {
    /// The user picked a file; encoding is about to start
    FileDropped { file_name: String },
    /// Encoding finished
    Encoded {
        token: RequestToken,
        document: Document,
    },
    /// Encoding was refused (wrong format, unreadable file)
    EncodeFailed {
        token: RequestToken,
        message: String,
    },
    /// Submit the held document again with the current configuration
    Resubmit,
    Responded {
        token: RequestToken,
        result: VerificationResult,
        received_at: Instant,
    },
    RequestFailed {
        token: RequestToken,
        message: String,
    },
    RemoveDocument,
}

/// What the caller has to do after a transition
#[derive(Debug)]
pub enum Effect {
    None,
    /// Encode the dropped file and report back with this token
    Encode { token: RequestToken },
    Submit {
        token: RequestToken,
        request: VerificationRequest,
    },
    /// The response was accepted; show this view
    Completed(CheckView),
}

/// Serializable view of the session for the front end
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: &'static str,
    pub file_name: Option<String>,
    pub error: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub view: Option<CheckView>,
    /// Raw service response, for the fields the view doesn't carry
    pub result: Option<VerificationResult>,
    pub accepted_types: Vec<String>,
    pub validity_days: u32,
    pub has_credential: bool,
}

pub struct CheckSession {
    state: CheckState,
    configuration: CheckConfiguration,
    credential: String,
    target: CheckTarget,
    projector: ResponseProjector,
}

impl CheckSession {
    pub fn new(
        target: CheckTarget,
        projector: ResponseProjector,
        configuration: CheckConfiguration,
        credential: String,
    ) -> Self {
        Self {
            state: CheckState::idle(),
            configuration,
            credential,
            target,
            projector,
        }
    }

    pub fn state(&self) -> &CheckState {
        &self.state
    }

    pub fn configuration(&self) -> &CheckConfiguration {
        &self.configuration
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn set_credential(&mut self, credential: impl Into<String>) {
        self.credential = credential.into();
    }

    pub fn set_configuration(&mut self, configuration: CheckConfiguration) {
        self.configuration = configuration;
    }

    pub fn toggle_type(&mut self, tag: DocumentType) -> bool {
        self.configuration.toggle_type(tag)
    }

    pub fn select_validity_days(&mut self, days: u32) -> Result<()> {
        self.configuration.select_validity_days(days)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            CheckState::Idle { error, .. } => error.as_deref(),
            CheckState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn view(&self) -> Option<&CheckView> {
        match &self.state {
            CheckState::Succeeded { view, .. } => Some(view),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&VerificationResult> {
        match &self.state {
            CheckState::Succeeded { result, .. } => Some(result),
            _ => None,
        }
    }

    /// The request the held document would be sent as right now
    pub fn current_request(&self) -> Result<VerificationRequest> {
        let document = self
            .state
            .document()
            .ok_or_else(|| CheckError::configuration("no document selected"))?;
        Ok(self.build_request(document.clone()))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let file_name = match &self.state {
            CheckState::Validating { file_name, .. } => Some(file_name.clone()),
            other => other.document().map(|d| d.file_name().to_string()),
        };
        let elapsed_seconds = match &self.state {
            CheckState::Succeeded {
                elapsed_seconds, ..
            } => Some(*elapsed_seconds),
            _ => None,
        };

        SessionSnapshot {
            state: self.state.name(),
            file_name,
            error: self.error().map(str::to_string),
            elapsed_seconds,
            view: self.view().cloned(),
            result: self.result().cloned(),
            accepted_types: self.configuration.accepted_tags(),
            validity_days: self.configuration.validity_period().days(),
            has_credential: !self.credential.trim().is_empty(),
        }
    }

    /// Single mutation entry point.
    ///
    /// `Err` means the transition was refused; the state then holds the
    /// error message where one applies.
    pub fn apply(&mut self, event: CheckEvent) -> Result<Effect> {
        match event {
            CheckEvent::FileDropped { file_name } => {
                if self.state.is_in_flight() {
                    warn!("Ignoring '{}': a check is already in progress", file_name);
                    return Err(CheckError::Busy);
                }
                let token = Uuid::new_v4();
                info!("Validating '{}'", file_name);
                self.state = CheckState::Validating { file_name, token };
                Ok(Effect::Encode { token })
            }

            CheckEvent::Encoded { token, document } => {
                let awaited = matches!(
                    &self.state,
                    CheckState::Validating { token: current, .. } if *current == token
                );
                if !awaited {
                    debug!(
                        "Discarding encoded '{}': session moved on",
                        document.file_name()
                    );
                    return Ok(Effect::None);
                }
                self.begin_submission(document)
            }

            CheckEvent::EncodeFailed { token, message } => {
                let awaited = matches!(
                    &self.state,
                    CheckState::Validating { token: current, .. } if *current == token
                );
                if awaited {
                    warn!("Document rejected: {}", message);
                    self.state = CheckState::Idle {
                        document: None,
                        error: Some(message),
                    };
                }
                Ok(Effect::None)
            }

            CheckEvent::Resubmit => {
                if self.state.is_in_flight() {
                    return Err(CheckError::Busy);
                }
                let document = self
                    .state
                    .document()
                    .cloned()
                    .ok_or_else(|| CheckError::configuration("no document selected"))?;
                self.begin_submission(document)
            }

            CheckEvent::Responded {
                token,
                result,
                received_at,
            } => {
                match std::mem::replace(&mut self.state, CheckState::idle()) {
                    CheckState::Submitting {
                        document,
                        token: current,
                        started_at,
                    } if current == token => {
                        let elapsed = elapsed_seconds(started_at, received_at);
                        let view = self.projector.project(&result, Some(elapsed));
                        info!(
                            "Check for '{}' finished in {:.2}s: {}",
                            document.file_name(),
                            elapsed,
                            if result.passed { "passed" } else { "failed" }
                        );
                        self.state = CheckState::Succeeded {
                            document,
                            result: Box::new(result),
                            view: view.clone(),
                            elapsed_seconds: elapsed,
                        };
                        Ok(Effect::Completed(view))
                    }
                    other => {
                        debug!("Discarding stale response for request {}", token);
                        self.state = other;
                        Ok(Effect::None)
                    }
                }
            }

            CheckEvent::RequestFailed { token, message } => {
                match std::mem::replace(&mut self.state, CheckState::idle()) {
                    CheckState::Submitting {
                        document,
                        token: current,
                        ..
                    } if current == token => {
                        warn!("Check for '{}' failed: {}", document.file_name(), message);
                        self.state = CheckState::Failed {
                            document,
                            error: message,
                        };
                    }
                    other => {
                        debug!("Discarding stale failure for request {}", token);
                        self.state = other;
                    }
                }
                Ok(Effect::None)
            }

            CheckEvent::RemoveDocument => {
                if self.state.is_in_flight() {
                    info!("Document removed while a check was in progress");
                }
                self.state = CheckState::idle();
                Ok(Effect::None)
            }
        }
    }

    /// Guard on credential and configuration, then enter `Submitting`
    fn begin_submission(&mut self, document: Document) -> Result<Effect> {
        let request = self.build_request(document);

        if let Err(e) = request.validate() {
            warn!("Submission of '{}' refused: {}", request.document.file_name(), e);
            self.state = CheckState::Idle {
                document: Some(request.document),
                error: Some(e.user_message()),
            };
            return Err(e);
        }

        let token = Uuid::new_v4();
        self.state = CheckState::Submitting {
            document: request.document.clone(),
            token,
            started_at: Instant::now(),
        };
        info!(
            "Submitting '{}' ({} bytes, request {})",
            request.document.file_name(),
            request.document.size(),
            token
        );

        Ok(Effect::Submit { token, request })
    }

    fn build_request(&self, document: Document) -> VerificationRequest {
        VerificationRequest {
            target: self.target.clone(),
            credential: self.credential.clone(),
            document,
            configuration: self.configuration.clone(),
        }
    }
}

/// Wall-clock seconds between two instants, rounded to two decimals
pub fn elapsed_seconds(started_at: Instant, received_at: Instant) -> f64 {
    // Whole milliseconds, so ties round up without float error
    let millis = received_at.saturating_duration_since(started_at).as_millis();
    ((millis + 5) / 10) as f64 / 100.0
}
