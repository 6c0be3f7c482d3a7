//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use econsent_core::ports::{Clock, CodeDeliveryService, SubmissionBackend};
use econsent_core::{ConsentSession, DeviceInfo, PatientProfile, StudyInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken; // Each armed timer owns one of these.

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub delivery: Arc<dyn CodeDeliveryService>,
    pub submission: Arc<dyn SubmissionBackend>,
    /// All live consent sessions, keyed by opaque token. Each entry has its
    /// own lock: one logical actor per session.
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionEntry>>>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        delivery: Arc<dyn CodeDeliveryService>,
        submission: Arc<dyn SubmissionBackend>,
    ) -> Self {
        Self {
            config,
            clock,
            delivery,
            submission,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up a live session. `None` maps to the "invalid link" terminal.
    pub async fn session(&self, token: &str) -> Option<Arc<Mutex<SessionEntry>>> {
        self.sessions.lock().await.get(token).cloned()
    }

    /// Returns the session for `token`, creating it on first open. Creation
    /// stamps the audit trail's `opened_at` with the current instant.
    pub async fn open_session(&self, token: &str, device: DeviceInfo) -> Arc<Mutex<SessionEntry>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(token.to_string())
            .or_insert_with(|| {
                let session = ConsentSession::open(
                    token,
                    seeded_patient(),
                    seeded_study(),
                    &self.config.consent,
                    device,
                    self.clock.now(),
                );
                Arc::new(Mutex::new(SessionEntry::new(session)))
            })
            .clone()
    }
}

//=========================================================================================
// SessionEntry (Specific to One Consent Attempt)
//=========================================================================================

/// One consent attempt plus the timers currently armed for it.
pub struct SessionEntry {
    pub session: ConsentSession,
    pub timers: StageTimers,
}

impl SessionEntry {
    pub fn new(session: ConsentSession) -> Self {
        Self {
            session,
            timers: StageTimers::default(),
        }
    }
}

/// The scoped timers a stage may have armed. Each must be cancelled on the
/// transition that ends its validity so a stale tick can never mutate state
/// after the stage has moved on.
#[derive(Default)]
pub struct StageTimers {
    pub audio: Option<TimerHandle>,
    pub recording: Option<TimerHandle>,
}

impl StageTimers {
    pub fn cancel_all(&mut self) {
        if let Some(timer) = self.audio.take() {
            timer.cancel();
        }
        if let Some(timer) = self.recording.take() {
            timer.cancel();
        }
    }
}

/// Handle to one armed timer task.
pub struct TimerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    pub fn new(token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
        self.handle.abort();
    }
}

//=========================================================================================
// Seed Data
//=========================================================================================

// Enrollment records for the demonstration package. A real deployment
// resolves these from the token at link-creation time.

fn seeded_patient() -> PatientProfile {
    PatientProfile {
        patient_id: "SITE-001-123".to_string(),
        patient_name: "John Doe".to_string(),
        email: "john.doe@example.com".to_string(),
        language: "English".to_string(),
    }
}

fn seeded_study() -> StudyInfo {
    StudyInfo {
        protocol_id: "CARDIO-2024-01".to_string(),
        protocol_name: "Cardiovascular Health Study".to_string(),
        version: "v2.0".to_string(),
        site_code: "USA-NYC-001".to_string(),
        site_name: "Apollo Hospital Delhi".to_string(),
        investigator_name: "Dr. Sarah Johnson".to_string(),
    }
}
