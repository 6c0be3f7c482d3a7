//! services/api/src/web/protocol.rs
//!
//! Defines the request and response payloads exchanged between the stage
//! sequencer frontend and the API server. Responses are projections of the
//! engine's session state; they carry no presentation content.

use chrono::{DateTime, Utc};
use econsent_core::{
    AcknowledgementKind, ConsentConfig, ConsentSession, ErrorReason,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

//=========================================================================================
// Requests
//=========================================================================================

#[derive(Deserialize, Debug, ToSchema)]
pub struct SendChallengeRequest {
    pub email: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ScrollRequest {
    pub depth_percent: u8,
}

/// Mirror of the engine's acknowledgement kinds, kept local so the wire
/// format is owned by this protocol module.
#[derive(Deserialize, Debug, Clone, Copy, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AckKind {
    Consent,
    Terms,
}

impl From<AckKind> for AcknowledgementKind {
    fn from(kind: AckKind) -> Self {
        match kind {
            AckKind::Consent => AcknowledgementKind::Consent,
            AckKind::Terms => AcknowledgementKind::Terms,
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct AcknowledgementRequest {
    pub kind: AckKind,
    pub value: bool,
}

//=========================================================================================
// Responses
//=========================================================================================

/// Structured refusal returned with every 4xx. `reason` is the engine's
/// human-readable explanation; `reason_code` is set when the refusal maps
/// to one of the sequencer's error-terminal reasons.
#[derive(Serialize, Debug, ToSchema)]
pub struct RefusalResponse {
    pub kind: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub reason_code: Option<ErrorReason>,
}

/// The landing screen's view of the session.
#[derive(Serialize, Debug, ToSchema)]
pub struct LandingResponse {
    pub session_token: String,
    pub stage: String,
    pub patient_id: String,
    pub protocol_id: String,
    pub protocol_name: String,
    pub document_version: String,
    pub site_code: String,
    pub site_name: String,
    pub language: String,
}

impl LandingResponse {
    pub fn from_session(session: &ConsentSession) -> Self {
        Self {
            session_token: session.session_token.clone(),
            stage: session.stage.to_string(),
            patient_id: mask_patient_id(&session.patient.patient_id),
            protocol_id: session.study.protocol_id.clone(),
            protocol_name: session.study.protocol_name.clone(),
            document_version: session.study.version.clone(),
            site_code: session.study.site_code.clone(),
            site_name: session.study.site_name.clone(),
            language: session.patient.language.clone(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct StageResponse {
    pub stage: String,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ChallengeResponse {
    pub email: String,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resend_cooldown_secs: i64,
    pub attempts_remaining: u32,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct VerifyResponse {
    pub verified: bool,
}

/// The document screen's view: everything the gate needs to render
/// guidance, nothing about page content.
#[derive(Serialize, Debug, ToSchema)]
pub struct DocumentView {
    pub current_page: u32,
    pub total_pages: u32,
    pub minimum_dwell_secs: i64,
    pub time_on_page_secs: i64,
    pub scrolled_to_bottom: bool,
    pub pages_read: Vec<u32>,
    pub progress_percent: u32,
    pub total_reading_time_secs: i64,
    pub completed: bool,
}

impl DocumentView {
    pub fn from_session(
        session: &ConsentSession,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let doc = &session.document;
        Self {
            current_page: doc.current_page,
            total_pages: doc.total_pages,
            minimum_dwell_secs: cfg.min_dwell_for(doc.current_page),
            time_on_page_secs: doc.time_on_page(now),
            scrolled_to_bottom: doc.is_scrolled_to_bottom(),
            pages_read: doc.pages_read.iter().copied().collect(),
            progress_percent: doc.progress_percent(),
            total_reading_time_secs: doc.total_reading_time_secs,
            completed: doc.completed,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ChecklistItemView {
    pub id: u32,
    pub statement: String,
    pub audio_duration_secs: i64,
    pub audio_played: bool,
    pub video_recorded: bool,
    pub completed: bool,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ClipView {
    pub item_id: u32,
    pub duration_secs: i64,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ChecklistView {
    pub items: Vec<ChecklistItemView>,
    pub total_completed: usize,
    pub all_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_playback: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_recording: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_clip: Option<ClipView>,
}

impl ChecklistView {
    pub fn from_session(session: &ConsentSession) -> Self {
        let list = &session.checklist;
        Self {
            items: list
                .items
                .iter()
                .map(|item| ChecklistItemView {
                    id: item.id,
                    statement: item.statement.clone(),
                    audio_duration_secs: item.audio_duration_secs,
                    audio_played: item.audio_played,
                    video_recorded: item.video_recorded,
                    completed: item.completed,
                })
                .collect(),
            total_completed: list.total_completed,
            all_completed: list.all_completed,
            active_playback: list.active_playback(),
            active_recording: list.active_recording(),
            held_clip: list.candidate_clip().map(|clip| ClipView {
                item_id: clip.item_id,
                duration_secs: clip.duration_secs,
            }),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct AudioStartResponse {
    pub item_id: u32,
    pub duration_secs: i64,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct RecordingStartResponse {
    pub item_id: u32,
    pub max_duration_secs: i64,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SignatureView {
    pub mark_present: bool,
    pub stroke_count: u32,
    pub signer_name: String,
    pub consent_acknowledged: bool,
    pub terms_acknowledged: bool,
    pub submitting: bool,
    pub submitted: bool,
}

impl SignatureView {
    pub fn from_session(session: &ConsentSession) -> Self {
        let sig = &session.signature;
        Self {
            mark_present: sig.mark_present,
            stroke_count: sig.stroke_count,
            signer_name: sig.signer_name.clone(),
            consent_acknowledged: sig.consent_acknowledged,
            terms_acknowledged: sig.terms_acknowledged,
            submitting: sig.is_in_flight(),
            submitted: sig.submitted,
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct SubmitResponse {
    pub status: String,
}

/// Masks a patient identifier for display: every digit with at least three
/// digits following it is hidden.
pub fn mask_patient_id(patient_id: &str) -> String {
    let total_digits = patient_id.chars().filter(|c| c.is_ascii_digit()).count();
    let mut seen = 0;
    patient_id
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                seen += 1;
                if total_digits - seen >= 3 {
                    return '*';
                }
            }
            c
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_all_but_last_three_digits() {
        assert_eq!(mask_patient_id("SITE-001-123"), "SITE-***-123");
        assert_eq!(mask_patient_id("123"), "123");
        assert_eq!(mask_patient_id("NO-DIGITS"), "NO-DIGITS");
    }
}
