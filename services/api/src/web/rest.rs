//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the stage sequencer's REST endpoints and
//! the master definition for the OpenAPI specification.
//!
//! Every handler locks the session entry for the duration of the state
//! change, so user actions and timer ticks are applied strictly one at a
//! time. Engine refusals surface as 4xx responses with a structured body;
//! they are ordinary outcomes, not server failures.

use crate::web::{
    protocol::{
        AcknowledgementRequest, AudioStartResponse, ChallengeResponse, ChecklistView,
        DocumentView, LandingResponse, RecordingStartResponse, RefusalResponse, ScrollRequest,
        SendChallengeRequest, SignatureView, StageResponse, SubmitResponse, VerifyCodeRequest,
        VerifyResponse,
    },
    state::{AppState, SessionEntry},
    timers::{spawn_audio_completion, spawn_recording_cap},
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use econsent_core::{
    AuthError, CompletionExport, ConsentError, ConsentStage, DeviceInfo, ErrorReason,
    StateConflict, SubmitStart,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        landing_handler,
        send_challenge_handler,
        verify_code_handler,
        submit_handler,
        export_handler,
    ),
    components(
        schemas(
            LandingResponse,
            SendChallengeRequest,
            ChallengeResponse,
            VerifyCodeRequest,
            VerifyResponse,
            SubmitResponse,
            RefusalResponse
        )
    ),
    tags(
        (name = "eConsent API", description = "Stage-sequencer endpoints for the electronic informed-consent workflow.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Helpers
//=========================================================================================

type Refusal = (StatusCode, Json<RefusalResponse>);
type HandlerResult<T> = Result<Json<T>, Refusal>;

/// Maps an engine refusal onto a status code and structured body.
fn refusal(err: ConsentError) -> Refusal {
    let (status, kind) = match &err {
        ConsentError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        ConsentError::Auth(AuthError::ResendCoolingDown { .. }) => {
            (StatusCode::TOO_MANY_REQUESTS, "auth")
        }
        ConsentError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth"),
        ConsentError::Gate(_) => (StatusCode::PRECONDITION_FAILED, "gate"),
        ConsentError::State(_) => (StatusCode::CONFLICT, "state"),
    };
    let reason_code = match &err {
        ConsentError::State(StateConflict::AlreadySubmitted)
        | ConsentError::State(StateConflict::SessionAlreadyComplete) => {
            Some(ErrorReason::AlreadyCompleted)
        }
        _ => None,
    };
    (
        status,
        Json(RefusalResponse {
            kind: kind.to_string(),
            reason: err.to_string(),
            reason_code,
        }),
    )
}

/// The "invalid link" terminal: no live session for this token.
fn unknown_session() -> Refusal {
    (
        StatusCode::NOT_FOUND,
        Json(RefusalResponse {
            kind: "error".to_string(),
            reason: "this consent link is not valid".to_string(),
            reason_code: Some(ErrorReason::Invalid),
        }),
    )
}

fn delivery_failed() -> Refusal {
    (
        StatusCode::BAD_GATEWAY,
        Json(RefusalResponse {
            kind: "error".to_string(),
            reason: "the verification code could not be delivered".to_string(),
            reason_code: Some(ErrorReason::Generic),
        }),
    )
}

async fn require_session(
    state: &AppState,
    token: &str,
) -> Result<Arc<Mutex<SessionEntry>>, Refusal> {
    state.session(token).await.ok_or_else(unknown_session)
}

/// Derives the client environment recorded in the audit trail from the
/// request headers.
fn device_info_from(headers: &HeaderMap) -> DeviceInfo {
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let browser = if user_agent.contains("Chrome") {
        "Chrome"
    } else {
        "Other"
    };
    let os = ["Windows", "Mac", "Linux", "Android", "iPhone"]
        .iter()
        .find(|needle| user_agent.contains(*needle))
        .copied()
        .unwrap_or("Unknown");
    let device = if user_agent.to_lowercase().contains("mobile") {
        "Mobile"
    } else {
        "Desktop"
    };
    DeviceInfo {
        browser: browser.to_string(),
        os: os.to_string(),
        device: device.to_string(),
    }
}

//=========================================================================================
// Landing & Stage Sequencing
//=========================================================================================

/// Open a consent link.
///
/// Creates the session on first open (stamping the audit trail) and
/// returns the landing view on every open thereafter.
#[utoipa::path(
    get,
    path = "/consent/{token}",
    responses(
        (status = 200, description = "Session overview", body = LandingResponse),
    ),
    params(
        ("token" = String, Path, description = "Opaque session token from the consent link.")
    )
)]
pub async fn landing_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Json<LandingResponse> {
    let device = device_info_from(&headers);
    let entry = state.open_session(&token, device).await;
    let entry = entry.lock().await;
    Json(LandingResponse::from_session(&entry.session))
}

/// Advances the sequencer to the next stage if the current stage's gate
/// holds. Any timers scoped to the stage being left are cancelled.
pub async fn advance_stage_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<StageResponse> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    let now = state.clock.now();
    let leaving_checklist = entry.session.stage == ConsentStage::Checklist;
    let stage = entry
        .session
        .advance_stage(now)
        .map_err(refusal)?;

    entry.timers.cancel_all();
    if leaving_checklist {
        entry.session.checklist.cancel_playback();
        entry.session.checklist.cancel_recording();
    }
    info!(%token, %stage, "stage advanced");
    Ok(Json(StageResponse {
        stage: stage.to_string(),
    }))
}

//=========================================================================================
// Identity Verification
//=========================================================================================

/// Send a verification code to the patient's email.
#[utoipa::path(
    post,
    path = "/consent/{token}/verify/send",
    request_body = SendChallengeRequest,
    responses(
        (status = 200, description = "Challenge sent", body = ChallengeResponse),
        (status = 400, description = "Malformed email", body = RefusalResponse),
        (status = 404, description = "Unknown session", body = RefusalResponse)
    ),
    params(
        ("token" = String, Path, description = "Opaque session token.")
    )
)]
pub async fn send_challenge_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<SendChallengeRequest>,
) -> HandlerResult<ChallengeResponse> {
    let entry = require_session(&state, &token).await?;
    let (challenge, response) = {
        let mut entry = entry.lock().await;
        let now = state.clock.now();
        let challenge = entry
            .session
            .send_challenge(&req.email, &state.config.consent, now)
            .map_err(refusal)?;
        let response = ChallengeResponse {
            email: req.email.clone(),
            sent_at: challenge.sent_at,
            expires_at: challenge.expires_at,
            resend_cooldown_secs: entry.session.auth.resend_cooldown_remaining(now),
            attempts_remaining: entry.session.auth.attempts_remaining(&state.config.consent),
        };
        (challenge, response)
    };

    // Deliver outside the session lock; the challenge is already armed.
    if let Err(e) = state.delivery.deliver_code(&req.email, &challenge.code).await {
        error!(error = %e, "code delivery failed");
        return Err(delivery_failed());
    }
    Ok(Json(response))
}

/// Verify the code the patient entered.
#[utoipa::path(
    post,
    path = "/consent/{token}/verify/code",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Identity verified", body = VerifyResponse),
        (status = 401, description = "Wrong, expired, or exhausted code", body = RefusalResponse),
        (status = 404, description = "Unknown session", body = RefusalResponse)
    ),
    params(
        ("token" = String, Path, description = "Opaque session token.")
    )
)]
pub async fn verify_code_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<VerifyCodeRequest>,
) -> HandlerResult<VerifyResponse> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    let now = state.clock.now();
    entry
        .session
        .verify_code(&req.code, &state.config.consent, now)
        .map_err(refusal)?;
    info!(%token, "identity verified");
    Ok(Json(VerifyResponse { verified: true }))
}

pub async fn resend_challenge_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<ChallengeResponse> {
    let entry = require_session(&state, &token).await?;
    let (challenge, email, response) = {
        let mut entry = entry.lock().await;
        let now = state.clock.now();
        let challenge = entry
            .session
            .resend_challenge(&state.config.consent, now)
            .map_err(refusal)?;
        let email = entry.session.auth.email.clone().unwrap_or_default();
        let response = ChallengeResponse {
            email: email.clone(),
            sent_at: challenge.sent_at,
            expires_at: challenge.expires_at,
            resend_cooldown_secs: entry.session.auth.resend_cooldown_remaining(now),
            attempts_remaining: entry.session.auth.attempts_remaining(&state.config.consent),
        };
        (challenge, email, response)
    };

    if let Err(e) = state.delivery.deliver_code(&email, &challenge.code).await {
        error!(error = %e, "code delivery failed");
        return Err(delivery_failed());
    }
    Ok(Json(response))
}

/// Discards the outstanding challenge so a different address can be used.
pub async fn change_email_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<StageResponse> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    entry.session.auth.change_email().map_err(refusal)?;
    Ok(Json(StageResponse {
        stage: entry.session.stage.to_string(),
    }))
}

//=========================================================================================
// Document Gate
//=========================================================================================

pub async fn document_view_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<DocumentView> {
    let entry = require_session(&state, &token).await?;
    let entry = entry.lock().await;
    let now = state.clock.now();
    Ok(Json(DocumentView::from_session(
        &entry.session,
        &state.config.consent,
        now,
    )))
}

pub async fn document_scroll_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ScrollRequest>,
) -> HandlerResult<DocumentView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    let now = state.clock.now();
    entry.session.document.record_scroll(req.depth_percent);
    Ok(Json(DocumentView::from_session(
        &entry.session,
        &state.config.consent,
        now,
    )))
}

pub async fn document_advance_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<DocumentView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    let now = state.clock.now();
    entry
        .session
        .document
        .advance(&state.config.consent, now)
        .map_err(refusal)?;
    Ok(Json(DocumentView::from_session(
        &entry.session,
        &state.config.consent,
        now,
    )))
}

pub async fn document_retreat_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<DocumentView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    let now = state.clock.now();
    entry.session.document.retreat(now).map_err(refusal)?;
    Ok(Json(DocumentView::from_session(
        &entry.session,
        &state.config.consent,
        now,
    )))
}

//=========================================================================================
// Comprehension Checklist
//=========================================================================================

pub async fn checklist_view_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<ChecklistView> {
    let entry = require_session(&state, &token).await?;
    let entry = entry.lock().await;
    Ok(Json(ChecklistView::from_session(&entry.session)))
}

/// Begins (or replays) an item's narration. The simulated playback honors
/// the item's declared duration and completes the audio phase when it ends.
pub async fn checklist_audio_handler(
    State(state): State<Arc<AppState>>,
    Path((token, item_id)): Path<(String, u32)>,
) -> HandlerResult<AudioStartResponse> {
    let entry = require_session(&state, &token).await?;
    let mut guard = entry.lock().await;
    let now = state.clock.now();

    let already_playing = guard.session.checklist.active_playback() == Some(item_id);
    let duration_secs = guard
        .session
        .checklist
        .begin_audio(item_id, now)
        .map_err(refusal)?;

    if !already_playing {
        if let Some(stale) = guard.timers.audio.take() {
            stale.cancel();
        }
        guard.timers.audio = Some(spawn_audio_completion(
            state.clock.clone(),
            entry.clone(),
            item_id,
            duration_secs,
        ));
    }
    Ok(Json(AudioStartResponse {
        item_id,
        duration_secs,
    }))
}

/// Opens the video confirmation capture and arms the auto-stop cap.
pub async fn recording_start_handler(
    State(state): State<Arc<AppState>>,
    Path((token, item_id)): Path<(String, u32)>,
) -> HandlerResult<RecordingStartResponse> {
    let entry = require_session(&state, &token).await?;
    let mut guard = entry.lock().await;
    let now = state.clock.now();
    let max_duration_secs = guard
        .session
        .checklist
        .start_recording(item_id, &state.config.consent, now)
        .map_err(refusal)?;

    if let Some(stale) = guard.timers.recording.take() {
        stale.cancel();
    }
    guard.timers.recording = Some(spawn_recording_cap(
        state.clock.clone(),
        state.config.clone(),
        entry.clone(),
        item_id,
        max_duration_secs,
    ));
    Ok(Json(RecordingStartResponse {
        item_id,
        max_duration_secs,
    }))
}

pub async fn recording_stop_handler(
    State(state): State<Arc<AppState>>,
    Path((token, item_id)): Path<(String, u32)>,
) -> HandlerResult<ChecklistView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    let now = state.clock.now();
    entry
        .session
        .checklist
        .stop_recording(item_id, &state.config.consent, now)
        .map_err(refusal)?;
    // The capture ended; its cap is no longer valid.
    if let Some(timer) = entry.timers.recording.take() {
        timer.cancel();
    }
    Ok(Json(ChecklistView::from_session(&entry.session)))
}

pub async fn clip_accept_handler(
    State(state): State<Arc<AppState>>,
    Path((token, item_id)): Path<(String, u32)>,
) -> HandlerResult<ChecklistView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    let now = state.clock.now();
    entry
        .session
        .checklist
        .accept_clip(item_id, now)
        .map_err(refusal)?;
    info!(
        %token,
        item_id,
        total_completed = entry.session.checklist.total_completed,
        "checklist item completed"
    );
    Ok(Json(ChecklistView::from_session(&entry.session)))
}

pub async fn clip_retake_handler(
    State(state): State<Arc<AppState>>,
    Path((token, item_id)): Path<(String, u32)>,
) -> HandlerResult<ChecklistView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    entry
        .session
        .checklist
        .retake_clip(item_id)
        .map_err(refusal)?;
    Ok(Json(ChecklistView::from_session(&entry.session)))
}

//=========================================================================================
// Signature & Submission
//=========================================================================================

pub async fn signature_view_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<SignatureView> {
    let entry = require_session(&state, &token).await?;
    let entry = entry.lock().await;
    Ok(Json(SignatureView::from_session(&entry.session)))
}

pub async fn signature_stroke_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<SignatureView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    entry.session.signature.mark_stroke().map_err(refusal)?;
    Ok(Json(SignatureView::from_session(&entry.session)))
}

pub async fn signature_clear_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<SignatureView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    entry.session.signature.clear().map_err(refusal)?;
    Ok(Json(SignatureView::from_session(&entry.session)))
}

pub async fn signature_acknowledge_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<AcknowledgementRequest>,
) -> HandlerResult<SignatureView> {
    let entry = require_session(&state, &token).await?;
    let mut entry = entry.lock().await;
    entry
        .session
        .signature
        .set_acknowledgement(req.kind.into(), req.value)
        .map_err(refusal)?;
    Ok(Json(SignatureView::from_session(&entry.session)))
}

/// Submit the signed consent.
///
/// Checks the submission gate, then drives the backend round trip off the
/// request path; duplicate submits while in flight are acknowledged and
/// ignored. The client observes completion through the signature view.
#[utoipa::path(
    post,
    path = "/consent/{token}/signature/submit",
    responses(
        (status = 202, description = "Submission accepted and in flight", body = SubmitResponse),
        (status = 409, description = "Already submitted", body = RefusalResponse),
        (status = 412, description = "Missing signature or acknowledgements", body = RefusalResponse)
    ),
    params(
        ("token" = String, Path, description = "Opaque session token.")
    )
)]
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), Refusal> {
    let entry = require_session(&state, &token).await?;
    let (start, export) = {
        let mut guard = entry.lock().await;
        let now = state.clock.now();
        let start = guard.session.begin_submit(now).map_err(refusal)?;
        let export = CompletionExport::from_session(&guard.session);
        (start, export)
    };

    if start == SubmitStart::Started {
        let clock = state.clock.clone();
        let backend = state.submission.clone();
        let task_entry = entry.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            match backend.submit_consent(&export).await {
                Ok(()) => {
                    let mut entry = task_entry.lock().await;
                    match entry.session.complete_submit(clock.now()) {
                        Ok(()) => info!(token = %task_token, "consent submitted"),
                        Err(e) => warn!(token = %task_token, error = %e, "submission landed in unexpected state"),
                    }
                }
                Err(e) => {
                    error!(token = %task_token, error = %e, "submission backend failed");
                    let mut entry = task_entry.lock().await;
                    if let Err(abort_err) = entry.session.abort_submit() {
                        warn!(token = %task_token, error = %abort_err, "could not release submission guard");
                    }
                }
            }
        });
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            status: "submitting".to_string(),
        }),
    ))
}

/// Download the completion record.
///
/// Available once the consent has been submitted; contains the full page
/// timing sequence, attestation list, signature record, and audit trail.
#[utoipa::path(
    get,
    path = "/consent/{token}/export",
    responses(
        (status = 200, description = "Completion export"),
        (status = 409, description = "Not yet submitted", body = RefusalResponse),
        (status = 404, description = "Unknown session", body = RefusalResponse)
    ),
    params(
        ("token" = String, Path, description = "Opaque session token.")
    )
)]
pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> HandlerResult<CompletionExport> {
    let entry = require_session(&state, &token).await?;
    let entry = entry.lock().await;
    let export = entry.session.export().map_err(refusal)?;
    Ok(Json(export))
}
