//! crates/econsent_core/src/error.rs
//!
//! Defines the refusal taxonomy for the consent workflow engine.
//!
//! Every gating failure is an ordinary `Err` value carrying a structured
//! reason the caller can render back to the patient; none of these abort the
//! session. The four groups mirror the recoverable conditions of the
//! workflow: malformed input, authentication failures, unsatisfied stage
//! gates, and operations applied in the wrong state.

use crate::signature::SubmissionRequirement;

/// Input that fails syntactic validation before it reaches any state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("'{0}' is not a valid email address")]
    MalformedEmail(String),

    #[error("verification codes must be exactly {expected} digits")]
    MalformedCode { expected: usize },
}

/// Failures of the one-time-code challenge flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("incorrect verification code ({attempts_remaining} attempts remaining)")]
    IncorrectCode { attempts_remaining: u32 },

    /// Terminal: the maximum number of mismatches has been reached and no
    /// further codes will be accepted for this session.
    #[error("verification attempts exhausted")]
    AttemptsExhausted,

    #[error("the verification code has expired; request a new one")]
    ChallengeExpired,

    #[error("a new code can be requested in {remaining_secs}s")]
    ResendCoolingDown { remaining_secs: i64 },
}

/// A stage-transition predicate that does not hold yet. The caller re-prompts
/// the patient with the reason; nothing here is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateUnsatisfied {
    #[error("insufficient dwell time ({remaining_secs} seconds remaining)")]
    InsufficientDwell { remaining_secs: i64 },

    #[error("must scroll to end")]
    MustScrollToEnd,

    #[error("audio for item {item_id} must be played before recording")]
    AudioPhaseIncomplete { item_id: u32 },

    #[error("identity has not been verified")]
    IdentityNotVerified,

    #[error("the consent document has not been read to the end")]
    DocumentIncomplete,

    #[error("{remaining} checklist item(s) still incomplete")]
    ChecklistIncomplete { remaining: usize },

    #[error("cannot submit: missing {}", format_requirements(.missing))]
    SubmissionRequirementsMissing { missing: Vec<SubmissionRequirement> },
}

fn format_requirements(missing: &[SubmissionRequirement]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// An operation that is meaningless in the session's current state, e.g.
/// accepting a clip when none is held or closing an audit step that was
/// never opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateConflict {
    #[error("identity is already verified")]
    AlreadyVerified,

    #[error("no verification challenge is outstanding")]
    NoChallengeOutstanding,

    #[error("already on the first page")]
    AtFirstPage,

    #[error("the document has already been read to completion")]
    DocumentAlreadyCompleted,

    #[error("unknown checklist item {0}")]
    UnknownItem(u32),

    #[error("checklist item {0} is already completed")]
    ItemAlreadyCompleted(u32),

    #[error("an audio playback is already in progress")]
    PlaybackInProgress,

    #[error("no audio playback is in progress for item {0}")]
    NoActivePlayback(u32),

    #[error("a recording is already in progress")]
    RecordingInProgress,

    #[error("no recording is in progress for item {0}")]
    NoActiveRecording(u32),

    #[error("no candidate clip is held for item {0}")]
    NoClipHeld(u32),

    #[error("a candidate clip for item {0} is awaiting accept or retake")]
    ClipAwaitingReview(u32),

    #[error("the consent has already been submitted")]
    AlreadySubmitted,

    #[error("a submission is already in flight")]
    SubmissionInFlight,

    #[error("no submission is in flight")]
    NoSubmissionInFlight,

    #[error("the consent record has not been submitted")]
    NotSubmitted,

    #[error("audit step '{0}' was never begun")]
    StepNotBegun(String),

    #[error("the session is already complete")]
    SessionAlreadyComplete,
}

/// The primary error type returned by every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsentError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("verification failed: {0}")]
    Auth(#[from] AuthError),

    #[error("gate unsatisfied: {0}")]
    Gate(#[from] GateUnsatisfied),

    #[error("state conflict: {0}")]
    State(#[from] StateConflict),
}

/// A convenience type alias for `Result<T, ConsentError>`.
pub type ConsentResult<T> = Result<T, ConsentError>;
