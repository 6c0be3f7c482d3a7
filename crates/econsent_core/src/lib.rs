pub mod audit;
pub mod checklist;
pub mod config;
pub mod document;
pub mod domain;
pub mod error;
pub mod export;
pub mod identity;
pub mod ports;
pub mod session;
pub mod signature;

pub use audit::{AuditStep, AuditTrail};
pub use checklist::{CandidateClip, ChecklistItem, ChecklistProgress};
pub use config::{ChecklistItemSpec, ConsentConfig};
pub use document::{AdvanceOutcome, DocumentProgress, PageTiming};
pub use domain::{DeviceInfo, PatientProfile, StudyInfo};
pub use error::{
    AuthError, ConsentError, ConsentResult, GateUnsatisfied, StateConflict, ValidationError,
};
pub use export::CompletionExport;
pub use identity::{AuthPhase, AuthState, OtpChallenge, REJECTED_CODE_SENTINEL};
pub use ports::{Clock, CodeDeliveryService, PortError, PortResult, SubmissionBackend};
pub use session::{ConsentSession, ConsentStage, ErrorReason};
pub use signature::{AcknowledgementKind, SignatureRecord, SubmissionRequirement, SubmitStart};
