//! crates/econsent_core/src/export.rs
//!
//! The completion export: a structured record sufficient to reconstruct the
//! entire session timeline, consumed by the collaborator that generates the
//! downloadable consent document.

use serde::{Deserialize, Serialize};

use crate::audit::AuditTrail;
use crate::checklist::ChecklistItem;
use crate::document::PageTiming;
use crate::domain::{PatientProfile, StudyInfo};
use crate::session::ConsentSession;
use crate::signature::SignatureRecord;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionExport {
    pub session_token: String,
    pub patient: PatientProfile,
    pub study: StudyInfo,
    pub page_timings: Vec<PageTiming>,
    pub total_reading_time_secs: i64,
    pub checklist_items: Vec<ChecklistItem>,
    pub signature: SignatureRecord,
    pub audit: AuditTrail,
}

impl CompletionExport {
    /// Snapshots a session into its completion record. Gating on submission
    /// is the caller's concern (`ConsentSession::export`); the submission
    /// backend also uses this on the in-flight session.
    pub fn from_session(session: &ConsentSession) -> Self {
        Self {
            session_token: session.session_token.clone(),
            patient: session.patient.clone(),
            study: session.study.clone(),
            page_timings: session.document.page_timings.clone(),
            total_reading_time_secs: session.document.total_reading_time_secs,
            checklist_items: session.checklist.items.clone(),
            signature: session.signature.clone(),
            audit: session.audit.clone(),
        }
    }
}
