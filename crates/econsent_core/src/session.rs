//! crates/econsent_core/src/session.rs
//!
//! The session state store: single owner of every workflow slice, plus the
//! stage sequencing rules the external sequencer consults.
//!
//! Components never hold private copies of their slice; everything lives
//! here and is mutated in place under one logical actor. Stage transitions
//! are gated on the owning component's predicate and mirrored into the
//! audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditTrail;
use crate::checklist::ChecklistProgress;
use crate::config::ConsentConfig;
use crate::document::DocumentProgress;
use crate::domain::{DeviceInfo, PatientProfile, StudyInfo};
use crate::error::{ConsentError, GateUnsatisfied, StateConflict};
use crate::export::CompletionExport;
use crate::identity::{AuthState, OtpChallenge};
use crate::signature::{SignatureRecord, SubmitStart};

/// Audit step name for the identity-verification stage. Opened on every
/// challenge send, closed when a code verifies.
pub const STEP_EMAIL_VERIFICATION: &str = "email_verification";
pub const STEP_DOCUMENT_REVIEW: &str = "document_review";
pub const STEP_COMPREHENSION_CHECKLIST: &str = "comprehension_checklist";
pub const STEP_SIGNATURE: &str = "signature";

/// The screens of the consent flow, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentStage {
    Landing,
    VerifyIdentity,
    ReadDocument,
    Checklist,
    Signature,
    Complete,
}

impl ConsentStage {
    /// The audit step covering a stay in this stage. Identity verification
    /// is logged per challenge rather than per stage entry, and the landing
    /// and terminal screens carry no step of their own.
    fn audit_step_name(&self) -> Option<&'static str> {
        match self {
            Self::ReadDocument => Some(STEP_DOCUMENT_REVIEW),
            Self::Checklist => Some(STEP_COMPREHENSION_CHECKLIST),
            Self::Signature => Some(STEP_SIGNATURE),
            Self::Landing | Self::VerifyIdentity | Self::Complete => None,
        }
    }
}

impl std::fmt::Display for ConsentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Landing => "landing",
            Self::VerifyIdentity => "verify-identity",
            Self::ReadDocument => "read-document",
            Self::Checklist => "comprehension-checklist",
            Self::Signature => "sign",
            Self::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

/// Reasons surfaced on the error terminal of the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    Expired,
    Invalid,
    AlreadyCompleted,
    Generic,
}

/// One consent attempt: reference data plus the four stage sub-states and
/// the audit trail.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsentSession {
    pub session_token: String,
    pub patient: PatientProfile,
    pub study: StudyInfo,
    pub stage: ConsentStage,
    pub auth: AuthState,
    pub document: DocumentProgress,
    pub checklist: ChecklistProgress,
    pub signature: SignatureRecord,
    pub audit: AuditTrail,
}

impl ConsentSession {
    /// Opens a fresh session for one consent attempt. `now` becomes the
    /// audit trail's `opened_at`.
    pub fn open(
        session_token: impl Into<String>,
        patient: PatientProfile,
        study: StudyInfo,
        cfg: &ConsentConfig,
        device_info: DeviceInfo,
        now: DateTime<Utc>,
    ) -> Self {
        let signature = SignatureRecord::new(patient.patient_name.clone());
        Self {
            session_token: session_token.into(),
            patient,
            study,
            stage: ConsentStage::Landing,
            auth: AuthState::default(),
            document: DocumentProgress::new(cfg),
            checklist: ChecklistProgress::new(cfg),
            signature,
            audit: AuditTrail::new(now, device_info),
        }
    }

    /// Moves to the next stage if the current stage's gate holds. Stage
    /// audit steps are closed on exit and opened on entry.
    pub fn advance_stage(&mut self, now: DateTime<Utc>) -> Result<ConsentStage, ConsentError> {
        let next = match self.stage {
            ConsentStage::Landing => ConsentStage::VerifyIdentity,
            ConsentStage::VerifyIdentity => {
                if !self.auth.verified {
                    return Err(GateUnsatisfied::IdentityNotVerified.into());
                }
                ConsentStage::ReadDocument
            }
            ConsentStage::ReadDocument => {
                if !self.document.completed {
                    return Err(GateUnsatisfied::DocumentIncomplete.into());
                }
                ConsentStage::Checklist
            }
            ConsentStage::Checklist => {
                if !self.checklist.all_completed {
                    return Err(GateUnsatisfied::ChecklistIncomplete {
                        remaining: self.checklist.remaining(),
                    }
                    .into());
                }
                ConsentStage::Signature
            }
            ConsentStage::Signature => {
                if !self.signature.submitted {
                    return Err(StateConflict::NotSubmitted.into());
                }
                ConsentStage::Complete
            }
            ConsentStage::Complete => {
                return Err(StateConflict::SessionAlreadyComplete.into());
            }
        };

        if let Some(name) = self.stage.audit_step_name() {
            self.audit.end_step(name, now)?;
        }
        self.stage = next;
        if let Some(name) = next.audit_step_name() {
            self.audit.begin_step(name, now);
        }
        match next {
            // Entering the document starts the first page's viewing.
            ConsentStage::ReadDocument => self.document.enter(now),
            ConsentStage::Complete => self.audit.finalize(now),
            _ => {}
        }
        Ok(next)
    }

    // ── Identity wrappers (audit side effects) ───────────────────────────

    /// Sends a challenge and opens the `email_verification` audit step.
    pub fn send_challenge(
        &mut self,
        email: &str,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<OtpChallenge, ConsentError> {
        let challenge = self.auth.send_challenge(email, cfg, now)?;
        self.audit.begin_step(STEP_EMAIL_VERIFICATION, now);
        Ok(challenge)
    }

    /// Re-sends the challenge: the previous audit step is closed and a
    /// fresh one opened, so the trail shows one step per delivered code.
    pub fn resend_challenge(
        &mut self,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<OtpChallenge, ConsentError> {
        let challenge = self.auth.resend(cfg, now)?;
        self.audit.end_step(STEP_EMAIL_VERIFICATION, now)?;
        self.audit.begin_step(STEP_EMAIL_VERIFICATION, now);
        Ok(challenge)
    }

    /// Verifies a code; success closes the `email_verification` step.
    pub fn verify_code(
        &mut self,
        code: &str,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<(), ConsentError> {
        self.auth.verify_code(code, cfg, now)?;
        self.audit.end_step(STEP_EMAIL_VERIFICATION, now)?;
        Ok(())
    }

    // ── Submission wrappers ──────────────────────────────────────────────

    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Result<SubmitStart, ConsentError> {
        self.signature.begin_submit(now)
    }

    /// Lands the submission and performs the terminal transition: the
    /// signature step is closed, the stage moves to `Complete`, and the
    /// audit trail is finalized.
    pub fn complete_submit(&mut self, now: DateTime<Utc>) -> Result<(), ConsentError> {
        self.signature.complete_submit(now)?;
        if self.stage == ConsentStage::Signature {
            if self.audit.has_open_step(STEP_SIGNATURE) {
                self.audit.end_step(STEP_SIGNATURE, now)?;
            }
            self.stage = ConsentStage::Complete;
        }
        self.audit.finalize(now);
        Ok(())
    }

    pub fn abort_submit(&mut self) -> Result<(), ConsentError> {
        self.signature.abort_submit()
    }

    /// The completion record for the downstream document generator.
    /// Available only once the consent has been submitted.
    pub fn export(&self) -> Result<CompletionExport, ConsentError> {
        if !self.signature.submitted {
            return Err(StateConflict::NotSubmitted.into());
        }
        Ok(CompletionExport::from_session(self))
    }

    pub fn is_complete(&self) -> bool {
        self.stage == ConsentStage::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChecklistItemSpec;
    use chrono::TimeZone;

    fn cfg() -> ConsentConfig {
        ConsentConfig {
            total_pages: 2,
            checklist_items: vec![ChecklistItemSpec::new(1, "I understand the purpose", 3)],
            ..ConsentConfig::default()
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn after(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn patient() -> PatientProfile {
        PatientProfile {
            patient_id: "SITE-001-123".into(),
            patient_name: "John Doe".into(),
            email: "john.doe@example.com".into(),
            language: "English".into(),
        }
    }

    fn study() -> StudyInfo {
        StudyInfo {
            protocol_id: "CARDIO-2024-01".into(),
            protocol_name: "Cardiovascular Health Study".into(),
            version: "v2.0".into(),
            site_code: "USA-NYC-001".into(),
            site_name: "Apollo Hospital Delhi".into(),
            investigator_name: "Dr. Sarah Johnson".into(),
        }
    }

    fn session() -> ConsentSession {
        ConsentSession::open(
            "tok-1",
            patient(),
            study(),
            &cfg(),
            DeviceInfo::default(),
            t0(),
        )
    }

    #[test]
    fn test_stage_gates_hold_in_order() {
        let cfg = cfg();
        let mut s = session();
        assert_eq!(s.stage, ConsentStage::Landing);

        // Landing always advances.
        assert_eq!(s.advance_stage(after(1)).unwrap(), ConsentStage::VerifyIdentity);

        // Identity gate.
        let err = s.advance_stage(after(2)).unwrap_err();
        assert_eq!(err, ConsentError::Gate(GateUnsatisfied::IdentityNotVerified));
        s.send_challenge("a@b.co", &cfg, after(3)).unwrap();
        s.verify_code("123456", &cfg, after(10)).unwrap();
        assert_eq!(s.advance_stage(after(11)).unwrap(), ConsentStage::ReadDocument);

        // Document gate.
        let err = s.advance_stage(after(12)).unwrap_err();
        assert_eq!(err, ConsentError::Gate(GateUnsatisfied::DocumentIncomplete));
        for _ in 0..2 {
            s.document.record_scroll(100);
            let now = s
                .document
                .page_timings
                .last()
                .map(|t| t.timestamp)
                .unwrap_or(after(11))
                + chrono::Duration::seconds(15);
            s.document.advance(&cfg, now).unwrap();
        }
        assert!(s.document.completed);
        assert_eq!(s.advance_stage(after(60)).unwrap(), ConsentStage::Checklist);

        // Checklist gate.
        let err = s.advance_stage(after(61)).unwrap_err();
        assert_eq!(
            err,
            ConsentError::Gate(GateUnsatisfied::ChecklistIncomplete { remaining: 1 })
        );
        s.checklist.begin_audio(1, after(62)).unwrap();
        s.checklist.complete_audio(1, after(65)).unwrap();
        s.checklist.start_recording(1, &cfg, after(66)).unwrap();
        s.checklist.stop_recording(1, &cfg, after(76)).unwrap();
        s.checklist.accept_clip(1, after(77)).unwrap();
        assert_eq!(s.advance_stage(after(78)).unwrap(), ConsentStage::Signature);

        // Signature gate: not submitted yet.
        let err = s.advance_stage(after(79)).unwrap_err();
        assert_eq!(err, ConsentError::State(StateConflict::NotSubmitted));
    }

    #[test]
    fn test_challenge_audit_step_opens_and_closes() {
        let cfg = cfg();
        let mut s = session();
        s.advance_stage(after(1)).unwrap();

        s.send_challenge("a@b.co", &cfg, after(2)).unwrap();
        assert!(s.audit.has_open_step(STEP_EMAIL_VERIFICATION));

        s.verify_code("123456", &cfg, after(9)).unwrap();
        assert!(!s.audit.has_open_step(STEP_EMAIL_VERIFICATION));
        let step = s
            .audit
            .steps
            .iter()
            .find(|st| st.name == STEP_EMAIL_VERIFICATION)
            .unwrap();
        assert_eq!(step.duration_secs, Some(7));
    }

    #[test]
    fn test_resend_closes_previous_step_and_opens_new() {
        let mut big = cfg();
        big.resend_cooldown_secs = 5;
        let mut s = session();
        s.advance_stage(after(1)).unwrap();

        s.send_challenge("a@b.co", &big, after(2)).unwrap();
        s.resend_challenge(&big, after(10)).unwrap();

        let steps: Vec<&crate::audit::AuditStep> = s
            .audit
            .steps
            .iter()
            .filter(|st| st.name == STEP_EMAIL_VERIFICATION)
            .collect();
        assert_eq!(steps.len(), 2);
        assert!(!steps[0].is_open());
        assert!(steps[1].is_open());
    }

    #[test]
    fn test_complete_submit_finalizes_session() {
        let cfg = cfg();
        let mut s = session();
        // Drive straight to the signature stage through the component slices.
        s.advance_stage(after(1)).unwrap();
        s.send_challenge("a@b.co", &cfg, after(2)).unwrap();
        s.verify_code("123456", &cfg, after(3)).unwrap();
        s.advance_stage(after(4)).unwrap();
        s.document.record_scroll(100);
        s.document.advance(&cfg, after(19)).unwrap();
        s.document.record_scroll(100);
        s.document.advance(&cfg, after(34)).unwrap();
        s.advance_stage(after(35)).unwrap();
        s.checklist.begin_audio(1, after(36)).unwrap();
        s.checklist.complete_audio(1, after(39)).unwrap();
        s.checklist.start_recording(1, &cfg, after(40)).unwrap();
        s.checklist.stop_recording(1, &cfg, after(50)).unwrap();
        s.checklist.accept_clip(1, after(51)).unwrap();
        s.advance_stage(after(52)).unwrap();

        s.signature.mark_stroke().unwrap();
        s.signature
            .set_acknowledgement(crate::signature::AcknowledgementKind::Consent, true)
            .unwrap();
        s.signature
            .set_acknowledgement(crate::signature::AcknowledgementKind::Terms, true)
            .unwrap();
        assert_eq!(s.begin_submit(after(53)).unwrap(), SubmitStart::Started);
        s.complete_submit(after(55)).unwrap();

        assert!(s.is_complete());
        assert!(s.audit.is_finalized());
        assert_eq!(s.audit.total_duration_secs, Some(55));
        assert!(!s.audit.has_open_step(STEP_SIGNATURE));

        // Terminal: the sequencer cannot advance further.
        let err = s.advance_stage(after(56)).unwrap_err();
        assert_eq!(err, ConsentError::State(StateConflict::SessionAlreadyComplete));
    }

    #[test]
    fn test_export_requires_submission() {
        let s = session();
        let err = s.export().unwrap_err();
        assert_eq!(err, ConsentError::State(StateConflict::NotSubmitted));
    }

    #[test]
    fn test_stage_names_match_sequencer_routes() {
        assert_eq!(ConsentStage::Landing.to_string(), "landing");
        assert_eq!(ConsentStage::VerifyIdentity.to_string(), "verify-identity");
        assert_eq!(ConsentStage::ReadDocument.to_string(), "read-document");
        assert_eq!(ConsentStage::Checklist.to_string(), "comprehension-checklist");
        assert_eq!(ConsentStage::Signature.to_string(), "sign");
        assert_eq!(ConsentStage::Complete.to_string(), "complete");
    }
}
