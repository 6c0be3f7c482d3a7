//! crates/econsent_core/src/signature.rs
//!
//! Signature capture and the terminal submission transition.
//!
//! The engine tracks mark presence and the two acknowledgements; actual
//! raster capture of the drawn mark is a presentation concern. Submission
//! is dual-gated and one-way: once `submitted` is set it never reverts, and
//! an in-flight guard swallows duplicate submits while the backend round
//! trip is pending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConsentError, GateUnsatisfied, StateConflict};

/// The two acknowledgement checkboxes gating submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgementKind {
    Consent,
    Terms,
}

/// A submission precondition that does not hold yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionRequirement {
    Signature,
    ConsentAcknowledgement,
    TermsAcknowledgement,
}

impl std::fmt::Display for SubmissionRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Signature => "signature",
            Self::ConsentAcknowledgement => "consent acknowledgement",
            Self::TermsAcknowledgement => "terms acknowledgement",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of `begin_submit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitStart {
    Started,
    /// A duplicate invocation arrived while a submission was pending; the
    /// caller should do nothing.
    AlreadyInFlight,
}

/// The signature slice of the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub mark_present: bool,
    pub stroke_count: u32,
    pub signer_name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub consent_acknowledged: bool,
    pub terms_acknowledged: bool,
    pub submitted: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    submission_in_flight: bool,
}

impl SignatureRecord {
    pub fn new(signer_name: impl Into<String>) -> Self {
        Self {
            mark_present: false,
            stroke_count: 0,
            signer_name: signer_name.into(),
            timestamp: None,
            consent_acknowledged: false,
            terms_acknowledged: false,
            submitted: false,
            submitted_at: None,
            submission_in_flight: false,
        }
    }

    /// Registers one drawing input sample. The first stroke latches
    /// `mark_present`; later strokes only grow the sample count.
    pub fn mark_stroke(&mut self) -> Result<(), ConsentError> {
        self.guard_mutable()?;
        self.mark_present = true;
        self.stroke_count = self.stroke_count.saturating_add(1);
        Ok(())
    }

    /// Erases the mark. Allowed any time before submission begins.
    pub fn clear(&mut self) -> Result<(), ConsentError> {
        self.guard_mutable()?;
        self.mark_present = false;
        self.stroke_count = 0;
        Ok(())
    }

    pub fn set_acknowledgement(
        &mut self,
        kind: AcknowledgementKind,
        value: bool,
    ) -> Result<(), ConsentError> {
        self.guard_mutable()?;
        match kind {
            AcknowledgementKind::Consent => self.consent_acknowledged = value,
            AcknowledgementKind::Terms => self.terms_acknowledged = value,
        }
        Ok(())
    }

    /// The submission gate. Reports every missing precondition at once so
    /// the caller can surface the full list.
    pub fn can_submit(&self) -> Result<(), GateUnsatisfied> {
        let mut missing = Vec::new();
        if !self.mark_present {
            missing.push(SubmissionRequirement::Signature);
        }
        if !self.consent_acknowledged {
            missing.push(SubmissionRequirement::ConsentAcknowledgement);
        }
        if !self.terms_acknowledged {
            missing.push(SubmissionRequirement::TermsAcknowledgement);
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GateUnsatisfied::SubmissionRequirementsMissing { missing })
        }
    }

    /// Starts the submission: checks the gate, stamps the signature
    /// timestamp, and raises the in-flight guard. Duplicate invocations
    /// while in flight are ignored.
    pub fn begin_submit(&mut self, now: DateTime<Utc>) -> Result<SubmitStart, ConsentError> {
        if self.submitted {
            return Err(StateConflict::AlreadySubmitted.into());
        }
        if self.submission_in_flight {
            return Ok(SubmitStart::AlreadyInFlight);
        }
        self.can_submit()?;
        self.timestamp = Some(now);
        self.submission_in_flight = true;
        Ok(SubmitStart::Started)
    }

    /// Lands the submission: terminal, idempotent once submitted.
    pub fn complete_submit(&mut self, now: DateTime<Utc>) -> Result<(), ConsentError> {
        if self.submitted {
            return Ok(());
        }
        if !self.submission_in_flight {
            return Err(StateConflict::NoSubmissionInFlight.into());
        }
        self.submission_in_flight = false;
        self.submitted = true;
        self.submitted_at = Some(now);
        Ok(())
    }

    /// Lowers the in-flight guard after a failed or cancelled backend call
    /// so the patient may try again.
    pub fn abort_submit(&mut self) -> Result<(), ConsentError> {
        if self.submitted {
            return Err(StateConflict::AlreadySubmitted.into());
        }
        if !self.submission_in_flight {
            return Err(StateConflict::NoSubmissionInFlight.into());
        }
        self.submission_in_flight = false;
        Ok(())
    }

    pub fn is_in_flight(&self) -> bool {
        self.submission_in_flight
    }

    fn guard_mutable(&self) -> Result<(), StateConflict> {
        if self.submitted {
            return Err(StateConflict::AlreadySubmitted);
        }
        if self.submission_in_flight {
            return Err(StateConflict::SubmissionInFlight);
        }
        Ok(())
    }
}
