//! crates/econsent_core/src/audit.rs
//!
//! Append-only audit trail of the consent interaction.
//!
//! Steps are appended by `begin_step` and closed in place by `end_step`;
//! a record is never removed or rewritten after it is closed. Closing an
//! already-closed step is a no-op, closing a step that was never begun is
//! a conflict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DeviceInfo;
use crate::error::{ConsentError, StateConflict};

/// One timestamped stage entry/exit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStep {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
}

impl AuditStep {
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// The audit slice of the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditTrail {
    pub opened_at: DateTime<Utc>,
    pub steps: Vec<AuditStep>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration_secs: Option<i64>,
    pub ip_address: Option<String>,
    pub device_info: DeviceInfo,
}

impl AuditTrail {
    pub fn new(now: DateTime<Utc>, device_info: DeviceInfo) -> Self {
        Self {
            opened_at: now,
            steps: Vec::new(),
            completed_at: None,
            total_duration_secs: None,
            ip_address: None,
            device_info,
        }
    }

    /// Appends an open step.
    pub fn begin_step(&mut self, name: impl Into<String>, now: DateTime<Utc>) {
        self.steps.push(AuditStep {
            name: name.into(),
            started_at: now,
            completed_at: None,
            duration_secs: None,
        });
    }

    /// Closes the most recent open step with this name, filling its
    /// completion timestamp and duration. No-op when every step with the
    /// name is already closed.
    pub fn end_step(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), ConsentError> {
        if let Some(step) = self
            .steps
            .iter_mut()
            .rev()
            .find(|s| s.name == name && s.is_open())
        {
            step.completed_at = Some(now);
            step.duration_secs = Some((now - step.started_at).num_seconds());
            return Ok(());
        }
        if self.steps.iter().any(|s| s.name == name) {
            return Ok(());
        }
        Err(StateConflict::StepNotBegun(name.to_string()).into())
    }

    /// Stamps the trail's completion. Idempotent: the first call wins.
    pub fn finalize(&mut self, now: DateTime<Utc>) {
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
            self.total_duration_secs = Some((now - self.opened_at).num_seconds());
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn has_open_step(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.name == name && s.is_open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    fn after(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn trail() -> AuditTrail {
        AuditTrail::new(t0(), DeviceInfo::default())
    }

    #[test]
    fn test_begin_and_end_fill_duration() {
        let mut trail = trail();
        trail.begin_step("document_review", after(10));
        trail.end_step("document_review", after(100)).unwrap();

        let step = &trail.steps[0];
        assert_eq!(step.completed_at, Some(after(100)));
        assert_eq!(step.duration_secs, Some(90));
    }

    #[test]
    fn test_ending_a_closed_step_is_a_noop() {
        let mut trail = trail();
        trail.begin_step("signature", after(1));
        trail.end_step("signature", after(2)).unwrap();
        trail.end_step("signature", after(50)).unwrap();

        assert_eq!(trail.steps[0].completed_at, Some(after(2)));
        assert_eq!(trail.steps[0].duration_secs, Some(1));
    }

    #[test]
    fn test_ending_an_unbegun_step_is_a_conflict() {
        let mut trail = trail();
        let err = trail.end_step("signature", after(1)).unwrap_err();
        assert_eq!(
            err,
            ConsentError::State(StateConflict::StepNotBegun("signature".into()))
        );
    }

    #[test]
    fn test_end_closes_most_recent_open_step_with_name() {
        let mut trail = trail();
        trail.begin_step("email_verification", after(1));
        trail.begin_step("email_verification", after(30));
        trail.end_step("email_verification", after(45)).unwrap();

        assert!(trail.steps[0].is_open());
        assert_eq!(trail.steps[1].completed_at, Some(after(45)));
    }

    #[test]
    fn test_steps_are_append_only() {
        let mut trail = trail();
        trail.begin_step("a", after(1));
        trail.begin_step("b", after(2));
        trail.end_step("a", after(3)).unwrap();
        trail.begin_step("c", after(4));

        let names: Vec<&str> = trail.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut trail = trail();
        trail.finalize(after(600));
        trail.finalize(after(900));

        assert_eq!(trail.completed_at, Some(after(600)));
        assert_eq!(trail.total_duration_secs, Some(600));
    }
}
