//! crates/econsent_core/src/identity.rs
//!
//! Email-based one-time-code challenge/response state machine.
//!
//! States: `NoChallenge → ChallengeSent → Verified` (terminal), with
//! `ChallengeSent` self-looping on failed attempts and a `LockedOut`
//! terminal once the allowed attempts are spent. `verified` is monotonic: once
//! set it is never reset within a session.

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::ConsentConfig;
use crate::error::{AuthError, ConsentError, StateConflict, ValidationError};

/// Reserved code that always counts as a mismatch, so the failure path can
/// be exercised without a real delivery backend.
pub const REJECTED_CODE_SENTINEL: &str = "000000";

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"));

/// Where the verifier currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthPhase {
    NoChallenge,
    ChallengeSent,
    Verified,
    LockedOut,
}

/// A freshly generated challenge, handed to the delivery port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub code: String,
    pub sent_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The identity-verification slice of the session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthState {
    pub email: Option<String>,
    pub challenge_sent: bool,
    pub code: Option<String>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub expiry: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub resend_available_at: Option<DateTime<Utc>>,
    pub locked_out: bool,
}

impl AuthState {
    pub fn phase(&self) -> AuthPhase {
        if self.locked_out {
            AuthPhase::LockedOut
        } else if self.verified {
            AuthPhase::Verified
        } else if self.challenge_sent {
            AuthPhase::ChallengeSent
        } else {
            AuthPhase::NoChallenge
        }
    }

    /// Generates and arms a fresh challenge for `email`.
    ///
    /// Clears the attempt counter, stamps `sent_at`/`expiry`, and starts the
    /// resend cooldown. The returned challenge is the caller's to deliver.
    pub fn send_challenge(
        &mut self,
        email: &str,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<OtpChallenge, ConsentError> {
        if self.verified {
            return Err(StateConflict::AlreadyVerified.into());
        }
        if self.locked_out {
            return Err(AuthError::AttemptsExhausted.into());
        }
        if !EMAIL_SHAPE.is_match(email) {
            return Err(ValidationError::MalformedEmail(email.to_string()).into());
        }

        let code = generate_code(cfg.otp_code_length);
        let expires_at = now + chrono::Duration::seconds(cfg.otp_expiry_secs);

        self.email = Some(email.to_string());
        self.challenge_sent = true;
        self.code = Some(code.clone());
        self.attempts = 0;
        self.sent_at = Some(now);
        self.expiry = Some(expires_at);
        self.resend_available_at = Some(now + chrono::Duration::seconds(cfg.resend_cooldown_secs));

        Ok(OtpChallenge {
            code,
            sent_at: now,
            expires_at,
        })
    }

    /// Re-issues the challenge to the stored email once the cooldown lapsed.
    pub fn resend(
        &mut self,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<OtpChallenge, ConsentError> {
        if self.verified {
            return Err(StateConflict::AlreadyVerified.into());
        }
        if !self.challenge_sent {
            return Err(StateConflict::NoChallengeOutstanding.into());
        }
        let remaining = self.resend_cooldown_remaining(now);
        if remaining > 0 {
            return Err(AuthError::ResendCoolingDown {
                remaining_secs: remaining,
            }
            .into());
        }
        let email = self
            .email
            .clone()
            .ok_or(StateConflict::NoChallengeOutstanding)?;
        self.send_challenge(&email, cfg, now)
    }

    /// Checks `code` against the outstanding challenge.
    ///
    /// Expired challenges are rejected even for well-formed codes, and the
    /// final allowed mismatch transitions to `LockedOut`, after
    /// which every call fails with `AttemptsExhausted`.
    pub fn verify_code(
        &mut self,
        code: &str,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<(), ConsentError> {
        if self.verified {
            // Monotonic terminal state; re-verification is a no-op.
            return Ok(());
        }
        if self.locked_out {
            return Err(AuthError::AttemptsExhausted.into());
        }
        if !self.challenge_sent {
            return Err(StateConflict::NoChallengeOutstanding.into());
        }
        if code.len() != cfg.otp_code_length || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::MalformedCode {
                expected: cfg.otp_code_length,
            }
            .into());
        }
        if matches!(self.expiry, Some(expiry) if now > expiry) {
            return Err(AuthError::ChallengeExpired.into());
        }

        if code == REJECTED_CODE_SENTINEL {
            self.attempts += 1;
            if self.attempts >= cfg.max_otp_attempts {
                self.locked_out = true;
                return Err(AuthError::AttemptsExhausted.into());
            }
            return Err(AuthError::IncorrectCode {
                attempts_remaining: cfg.max_otp_attempts - self.attempts,
            }
            .into());
        }

        self.verified = true;
        self.verified_at = Some(now);
        Ok(())
    }

    /// Discards the outstanding challenge so a different address can be
    /// used. Only allowed before verification; lockout is not cleared.
    pub fn change_email(&mut self) -> Result<(), ConsentError> {
        if self.verified {
            return Err(StateConflict::AlreadyVerified.into());
        }
        if self.locked_out {
            return Err(AuthError::AttemptsExhausted.into());
        }
        self.email = None;
        self.challenge_sent = false;
        self.code = None;
        self.attempts = 0;
        self.expiry = None;
        self.sent_at = None;
        self.resend_available_at = None;
        Ok(())
    }

    /// Seconds until another code may be requested, zero when available.
    pub fn resend_cooldown_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.resend_available_at
            .map(|at| (at - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    /// Seconds until the outstanding code expires, zero when no challenge or
    /// already past expiry.
    pub fn expiry_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.expiry
            .map(|at| (at - now).num_seconds().max(0))
            .unwrap_or(0)
    }

    pub fn attempts_remaining(&self, cfg: &ConsentConfig) -> u32 {
        cfg.max_otp_attempts.saturating_sub(self.attempts)
    }
}

fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> ConsentConfig {
        ConsentConfig::default()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_send_challenge_arms_expiry_and_cooldown() {
        let mut auth = AuthState::default();
        let challenge = auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();

        assert_eq!(auth.phase(), AuthPhase::ChallengeSent);
        assert_eq!(challenge.code.len(), 6);
        assert!(challenge.code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(
            challenge.expires_at,
            t0() + chrono::Duration::seconds(300)
        );
        assert_eq!(auth.resend_cooldown_remaining(t0()), 60);
        assert_eq!(auth.expiry_remaining(t0()), 300);
    }

    #[test]
    fn test_malformed_email_is_refused() {
        let mut auth = AuthState::default();
        for bad in ["", "nodomain", "a@b", "a b@c.de", "a@b c.de"] {
            let err = auth.send_challenge(bad, &cfg(), t0()).unwrap_err();
            assert!(matches!(
                err,
                ConsentError::Validation(ValidationError::MalformedEmail(_))
            ));
        }
        assert_eq!(auth.phase(), AuthPhase::NoChallenge);
    }

    #[test]
    fn test_sentinel_counts_attempts_then_valid_code_verifies() {
        let mut auth = AuthState::default();
        auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();

        let err = auth.verify_code(REJECTED_CODE_SENTINEL, &cfg(), t0()).unwrap_err();
        assert_eq!(
            err,
            ConsentError::Auth(AuthError::IncorrectCode {
                attempts_remaining: 2
            })
        );
        assert_eq!(auth.attempts, 1);
        assert_eq!(auth.phase(), AuthPhase::ChallengeSent);

        auth.verify_code("123456", &cfg(), t0()).unwrap();
        assert!(auth.verified);
        assert_eq!(auth.phase(), AuthPhase::Verified);
    }

    #[test]
    fn test_third_mismatch_locks_out_and_fourth_attempt_never_succeeds() {
        let mut auth = AuthState::default();
        auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();

        for _ in 0..2 {
            let err = auth.verify_code(REJECTED_CODE_SENTINEL, &cfg(), t0()).unwrap_err();
            assert!(matches!(
                err,
                ConsentError::Auth(AuthError::IncorrectCode { .. })
            ));
        }
        let err = auth.verify_code(REJECTED_CODE_SENTINEL, &cfg(), t0()).unwrap_err();
        assert_eq!(err, ConsentError::Auth(AuthError::AttemptsExhausted));
        assert_eq!(auth.phase(), AuthPhase::LockedOut);

        // A structurally valid code must not slip through after lockout.
        let err = auth.verify_code("123456", &cfg(), t0()).unwrap_err();
        assert_eq!(err, ConsentError::Auth(AuthError::AttemptsExhausted));
        assert!(!auth.verified);
    }

    #[test]
    fn test_expired_challenge_rejects_valid_code() {
        let mut auth = AuthState::default();
        auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();

        let late = t0() + chrono::Duration::seconds(301);
        let err = auth.verify_code("123456", &cfg(), late).unwrap_err();
        assert_eq!(err, ConsentError::Auth(AuthError::ChallengeExpired));
        assert!(!auth.verified);
    }

    #[test]
    fn test_malformed_code_does_not_consume_attempts() {
        let mut auth = AuthState::default();
        auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();

        for bad in ["12345", "1234567", "12345a", ""] {
            let err = auth.verify_code(bad, &cfg(), t0()).unwrap_err();
            assert!(matches!(
                err,
                ConsentError::Validation(ValidationError::MalformedCode { expected: 6 })
            ));
        }
        assert_eq!(auth.attempts, 0);
    }

    #[test]
    fn test_resend_respects_cooldown_and_resets_attempts() {
        let mut auth = AuthState::default();
        auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();
        auth.verify_code(REJECTED_CODE_SENTINEL, &cfg(), t0()).unwrap_err();
        assert_eq!(auth.attempts, 1);

        let early = t0() + chrono::Duration::seconds(30);
        let err = auth.resend(&cfg(), early).unwrap_err();
        assert_eq!(
            err,
            ConsentError::Auth(AuthError::ResendCoolingDown { remaining_secs: 30 })
        );

        let later = t0() + chrono::Duration::seconds(60);
        let challenge = auth.resend(&cfg(), later).unwrap();
        assert_eq!(auth.attempts, 0);
        assert_eq!(
            challenge.expires_at,
            later + chrono::Duration::seconds(300)
        );
    }

    #[test]
    fn test_verification_is_monotonic() {
        let mut auth = AuthState::default();
        auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();
        auth.verify_code("654321", &cfg(), t0()).unwrap();

        // Neither re-verification nor a late clock regresses the state.
        auth.verify_code("999999", &cfg(), t0() + chrono::Duration::days(1)).unwrap();
        assert!(auth.verified);

        let err = auth.change_email().unwrap_err();
        assert_eq!(err, ConsentError::State(StateConflict::AlreadyVerified));
    }

    #[test]
    fn test_change_email_clears_outstanding_challenge() {
        let mut auth = AuthState::default();
        auth.send_challenge("a@b.co", &cfg(), t0()).unwrap();
        auth.verify_code(REJECTED_CODE_SENTINEL, &cfg(), t0()).unwrap_err();

        auth.change_email().unwrap();
        assert_eq!(auth.phase(), AuthPhase::NoChallenge);
        assert_eq!(auth.attempts, 0);
        assert!(auth.code.is_none());

        let err = auth.verify_code("123456", &cfg(), t0()).unwrap_err();
        assert_eq!(
            err,
            ConsentError::State(StateConflict::NoChallengeOutstanding)
        );
    }
}
