//! crates/econsent_core/src/config.rs
//!
//! Engine configuration: every gating constant is adjustable here rather
//! than hard-coded in the components. The defaults reproduce the reference
//! consent package (24 document pages, 15 s dwell per page, a 5 minute code
//! window with a 60 s resend cooldown and 3 attempts, 30 s recordings, and
//! the standard 8-statement comprehension checklist).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Static metadata for one comprehension checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItemSpec {
    pub id: u32,
    pub statement: String,
    /// Declared length of the narrated explanation for this statement.
    pub audio_duration_secs: i64,
}

impl ChecklistItemSpec {
    pub fn new(id: u32, statement: impl Into<String>, audio_duration_secs: i64) -> Self {
        Self {
            id,
            statement: statement.into(),
            audio_duration_secs,
        }
    }
}

/// Holds all tunable constants of the consent workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentConfig {
    /// Number of digits in a one-time code.
    pub otp_code_length: usize,
    /// How long a delivered code stays valid.
    pub otp_expiry_secs: i64,
    /// Cooldown before another code may be requested.
    pub resend_cooldown_secs: i64,
    /// Cumulative mismatches allowed before the verifier locks out.
    pub max_otp_attempts: u32,
    /// Number of pages in the consent document.
    pub total_pages: u32,
    /// Minimum seconds a patient must dwell on a page before advancing.
    pub default_page_dwell_secs: i64,
    /// Per-page overrides of the minimum dwell.
    pub page_dwell_overrides: HashMap<u32, i64>,
    /// Hard cap on a video confirmation recording.
    pub max_recording_secs: i64,
    /// The comprehension statements, in presentation order.
    pub checklist_items: Vec<ChecklistItemSpec>,
}

impl ConsentConfig {
    /// The minimum dwell time for a given page, honoring overrides.
    pub fn min_dwell_for(&self, page: u32) -> i64 {
        self.page_dwell_overrides
            .get(&page)
            .copied()
            .unwrap_or(self.default_page_dwell_secs)
    }
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            otp_code_length: 6,
            otp_expiry_secs: 300,
            resend_cooldown_secs: 60,
            max_otp_attempts: 3,
            total_pages: 24,
            default_page_dwell_secs: 15,
            page_dwell_overrides: HashMap::new(),
            max_recording_secs: 30,
            checklist_items: vec![
                ChecklistItemSpec::new(1, "I understand the purpose of this study", 105),
                ChecklistItemSpec::new(
                    2,
                    "I understand the study procedures and what will be expected of me",
                    120,
                ),
                ChecklistItemSpec::new(
                    3,
                    "I understand the potential risks and benefits of participating",
                    135,
                ),
                ChecklistItemSpec::new(
                    4,
                    "I understand that my participation is voluntary and I can withdraw at any time",
                    95,
                ),
                ChecklistItemSpec::new(
                    5,
                    "I understand how my personal data will be used and protected",
                    115,
                ),
                ChecklistItemSpec::new(6, "I understand the compensation and costs involved", 90),
                ChecklistItemSpec::new(
                    7,
                    "I understand who to contact if I have questions or concerns",
                    80,
                ),
                ChecklistItemSpec::new(
                    8,
                    "I confirm I have had the opportunity to ask questions and receive answers",
                    100,
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_package() {
        let cfg = ConsentConfig::default();
        assert_eq!(cfg.otp_code_length, 6);
        assert_eq!(cfg.otp_expiry_secs, 300);
        assert_eq!(cfg.resend_cooldown_secs, 60);
        assert_eq!(cfg.max_otp_attempts, 3);
        assert_eq!(cfg.total_pages, 24);
        assert_eq!(cfg.max_recording_secs, 30);
        assert_eq!(cfg.checklist_items.len(), 8);
    }

    #[test]
    fn test_dwell_override_wins_over_default() {
        let mut cfg = ConsentConfig::default();
        cfg.page_dwell_overrides.insert(9, 45);
        assert_eq!(cfg.min_dwell_for(9), 45);
        assert_eq!(cfg.min_dwell_for(10), 15);
    }
}
