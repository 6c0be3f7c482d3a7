//! crates/econsent_core/src/document.rs
//!
//! Per-page dwell-time and scroll-completion gate controlling linear
//! advance through the consent document.
//!
//! A page may be left forward only once both halves of the gate hold:
//! the configured minimum dwell has elapsed and the page was scrolled to
//! the bottom. Every forward advance appends an immutable `PageTiming`;
//! re-reading a page after a retreat accrues a fresh record on the next
//! advance, never rewriting an old one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::ConsentConfig;
use crate::error::{ConsentError, GateUnsatisfied, StateConflict};

/// One immutable record of a completed page viewing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTiming {
    pub page: u32,
    pub time_spent_secs: i64,
    pub scroll_depth_percent: u8,
    pub timestamp: DateTime<Utc>,
}

/// Result of a successful `advance` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    MovedToPage(u32),
    DocumentCompleted,
}

/// The document-reading slice of the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentProgress {
    pub current_page: u32,
    pub total_pages: u32,
    pub pages_read: BTreeSet<u32>,
    pub page_timings: Vec<PageTiming>,
    pub total_reading_time_secs: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    // Runtime of the current viewing, reset on every page change.
    page_entered_at: Option<DateTime<Utc>>,
    scrolled_to_bottom: bool,
}

impl DocumentProgress {
    pub fn new(cfg: &ConsentConfig) -> Self {
        Self {
            current_page: 1,
            total_pages: cfg.total_pages,
            pages_read: BTreeSet::new(),
            page_timings: Vec::new(),
            total_reading_time_secs: 0,
            completed: false,
            completed_at: None,
            page_entered_at: None,
            scrolled_to_bottom: false,
        }
    }

    /// Marks the start of the current viewing. Idempotent: a second call
    /// within the same viewing does not restart the dwell clock.
    pub fn enter(&mut self, now: DateTime<Utc>) {
        if self.page_entered_at.is_none() {
            self.page_entered_at = Some(now);
        }
    }

    /// Seconds spent on the current page in its current viewing.
    pub fn time_on_page(&self, now: DateTime<Utc>) -> i64 {
        self.page_entered_at
            .map(|at| (now - at).num_seconds().max(0))
            .unwrap_or(0)
    }

    /// Latches the scroll flag once the bottom of the page is reached.
    /// Scrolling back up never unlatches it within the same viewing.
    pub fn record_scroll(&mut self, depth_percent: u8) {
        if depth_percent >= 100 {
            self.scrolled_to_bottom = true;
        }
    }

    pub fn is_scrolled_to_bottom(&self) -> bool {
        self.scrolled_to_bottom
    }

    /// The gating predicate: dwell first, then scroll, so the refusal
    /// reason always names the condition the patient can act on next.
    pub fn can_advance(&self, cfg: &ConsentConfig, now: DateTime<Utc>) -> Result<(), GateUnsatisfied> {
        let min_dwell = cfg.min_dwell_for(self.current_page);
        let dwell = self.time_on_page(now);
        if dwell < min_dwell {
            return Err(GateUnsatisfied::InsufficientDwell {
                remaining_secs: min_dwell - dwell,
            });
        }
        if !self.scrolled_to_bottom {
            return Err(GateUnsatisfied::MustScrollToEnd);
        }
        Ok(())
    }

    /// Leaves the current page forward, recording its timing. On the last
    /// page this completes the document instead of moving.
    pub fn advance(
        &mut self,
        cfg: &ConsentConfig,
        now: DateTime<Utc>,
    ) -> Result<AdvanceOutcome, ConsentError> {
        if self.completed {
            return Err(StateConflict::DocumentAlreadyCompleted.into());
        }
        self.can_advance(cfg, now)?;

        let time_spent = self.time_on_page(now);
        self.page_timings.push(PageTiming {
            page: self.current_page,
            time_spent_secs: time_spent,
            scroll_depth_percent: 100,
            timestamp: now,
        });
        self.pages_read.insert(self.current_page);
        self.total_reading_time_secs += time_spent;

        if self.current_page >= self.total_pages {
            self.completed = true;
            self.completed_at = Some(now);
            self.page_entered_at = None;
            Ok(AdvanceOutcome::DocumentCompleted)
        } else {
            self.current_page += 1;
            self.page_entered_at = Some(now);
            self.scrolled_to_bottom = false;
            Ok(AdvanceOutcome::MovedToPage(self.current_page))
        }
    }

    /// Steps back one page, resetting the per-page runtime. Existing
    /// `PageTiming` records are kept.
    pub fn retreat(&mut self, now: DateTime<Utc>) -> Result<u32, ConsentError> {
        if self.completed {
            return Err(StateConflict::DocumentAlreadyCompleted.into());
        }
        if self.current_page <= 1 {
            return Err(StateConflict::AtFirstPage.into());
        }
        self.current_page -= 1;
        self.page_entered_at = Some(now);
        self.scrolled_to_bottom = false;
        Ok(self.current_page)
    }

    /// Fraction of distinct pages read, for progress display.
    pub fn progress_percent(&self) -> u32 {
        if self.total_pages == 0 {
            return 0;
        }
        (self.pages_read.len() as u32 * 100) / self.total_pages
    }
}
