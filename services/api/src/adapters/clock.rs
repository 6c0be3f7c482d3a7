//! services/api/src/adapters/clock.rs
//!
//! The system wall clock, implementing the `Clock` port from the `core`
//! crate. Tests substitute their own deterministic instants instead.

use chrono::{DateTime, Utc};
use econsent_core::ports::Clock;

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
