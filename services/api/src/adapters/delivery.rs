//! services/api/src/adapters/delivery.rs
//!
//! Simulated email delivery for one-time codes, implementing the
//! `CodeDeliveryService` port from the `core` crate.
//!
//! No mail leaves this process: the code is written to the log after a
//! short artificial latency, which is enough for the workflow engine to
//! exercise its challenge lifecycle end to end. A real mailer drops in
//! behind the same trait.

use async_trait::async_trait;
use econsent_core::ports::{CodeDeliveryService, PortResult};
use std::time::Duration;
use tracing::info;

/// An adapter that "delivers" codes by logging them.
#[derive(Clone)]
pub struct LoggingCodeDelivery {
    latency: Duration,
}

impl LoggingCodeDelivery {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl CodeDeliveryService for LoggingCodeDelivery {
    async fn deliver_code(&self, email: &str, code: &str) -> PortResult<()> {
        tokio::time::sleep(self.latency).await;
        info!(email, code, "simulated verification email delivered");
        Ok(())
    }
}
