//! services/api/src/adapters/submission.rs
//!
//! Simulated submission backend, implementing the `SubmissionBackend` port
//! from the `core` crate. Sleeps a fixed latency and accepts, standing in
//! for the network round trip of a real consent repository.

use async_trait::async_trait;
use econsent_core::ports::{PortResult, SubmissionBackend};
use econsent_core::CompletionExport;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Clone)]
pub struct SimulatedSubmissionBackend {
    latency: Duration,
}

impl SimulatedSubmissionBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl SubmissionBackend for SimulatedSubmissionBackend {
    async fn submit_consent(&self, export: &CompletionExport) -> PortResult<()> {
        tokio::time::sleep(self.latency).await;
        if let Ok(payload) = serde_json::to_string(export) {
            debug!(bytes = payload.len(), "completion record payload");
        }
        info!(
            patient_id = %export.patient.patient_id,
            protocol_id = %export.study.protocol_id,
            pages = export.page_timings.len(),
            attestations = export.checklist_items.len(),
            "simulated consent submission accepted"
        );
        Ok(())
    }
}
