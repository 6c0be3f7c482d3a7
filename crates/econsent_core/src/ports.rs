//! crates/econsent_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's external
//! collaborators. These traits form the boundary of the hexagonal
//! architecture: the workflow engine stays independent of how codes are
//! delivered, how submissions travel, and where time comes from, so a
//! simulated adapter and a real backend are interchangeable without
//! touching the state-machine contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::export::CompletionExport;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., mail, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Abstract time source. The engine never calls `Utc::now()` itself; every
/// operation takes an explicit instant obtained through this port, which
/// keeps the gating rules deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Delivery of one-time verification codes to the patient's email.
#[async_trait]
pub trait CodeDeliveryService: Send + Sync {
    async fn deliver_code(&self, email: &str, code: &str) -> PortResult<()>;
}

/// Terminal submission of the completed consent record.
#[async_trait]
pub trait SubmissionBackend: Send + Sync {
    async fn submit_consent(&self, export: &CompletionExport) -> PortResult<()>;
}
