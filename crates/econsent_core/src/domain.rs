//! crates/econsent_core/src/domain.rs
//!
//! Defines the immutable reference data attached to a consent session.
//! These structs are read-only to every workflow component and independent
//! of any transport or rendering concern.

use serde::{Deserialize, Serialize};

/// The patient this consent attempt belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub patient_id: String,
    pub patient_name: String,
    pub email: String,
    pub language: String,
}

/// The study and site the consent document covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyInfo {
    pub protocol_id: String,
    pub protocol_name: String,
    pub version: String,
    pub site_code: String,
    pub site_name: String,
    pub investigator_name: String,
}

/// Client environment captured when the consent link is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    pub device: String,
}
