//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Workflow constants (code length, dwell
//! times, recording cap) land in the embedded `ConsentConfig` so nothing is
//! hard-coded in the engine.

use econsent_core::ConsentConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,
    /// Simulated latency of the code-delivery email, in milliseconds.
    pub code_delivery_latency_ms: u64,
    /// Simulated latency of the submission backend, in milliseconds.
    pub submission_latency_ms: u64,
    /// The workflow engine's gating constants.
    pub consent: ConsentConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        // --- Load Simulated Adapter Latencies ---
        let code_delivery_latency_ms = parse_var("CODE_DELIVERY_LATENCY_MS", 400u64)?;
        let submission_latency_ms = parse_var("SUBMISSION_LATENCY_MS", 2000u64)?;

        // --- Load Workflow Constants ---
        let defaults = ConsentConfig::default();
        let consent = ConsentConfig {
            otp_code_length: parse_var("OTP_CODE_LENGTH", defaults.otp_code_length)?,
            otp_expiry_secs: parse_var("OTP_EXPIRY_SECS", defaults.otp_expiry_secs)?,
            resend_cooldown_secs: parse_var(
                "OTP_RESEND_COOLDOWN_SECS",
                defaults.resend_cooldown_secs,
            )?,
            max_otp_attempts: parse_var("OTP_MAX_ATTEMPTS", defaults.max_otp_attempts)?,
            total_pages: parse_var("DOCUMENT_TOTAL_PAGES", defaults.total_pages)?,
            default_page_dwell_secs: parse_var(
                "PAGE_MIN_DWELL_SECS",
                defaults.default_page_dwell_secs,
            )?,
            max_recording_secs: parse_var("MAX_RECORDING_SECS", defaults.max_recording_secs)?,
            ..defaults
        };

        Ok(Self {
            bind_address,
            log_level,
            cors_origin,
            code_delivery_latency_ms,
            submission_latency_ms,
            consent,
        })
    }
}

/// Parses an optional environment variable, falling back to `default`.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}
