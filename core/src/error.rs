//! Centralized error types for the gateway core library.
//!
//! This module provides a unified error handling system using `thiserror`,
//! covering the hard-failure paths that are not already modeled as in-dialog
//! tool responses (home-automation fetch failures, session transport
//! failures, settings validation).

use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths (log lines, diagnostics, future API surfaces).
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the voice-assistant gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The home-automation API returned a non-200, non-401 status.
    #[error("home automation request failed: {0}")]
    HomeAssistant(String),

    /// The remote live-model session could not be opened.
    #[error("live session open failed: {0}")]
    SessionOpen(String),

    /// The remote live-model session failed after it was opened.
    #[error("live session transport error: {0}")]
    SessionTransport(String),

    /// Settings failed validation (missing/invalid configuration value).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The edge protocol connection sent a frame this gateway doesn't understand.
    #[error("edge protocol error: {0}")]
    EdgeProtocol(String),
}

impl ErrorCode for GatewayError {
    fn code(&self) -> &'static str {
        match self {
            Self::HomeAssistant(_) => "home_assistant_error",
            Self::SessionOpen(_) => "session_open_failed",
            Self::SessionTransport(_) => "session_transport_error",
            Self::Configuration(_) => "configuration_error",
            Self::EdgeProtocol(_) => "edge_protocol_error",
        }
    }
}

/// Convenient Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
