//! Gateway Core - shared library for the real-time voice-assistant gateway.
//!
//! This crate provides the core functionality for a gateway that bridges a
//! local voice-frontend (the *edge protocol*) to a remote cloud live-audio
//! model, and executes smart-home tool calls the model emits against a
//! home-automation REST API. It is designed to be used by a standalone
//! headless server binary (and, in principle, any other front end that can
//! drive the edge protocol).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: immutable, process-wide [`config::Settings`]
//! - [`audio`]: PCM16 resampling and silence generation
//! - [`home_assistant`]: home-automation REST client and entity context builder
//! - [`session`]: the live-model session controller (send-loop, receive-loop,
//!   tool-call fan-out, barge-in, turn delimitation)
//! - [`edge`]: the edge-protocol wire framing and the adapter that translates
//!   edge events into session controller calls
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! [`OutputCallbacks`](session::OutputCallbacks) decouples the session
//! controller from the edge adapter: the controller delivers resampled
//! model audio through the trait without knowing how (or whether) it ends
//! up on a socket.

#![warn(clippy::all)]

pub mod audio;
pub mod config;
pub mod edge;
pub mod error;
pub mod home_assistant;
pub mod session;

// Re-export commonly used types at the crate root.
pub use config::Settings;
pub use error::{ErrorCode, GatewayError, GatewayResult};
pub use home_assistant::{EntityView, HomeAssistantClient};
pub use session::{OutputCallbacks, SessionController};
