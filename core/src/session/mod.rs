//! The live-model session controller (C4).
//!
//! Owns the persistent bidirectional session with the remote live-audio
//! model and runs the send-loop, receive-loop, and tool-call fan-out that
//! together make up one edge connection's dialog.

mod controller;
mod live;
mod prompt;
mod tools;

pub use controller::{OutputCallbacks, SessionController};
pub use live::{LiveEvent, LiveSession};
pub use prompt::build_system_prompt;
pub use tools::{tool_declarations, FunctionCall, FunctionResponse, CONTROL_HOME_ASSISTANT};
