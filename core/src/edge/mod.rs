//! The edge protocol: wire framing plus the adapter (C5) that bridges it
//! to the [`session`](crate::session) controller.

mod adapter;
mod protocol;

pub use adapter::{handle_tcp_connection, run_connection};
pub use protocol::{read_event, write_event, EdgeEvent};
