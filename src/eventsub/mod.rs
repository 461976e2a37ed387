//! EventSub session handling
//!
//! - Session state carried through a pure dispatcher
//! - WebSocket connection management with server-directed reconnect
//! - Current/previous connection handoff on the reconnect welcome

mod client;
mod dispatcher;
mod session;

pub use client::*;
pub use dispatcher::*;
pub use session::*;
