//! Protocol module for EventSub communication
//!
//! Defines the inbound WebSocket frame types and the outbound subscribe
//! request body. Frames are JSON with a `metadata.message_type`
//! discriminator and a type-specific `payload`.

mod messages;

pub use messages::*;
