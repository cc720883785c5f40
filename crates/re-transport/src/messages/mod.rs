//! Control-plane message payloads and topic constants for the transport.

pub mod events;
pub mod topics;

pub use events::*;
