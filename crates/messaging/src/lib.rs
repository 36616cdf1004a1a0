//! Vendor messaging layer.
//!
//! Three channels share the vendor opcode space:
//!
//! - **Message → Response**: directed, acknowledged, at most one in flight
//!   per destination, answered by one Response or one timeout
//! - **Broadcast**: unacknowledged, always to the all-nodes address
//! - **Response**: reply on the context captured from an inbound Message
//!
//! [`VendorMessaging`] emits transport calls and turns inbound vendor-model
//! events into application notifications.

mod error;
mod state;

pub use error::MessagingError;
pub use state::{MessagingConfig, VendorMessaging};
