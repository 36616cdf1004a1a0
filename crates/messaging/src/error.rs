use meshroot_core::TransportError;
use meshroot_types::{Address, Opcode};
use thiserror::Error;

/// Errors returned to the application by send operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    #[error("Node {0} is not registered in the network")]
    NodeNotFound(Address),

    #[error("Request {opcode} to {destination} already in flight")]
    RequestInFlight { destination: Address, opcode: Opcode },

    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
