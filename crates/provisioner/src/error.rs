//! Errors raised while handling provisioning events.

use meshroot_core::CodecError;
use meshroot_types::{Address, DeviceUuid, StateTransitionError};
use thiserror::Error;

/// Registry lookups and inserts that cannot be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Address {address} already belongs to device {owner}")]
    AddressInUse { address: Address, owner: DeviceUuid },

    #[error("No node registered at {0}")]
    NotFound(Address),
}

/// Failure handling one provisioning event.
///
/// Never crosses back into the transport: the orchestrator logs it and drops
/// the event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionerError {
    #[error("No node registered at {0}")]
    NodeNotFound(Address),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transition(#[from] StateTransitionError),
}
