//! Core types for the mesh root provisioner.
//!
//! Addresses, device identities, key material and the per-node record the
//! orchestrator drives through onboarding. These types carry no behaviour
//! beyond validation of their own invariants.

mod context;
mod device;
mod identifiers;
mod keys;
mod node;

pub use context::{InboundContext, MessageContext, MessageRole, DEFAULT_SEND_TTL};
pub use device::{
    AddDeviceFlags, AddrType, Bearer, BearerSet, DeviceUuid, MacAddress, UnprovisionedDevice,
};
pub use identifiers::{Address, AppKeyIndex, NetKeyIndex, NodeIndex, Opcode};
pub use keys::{KeyMaterial, APP_KEY_LEN};
pub use node::{
    FastProvAction, FastProvAllocation, NodeRecord, NodeState, StateTransitionError,
    FAST_PROV_ACTION_COMMIT, MAX_MATCH_FILTER_LEN,
};
