//! Core types for the mesh root orchestrator.
//!
//! This crate defines the vocabulary shared by every state machine in the
//! workspace:
//!
//! - [`Event`]: everything the transport (or the dispatcher) can tell the orchestrator
//! - [`Action`]: everything the orchestrator can ask the dispatcher to do
//! - [`StateMachine`]: the synchronous, I/O-free processing contract
//! - [`MeshTransport`]: the narrow outbound interface into the mesh stack
//! - [`MeshApplication`]: the callbacks notifications are delivered through
//! - [`PendingRequests`]: correlation of fire-and-forget sends with later events

mod action;
mod application;
pub mod codec;
mod event;
pub mod opcodes;
mod pending;
mod traits;
mod transport;

pub use action::{Action, Notification, TimerId};
pub use application::MeshApplication;
pub use codec::{CodecError, FastProvInfoSet, FastProvStatus};
pub use event::{
    ConfigClientEvent, ConfigEventKind, ConfigStatus, Event, ProvisionedNode, VendorModelEvent,
};
pub use pending::{PendingRequest, PendingRequests};
pub use traits::StateMachine;
pub use transport::{
    execute, ClientSend, ConfigRequest, MeshTransport, ModelKind, NodeHandle, TransportCall,
    TransportError,
};
