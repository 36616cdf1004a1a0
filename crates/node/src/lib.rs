//! Mesh root orchestrator.
//!
//! Composes the provisioner and the vendor messaging layer into one
//! [`StateMachine`](meshroot_core::StateMachine) and drives it against a
//! [`MeshTransport`](meshroot_core::MeshTransport).
//!
//! - [`MeshOrchestrator`] - Event routing between the two halves
//! - [`Dispatcher`] - Executes actions, feeds failures back, delivers callbacks
//! - [`HandlerSet`] - Closure-based application with startup validation

mod application;
mod dispatcher;
mod state;

pub use application::{ContractError, HandlerSet, Handlers};
pub use dispatcher::Dispatcher;
pub use meshroot_core::MeshApplication;
pub use state::MeshOrchestrator;
