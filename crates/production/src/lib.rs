//! Async host for the mesh root orchestrator.
//!
//! The sans-IO [`Dispatcher`](meshroot_node::Dispatcher) is moved into a
//! single tokio task that owns it exclusively. Everything else talks to it
//! through an [`OrchestratorHandle`]:
//!
//! ```text
//! transport callbacks ──┐
//!                        │  Command (unbounded mpsc)
//! application tasks ────┼──────────────────────────▶ orchestrator task
//!                        │                               │
//! timer tasks ──────────┘◀── tokio::time::sleep ─────────┘
//! ```
//!
//! Transport callbacks submit [`Event`](meshroot_core::Event)s without
//! blocking. Send operations wait on a `oneshot` reply. Timer requests are
//! turned into sleeping tasks that post `Event::Timer` back into the same
//! channel, so every event is processed on the orchestrator task in arrival
//! order.

mod actor;
mod config;

pub use actor::{spawn_orchestrator, HandleError, NetworkSnapshot, NodeSummary, OrchestratorHandle};
pub use config::{load_config, LoadError};
