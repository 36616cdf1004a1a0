//! Deterministic simulation runner.
//!
//! A seeded in-memory mesh stands in for the radio stack so the whole
//! onboarding and messaging flow can run without hardware. Given the same
//! seed, a run produces identical results.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, Scheduled>)    │ │
//! │  │     Ordered by: time, sequence                     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Dispatcher<SimulatedMesh, SimApplication>      │ │
//! │  │     One event at a time                            │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │                           ▼                             │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Mesh replies + timers → schedule new events    │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod application;
mod event_queue;
mod network;
mod runner;

pub use application::{AppStats, SimApplication};
pub use event_queue::EventKey;
pub use network::{MeshStats, NetworkConfig, SimulatedMesh};
pub use runner::{SimulationError, SimulationRunner, SimulationStats, WorkloadConfig};
