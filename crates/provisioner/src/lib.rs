//! Provisioning authority for the mesh root.
//!
//! This crate owns everything the provisioner knows about the network and
//! drives each device from first advertisement to fast-provisioning handoff.
//!
//! # Flow
//!
//! ```text
//! Transport
//!     │ UnprovisionedDeviceSeen
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │ AdmissionController                                         │
//! │   known uuid → admit; new uuid → admit if quota left        │
//! │   Action: AddUnprovisionedDevice                            │
//! └─────────────────────────────────────────────────────────────┘
//!     │ ProvisioningComplete
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │ CompletionCoordinator                                       │
//! │   name "NODE-xx", register, AppKey-Add (one retry)          │
//! └─────────────────────────────────────────────────────────────┘
//!     │ AppKey Status ok
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │ FastProvPropagator                                          │
//! │   Fast-Prov-Info-Set with the provisioner's own range       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ProvisionerState`] - Composes the components below
//! - [`NodeRegistry`] - Node records by address and uuid
//! - [`ProvisioningQuota`] - Admission budget for new devices
//! - [`AdmissionController`] - Advertisement filtering
//! - [`CompletionCoordinator`] - Onboarding transition table
//! - [`FastProvPropagator`] - Sub-provisioner handoff
//! - [`ProvisionerConfig`] - Configuration

mod admission;
mod completion;
mod config;
mod error;
mod fast_prov;
mod quota;
mod registry;
mod state;

pub use admission::{AdmissionController, AdmissionDecision, DropReason};
pub use completion::{
    transition, CompletionCoordinator, Effect, OnboardingInput, Transition, MAX_APP_KEY_RETRIES,
};
pub use config::{ConfigError, ProvisionerConfig};
pub use error::{ProvisionerError, RegistryError};
pub use fast_prov::FastProvPropagator;
pub use quota::ProvisioningQuota;
pub use registry::{NodeRegistry, Registration};
pub use state::ProvisionerState;
