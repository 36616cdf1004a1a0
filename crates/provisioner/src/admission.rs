//! Admission of discovered devices into the provisioning queue.

use crate::{NodeRegistry, ProvisioningQuota};
use meshroot_core::{Action, TransportCall};
use meshroot_types::{AddDeviceFlags, BearerSet, UnprovisionedDevice};
use tracing::{debug, warn};

/// Why an advertisement was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// New device and no quota left. Normal backpressure.
    QuotaExhausted,
    /// The advertisement came over a bearer provisioning is not enabled on.
    BearerDisabled,
}

/// Decision for one advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit { reprovisioned: bool },
    Drop(DropReason),
}

/// Decides which discovered devices are queued for provisioning.
///
/// Devices already in the registry are always admitted. New devices consume
/// one unit of quota each; the unit is taken when the add call is emitted
/// and returned if that call fails.
#[derive(Debug)]
pub struct AdmissionController {
    quota: ProvisioningQuota,
    bearers: BearerSet,
}

impl AdmissionController {
    /// Create a controller admitting at most `max_node_num` new devices.
    pub fn new(max_node_num: u32, bearers: BearerSet) -> Self {
        Self {
            quota: ProvisioningQuota::new(max_node_num),
            bearers,
        }
    }

    /// Current quota.
    pub fn quota(&self) -> &ProvisioningQuota {
        &self.quota
    }

    /// Decide on an advertisement, consuming quota for a new admission.
    pub fn decide(
        &mut self,
        device: &UnprovisionedDevice,
        registry: &NodeRegistry,
    ) -> AdmissionDecision {
        if !self.bearers.contains(device.bearer) {
            return AdmissionDecision::Drop(DropReason::BearerDisabled);
        }

        if registry.contains_uuid(&device.uuid) {
            return AdmissionDecision::Admit {
                reprovisioned: true,
            };
        }

        if self.quota.try_consume() {
            AdmissionDecision::Admit {
                reprovisioned: false,
            }
        } else {
            AdmissionDecision::Drop(DropReason::QuotaExhausted)
        }
    }

    /// Handle an unprovisioned-device advertisement.
    ///
    /// Emits at most one `AddUnprovisionedDevice` call.
    pub fn on_device_seen(
        &mut self,
        device: UnprovisionedDevice,
        registry: &NodeRegistry,
    ) -> Vec<Action> {
        match self.decide(&device, registry) {
            AdmissionDecision::Admit { reprovisioned } => {
                debug!(
                    uuid = %device.uuid,
                    mac = %device.mac,
                    bearer = %device.bearer,
                    reprovisioned,
                    quota = self.quota.remaining(),
                    "Admitting device"
                );
                vec![Action::Transport(TransportCall::AddUnprovisionedDevice {
                    device,
                    flags: AddDeviceFlags::ADMIT,
                })]
            }
            AdmissionDecision::Drop(reason) => {
                debug!(uuid = %device.uuid, ?reason, "Dropping advertisement");
                vec![]
            }
        }
    }

    /// The add call for `device` failed. The admission is abandoned.
    ///
    /// The device will advertise again; nothing is retried here.
    pub fn on_add_failed(&mut self, device: &UnprovisionedDevice, registry: &NodeRegistry) {
        warn!(uuid = %device.uuid, "Failed to queue device for provisioning");
        if !registry.contains_uuid(&device.uuid) {
            self.quota.refund();
        }
    }
}
