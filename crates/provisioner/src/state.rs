//! Provisioner sub-state machine.

use crate::{
    AdmissionController, CompletionCoordinator, FastProvPropagator, NodeRegistry,
    ProvisionerConfig, ProvisioningQuota,
};
use meshroot_core::{
    Action, ConfigClientEvent, ModelKind, Notification, ProvisionedNode, TransportCall,
    TransportError,
};
use meshroot_types::{Address, AppKeyIndex, Opcode, UnprovisionedDevice};
use std::time::Duration;
use tracing::{error, info, warn};

/// Admission, onboarding and fast-prov handoff for the whole network.
///
/// Owns the registry and quota. Errors from individual events are logged
/// here and the event is dropped; nothing is returned to the transport.
#[derive(Debug)]
pub struct ProvisionerState {
    config: ProvisionerConfig,
    registry: NodeRegistry,
    admission: AdmissionController,
    completion: CompletionCoordinator,
    fast_prov: FastProvPropagator,
}

impl ProvisionerState {
    /// Create the provisioner from its configuration.
    pub fn new(config: ProvisionerConfig) -> Self {
        let admission = AdmissionController::new(config.max_node_num, config.bearers);
        let completion = CompletionCoordinator::new(
            config.keys(),
            config.send_ttl,
            config.fetch_composition_data,
        );
        let fast_prov =
            FastProvPropagator::new(config.allocation_template(), config.send_ttl, config.role);
        Self {
            config,
            registry: NodeRegistry::new(),
            admission,
            completion,
            fast_prov,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn quota(&self) -> &ProvisioningQuota {
        self.admission.quota()
    }

    pub fn completion(&self) -> &CompletionCoordinator {
        &self.completion
    }

    pub fn set_time(&mut self, now: Duration) {
        self.completion.set_time(now);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Startup
    // ═══════════════════════════════════════════════════════════════════════

    /// Calls that bring the provisioner up: uuid filter, bearers, local key.
    pub fn start(&self) -> Vec<Action> {
        info!(
            addr = %self.config.own_address,
            quota = self.admission.quota().remaining(),
            match_filter = %hex::encode(&self.config.match_filter),
            "Starting provisioner"
        );
        vec![
            Action::Transport(TransportCall::SetUuidMatch {
                prefix: self.config.match_filter.clone(),
            }),
            Action::Transport(TransportCall::EnableProvisioning {
                bearers: self.config.bearers,
            }),
            Action::Transport(TransportCall::AddLocalAppKey {
                keys: self.completion.keys().clone(),
            }),
        ]
    }

    /// The local AppKey was installed; bind the application models to it.
    pub fn on_local_app_key_added(
        &mut self,
        app_key_index: AppKeyIndex,
        result: Result<(), TransportError>,
    ) -> Vec<Action> {
        if let Err(e) = result {
            error!(app_idx = %app_key_index, error = %e, "Failed to add local AppKey");
            return vec![];
        }

        self.completion.set_app_key_index(app_key_index);
        info!(app_idx = %app_key_index, "Local AppKey added");

        [ModelKind::VendorClient, ModelKind::VendorServer]
            .into_iter()
            .map(|model| {
                Action::Transport(TransportCall::BindLocalModel {
                    element: self.config.own_address,
                    model,
                    app_key_index,
                })
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event handlers
    // ═══════════════════════════════════════════════════════════════════════

    pub fn on_device_seen(&mut self, device: UnprovisionedDevice) -> Vec<Action> {
        self.admission.on_device_seen(device, &self.registry)
    }

    /// Register the node, start key distribution, then tell the application.
    pub fn on_provisioning_complete(&mut self, node: ProvisionedNode) -> Vec<Action> {
        match self
            .completion
            .on_provisioning_complete(&node, &mut self.registry)
        {
            Ok(mut actions) => {
                actions.push(Action::Notify(Notification::ProvComplete(node)));
                actions
            }
            Err(e) => {
                warn!(uuid = %node.uuid, addr = %node.address, error = %e, "Dropping provisioning-complete event");
                vec![]
            }
        }
    }

    pub fn on_config_event(&mut self, event: ConfigClientEvent) -> Vec<Action> {
        let destination = event.destination;
        self.completion
            .on_config_event(event, &mut self.registry, &self.fast_prov)
            .unwrap_or_else(|e| {
                warn!(addr = %destination, error = %e, "Dropping config client event");
                vec![]
            })
    }

    /// Handle a status on the fast-prov channel.
    pub fn on_fast_prov_status(&mut self, source: Address, opcode: Opcode, payload: &[u8]) {
        if let Err(e) = self
            .fast_prov
            .on_status(source, opcode, payload, &mut self.registry)
        {
            warn!(addr = %source, %opcode, error = %e, "Dropping fast-prov status");
        }
    }

    /// A call emitted earlier failed at the transport.
    pub fn on_call_failed(&mut self, call: &TransportCall, error: &TransportError) -> Vec<Action> {
        if let TransportCall::AddUnprovisionedDevice { device, .. } = call {
            warn!(error = %error, "Admission abandoned");
            self.admission.on_add_failed(device, &self.registry);
            return vec![];
        }

        self.completion
            .on_call_failed(call, &mut self.registry, &self.fast_prov)
            .unwrap_or_else(|e| {
                warn!(call = call.type_name(), error = %e, "Failed to handle transport failure");
                vec![]
            })
    }

    /// Release config requests older than `max_age`.
    pub fn on_sweep(&mut self, max_age: Duration) -> Vec<Action> {
        self.completion
            .on_sweep(max_age, &mut self.registry, &self.fast_prov)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshroot_types::{
        AddrType, Bearer, DeviceUuid, MacAddress, NetKeyIndex, NodeIndex,
    };

    fn device(uuid: u8) -> UnprovisionedDevice {
        UnprovisionedDevice {
            uuid: DeviceUuid([uuid; 16]),
            mac: MacAddress([uuid; 6]),
            addr_type: AddrType::Public,
            oob_info: 0,
            adv_type: 0,
            bearer: Bearer::Adv,
        }
    }

    #[test]
    fn test_start_sequence() {
        let state = ProvisionerState::new(ProvisionerConfig::default());
        let names: Vec<_> = state.start().iter().map(Action::type_name).collect();
        assert_eq!(
            names,
            vec!["set_uuid_match", "enable_provisioning", "add_local_app_key"]
        );
    }

    #[test]
    fn test_local_app_key_binds_models() {
        let mut state = ProvisionerState::new(ProvisionerConfig::default());

        let actions = state.on_local_app_key_added(AppKeyIndex(3), Ok(()));
        assert_eq!(actions.len(), 2);
        assert_eq!(state.completion().keys().app_key_index, AppKeyIndex(3));

        let actions =
            state.on_local_app_key_added(AppKeyIndex(4), Err(TransportError::new("add_local_app_key", -1)));
        assert!(actions.is_empty());
        assert_eq!(state.completion().keys().app_key_index, AppKeyIndex(3));
    }

    #[test]
    fn test_reprovisioned_device_bypasses_exhausted_quota() {
        let mut state = ProvisionerState::new(ProvisionerConfig::with_max_node_num(1));

        assert_eq!(state.on_device_seen(device(0xAA)).len(), 1);
        state.on_provisioning_complete(ProvisionedNode {
            node_index: NodeIndex(1),
            uuid: DeviceUuid([0xAA; 16]),
            address: Address(0x0005),
            element_count: 1,
            net_key_index: NetKeyIndex::PRIMARY,
        });
        assert!(state.quota().is_exhausted());

        assert!(state.on_device_seen(device(0xBB)).is_empty());
        assert_eq!(state.on_device_seen(device(0xAA)).len(), 1);
        assert_eq!(state.quota().remaining(), 0);
    }

    #[test]
    fn test_address_conflict_drops_event() {
        let mut state = ProvisionerState::new(ProvisionerConfig::default());
        let node = |uuid: u8| ProvisionedNode {
            node_index: NodeIndex(uuid as u16),
            uuid: DeviceUuid([uuid; 16]),
            address: Address(0x0005),
            element_count: 1,
            net_key_index: NetKeyIndex::PRIMARY,
        };

        let first = state.on_provisioning_complete(node(0xAA));
        assert!(matches!(
            first.last(),
            Some(Action::Notify(Notification::ProvComplete(_)))
        ));

        let second = state.on_provisioning_complete(node(0xBB));
        assert!(second.is_empty());
        assert_eq!(state.registry().len(), 1);
    }
}
