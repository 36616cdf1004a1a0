//! Fast-provisioning handoff.
//!
//! A node whose AppKey is bound receives one Fast-Prov-Info-Set carrying the
//! address range and keys it needs to provision further devices itself.
//! The send is unacknowledged; the node's Info-Status comes back on the
//! vendor status channel and is routed here by the orchestrator.
//!
//! Every recipient is handed the same provisioner-wide range. Ranges are not
//! partitioned per sub-provisioner.

use crate::{NodeRegistry, ProvisionerError};
use meshroot_core::opcodes::fast_prov;
use meshroot_core::{Action, ClientSend, FastProvInfoSet, FastProvStatus, ModelKind, TransportCall};
use meshroot_types::{
    Address, FastProvAction, FastProvAllocation, MessageContext, MessageRole, NodeRecord,
    NodeState, Opcode,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Builds and sends fast-provisioning handoffs.
#[derive(Debug, Clone)]
pub struct FastProvPropagator {
    template: FastProvAllocation,
    send_ttl: u8,
    role: MessageRole,
}

impl FastProvPropagator {
    /// Create a propagator handing out `template` to every node.
    pub fn new(template: FastProvAllocation, send_ttl: u8, role: MessageRole) -> Self {
        Self {
            template,
            send_ttl,
            role,
        }
    }

    /// The allocation handed to new nodes.
    pub fn template(&self) -> &FastProvAllocation {
        &self.template
    }

    /// Fill in the node's allocation and build the Info-Set for it.
    ///
    /// New nodes (no previously assigned range) get a fresh copy of the
    /// template; a re-provisioned node keeps its range and is only re-marked.
    /// The node's state is not changed here.
    pub fn hand_off(&self, node: &mut NodeRecord) -> Result<Vec<Action>, ProvisionerError> {
        let action = if node.needs_allocation() {
            node.fast_prov = self.template.clone();
            FastProvAction::Allocate
        } else {
            FastProvAction::Reaffirm
        };
        node.fast_prov.action = Some(action);

        let message = FastProvInfoSet::from_allocation(&node.fast_prov, action)?;

        info!(
            addr = %node.address,
            ?action,
            unicast_min = %node.fast_prov.unicast_min,
            unicast_max = %node.fast_prov.unicast_max,
            count = node.fast_prov.addr_range_count,
            "Sending fast-prov info"
        );

        // Addressed under the node's own NetKey; the fast-prov index is payload.
        let context = MessageContext::outbound(
            node.net_key_index,
            node.app_key_index,
            node.address,
            self.send_ttl,
        );

        Ok(vec![Action::Transport(TransportCall::ClientModelSend(
            ClientSend {
                model: ModelKind::FastProvClient,
                context,
                opcode: fast_prov::INFO_SET,
                payload: message.encode(),
                timeout: Duration::ZERO,
                ack: false,
                role: self.role,
            },
        ))])
    }

    /// Handle a fast-prov status message from `source`.
    ///
    /// A successful Info-Status completes onboarding of a node waiting in
    /// `FastProvSent`.
    pub fn on_status(
        &self,
        source: Address,
        opcode: Opcode,
        payload: &[u8],
        registry: &mut NodeRegistry,
    ) -> Result<(), ProvisionerError> {
        let status = FastProvStatus::decode(payload)?;

        if opcode != fast_prov::INFO_STATUS {
            debug!(addr = %source, %opcode, code = status.code, "Fast-prov status");
            return Ok(());
        }

        let node = registry
            .get_mut(source)
            .ok_or(ProvisionerError::NodeNotFound(source))?;

        if !status.is_success() {
            warn!(addr = %source, code = status.code, "Node rejected fast-prov info");
            return Ok(());
        }

        if node.state() != NodeState::FastProvSent {
            debug!(addr = %source, state = %node.state(), "Ignoring unexpected fast-prov info status");
            return Ok(());
        }

        node.advance(NodeState::Ready)?;
        info!(addr = %source, name = ?node.name, "Node ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshroot_core::ProvisionedNode;
    use meshroot_types::{AppKeyIndex, DeviceUuid, NetKeyIndex, NodeIndex};

    fn template() -> FastProvAllocation {
        FastProvAllocation {
            addr_range_count: 100,
            unicast_min: Address(0x0100),
            unicast_max: Address(0x7FFF),
            flags: 0,
            iv_index: 0,
            net_index: NetKeyIndex::PRIMARY,
            group_address: Address(0xC000),
            match_filter: vec![0xDD, 0xDD],
            action: None,
        }
    }

    fn propagator() -> FastProvPropagator {
        FastProvPropagator::new(template(), 7, MessageRole::Provisioner)
    }

    fn registry_with_node() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .register(
                &ProvisionedNode {
                    node_index: NodeIndex(1),
                    uuid: DeviceUuid([0xAA; 16]),
                    address: Address(0x0002),
                    element_count: 1,
                    net_key_index: NetKeyIndex::PRIMARY,
                },
                AppKeyIndex(0),
            )
            .unwrap();
        registry
    }

    fn sent_info_set(actions: &[Action]) -> FastProvInfoSet {
        match actions[0].as_transport() {
            Some(TransportCall::ClientModelSend(send)) => {
                assert_eq!(send.model, ModelKind::FastProvClient);
                assert_eq!(send.opcode, fast_prov::INFO_SET);
                assert!(!send.ack);
                FastProvInfoSet::decode(&send.payload).unwrap()
            }
            other => panic!("expected client send, got {:?}", other),
        }
    }

    #[test]
    fn test_new_node_gets_template() {
        let mut registry = registry_with_node();
        let node = registry.get_mut(Address(0x0002)).unwrap();

        let actions = propagator().hand_off(node).unwrap();
        let msg = sent_info_set(&actions);

        assert_eq!(msg.addr_range_count, 100);
        assert_eq!(msg.unicast_min, Address(0x0100));
        assert_eq!(msg.unicast_max, Address(0x7FFF));
        assert_eq!(msg.group_address, Address(0xC000));
        assert_eq!(msg.match_filter, vec![0xDD, 0xDD]);
        assert_eq!(msg.action, FastProvAction::Allocate);
        assert_eq!(node.fast_prov.action, Some(FastProvAction::Allocate));
    }

    #[test]
    fn test_reprovisioned_node_keeps_range() {
        let mut registry = registry_with_node();
        let node = registry.get_mut(Address(0x0002)).unwrap();
        node.restart_onboarding(NodeIndex(2), Address(0x0002), 1, NetKeyIndex::PRIMARY);
        node.fast_prov = FastProvAllocation {
            addr_range_count: 10,
            unicast_min: Address(0x0200),
            unicast_max: Address(0x0209),
            ..template()
        };

        let actions = propagator().hand_off(node).unwrap();
        let msg = sent_info_set(&actions);

        assert_eq!(msg.unicast_min, Address(0x0200));
        assert_eq!(msg.addr_range_count, 10);
        assert_eq!(msg.action, FastProvAction::Reaffirm);
    }

    #[test]
    fn test_info_set_sent_on_node_net_key() {
        let mut registry = registry_with_node();
        let node = registry.get_mut(Address(0x0002)).unwrap();
        let propagator = FastProvPropagator::new(
            FastProvAllocation {
                net_index: NetKeyIndex(3),
                ..template()
            },
            7,
            MessageRole::Provisioner,
        );

        let actions = propagator.hand_off(node).unwrap();
        let Some(Action::Transport(TransportCall::ClientModelSend(send))) = actions.first() else {
            panic!("expected client send, got {:?}", actions);
        };
        assert_eq!(send.context.net_key_index, node.net_key_index);
        assert_ne!(send.context.net_key_index, NetKeyIndex(3));
        assert_eq!(sent_info_set(&actions).net_index, NetKeyIndex(3));
    }

    #[test]
    fn test_info_status_marks_ready() {
        let mut registry = registry_with_node();
        {
            let node = registry.get_mut(Address(0x0002)).unwrap();
            node.advance(NodeState::FastProvSent).unwrap();
        }

        propagator()
            .on_status(
                Address(0x0002),
                fast_prov::INFO_STATUS,
                &FastProvStatus::SUCCESS.encode(),
                &mut registry,
            )
            .unwrap();
        assert_eq!(
            registry.get(Address(0x0002)).unwrap().state(),
            NodeState::Ready
        );
    }

    #[test]
    fn test_status_from_unknown_node() {
        let mut registry = NodeRegistry::new();
        let result = propagator().on_status(
            Address(0x0009),
            fast_prov::INFO_STATUS,
            &[0x00],
            &mut registry,
        );
        assert_eq!(result, Err(ProvisionerError::NodeNotFound(Address(0x0009))));
    }
}
