//! Node registry: every provisioned device, keyed by unicast address.

use crate::RegistryError;
use meshroot_core::ProvisionedNode;
use meshroot_types::{Address, AppKeyIndex, DeviceUuid, NodeIndex, NodeRecord, NodeState};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of registering a provisioned device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub address: Address,
    /// The uuid was already known before this registration.
    pub reprovisioned: bool,
}

/// Owns all node records.
///
/// Records are indexed by address (primary) and by uuid. Iteration follows
/// registration order. Records are never removed.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: IndexMap<Address, NodeRecord>,
    by_uuid: HashMap<DeviceUuid, Address>,
}

impl NodeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update the record for a freshly provisioned device.
    ///
    /// A known uuid starts a new onboarding attempt on its existing record,
    /// which moves to the new address if the transport assigned a different
    /// one. Fails without changing anything if the address belongs to a
    /// different device.
    pub fn register(
        &mut self,
        node: &ProvisionedNode,
        app_key_index: AppKeyIndex,
    ) -> Result<Registration, RegistryError> {
        if let Some(existing) = self.nodes.get(&node.address) {
            if existing.uuid != node.uuid {
                return Err(RegistryError::AddressInUse {
                    address: node.address,
                    owner: existing.uuid,
                });
            }
        }

        if let Some(&old_address) = self.by_uuid.get(&node.uuid) {
            let mut record = self
                .nodes
                .shift_remove(&old_address)
                .ok_or(RegistryError::NotFound(old_address))?;
            record.restart_onboarding(
                node.node_index,
                node.address,
                node.element_count,
                node.net_key_index,
            );
            record.app_key_index = app_key_index;

            debug!(
                uuid = %node.uuid,
                old_addr = %old_address,
                addr = %node.address,
                attempts = record.attempts,
                "Device provisioned again"
            );

            self.by_uuid.insert(node.uuid, node.address);
            self.nodes.insert(node.address, record);
            return Ok(Registration {
                address: node.address,
                reprovisioned: true,
            });
        }

        let record = NodeRecord::new(
            node.uuid,
            node.node_index,
            node.address,
            node.element_count,
            node.net_key_index,
            app_key_index,
        );
        self.by_uuid.insert(node.uuid, node.address);
        self.nodes.insert(node.address, record);
        Ok(Registration {
            address: node.address,
            reprovisioned: false,
        })
    }

    /// Get a node by address.
    pub fn get(&self, address: Address) -> Option<&NodeRecord> {
        self.nodes.get(&address)
    }

    /// Get a mutable node by address.
    pub fn get_mut(&mut self, address: Address) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&address)
    }

    /// Get a node by uuid.
    pub fn get_by_uuid(&self, uuid: &DeviceUuid) -> Option<&NodeRecord> {
        self.by_uuid.get(uuid).and_then(|addr| self.nodes.get(addr))
    }

    /// Get a mutable node by the transport's node index.
    pub fn get_by_node_index_mut(&mut self, node_index: NodeIndex) -> Option<&mut NodeRecord> {
        self.nodes.values_mut().find(|n| n.node_index == node_index)
    }

    /// Check if a uuid has been provisioned before.
    pub fn contains_uuid(&self, uuid: &DeviceUuid) -> bool {
        self.by_uuid.contains_key(uuid)
    }

    /// Check if a node at `address` has been registered (and can be messaged).
    pub fn is_registered(&self, address: Address) -> bool {
        self.nodes
            .get(&address)
            .is_some_and(|node| node.state().is_registered())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Number of records in `state`.
    pub fn count_in_state(&self, state: NodeState) -> usize {
        self.nodes.values().filter(|n| n.state() == state).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshroot_types::NetKeyIndex;

    fn provisioned(index: u16, uuid: u8, address: u16) -> ProvisionedNode {
        ProvisionedNode {
            node_index: NodeIndex(index),
            uuid: DeviceUuid([uuid; 16]),
            address: Address(address),
            element_count: 1,
            net_key_index: NetKeyIndex::PRIMARY,
        }
    }

    #[test]
    fn test_register_new_and_lookup() {
        let mut registry = NodeRegistry::new();
        let reg = registry
            .register(&provisioned(1, 0xAA, 0x0002), AppKeyIndex(0))
            .unwrap();

        assert_eq!(reg.address, Address(0x0002));
        assert!(!reg.reprovisioned);
        assert!(registry.contains_uuid(&DeviceUuid([0xAA; 16])));
        assert_eq!(
            registry.get_by_uuid(&DeviceUuid([0xAA; 16])).unwrap().address,
            Address(0x0002)
        );
        // Discovered, not yet registered for messaging
        assert!(!registry.is_registered(Address(0x0002)));
    }

    #[test]
    fn test_address_conflict_rejected() {
        let mut registry = NodeRegistry::new();
        registry
            .register(&provisioned(1, 0xAA, 0x0002), AppKeyIndex(0))
            .unwrap();

        let err = registry
            .register(&provisioned(2, 0xBB, 0x0002), AppKeyIndex(0))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::AddressInUse {
                address: Address(0x0002),
                owner: DeviceUuid([0xAA; 16]),
            }
        );
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains_uuid(&DeviceUuid([0xBB; 16])));
    }

    #[test]
    fn test_reprovision_moves_record() {
        let mut registry = NodeRegistry::new();
        registry
            .register(&provisioned(1, 0xAA, 0x0002), AppKeyIndex(0))
            .unwrap();
        registry
            .register(&provisioned(2, 0xBB, 0x0003), AppKeyIndex(0))
            .unwrap();

        let reg = registry
            .register(&provisioned(3, 0xAA, 0x0005), AppKeyIndex(0))
            .unwrap();
        assert!(reg.reprovisioned);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(Address(0x0002)).is_none());

        let node = registry.get(Address(0x0005)).unwrap();
        assert_eq!(node.attempts, 2);
        assert_eq!(node.node_index, NodeIndex(3));
        assert_eq!(node.state(), NodeState::Discovered);

        // Addresses stay pairwise distinct
        let addrs: Vec<_> = registry.iter().map(|n| n.address).collect();
        assert_eq!(addrs, vec![Address(0x0003), Address(0x0005)]);
    }

    #[test]
    fn test_count_in_state() {
        let mut registry = NodeRegistry::new();
        registry
            .register(&provisioned(1, 0xAA, 0x0002), AppKeyIndex(0))
            .unwrap();
        registry
            .get_mut(Address(0x0002))
            .unwrap()
            .advance(NodeState::Registered)
            .unwrap();

        assert_eq!(registry.count_in_state(NodeState::Registered), 1);
        assert_eq!(registry.count_in_state(NodeState::Discovered), 0);
        assert!(registry.is_registered(Address(0x0002)));
    }
}
