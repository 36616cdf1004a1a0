//! Provisioned-node records and their onboarding state.

use crate::{Address, AppKeyIndex, DeviceUuid, NetKeyIndex, NodeIndex};
use std::fmt;
use thiserror::Error;

/// Maximum length of a fast-provisioning device-uuid match filter.
pub const MAX_MATCH_FILTER_LEN: usize = 16;

/// Onboarding state of a node.
///
/// Variants are ordered along the onboarding path; a node only moves
/// forward along that order. `Stuck` is terminal and only reachable from
/// `AppKeyRequested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeState {
    Discovered,
    Named,
    Registered,
    AppKeyRequested,
    AppKeyBound,
    FastProvSent,
    Ready,
    Stuck,
}

impl NodeState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: NodeState) -> bool {
        match (self, next) {
            (NodeState::AppKeyRequested, NodeState::Stuck) => true,
            (_, NodeState::Stuck) | (NodeState::Stuck, _) => false,
            (from, to) => to > from,
        }
    }

    /// Whether the node has been registered (and can be addressed).
    pub fn is_registered(self) -> bool {
        self >= NodeState::Registered
    }

    /// Whether onboarding has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Ready | NodeState::Stuck)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal node state transition {from} -> {to}")]
pub struct StateTransitionError {
    pub from: NodeState,
    pub to: NodeState,
}

/// Commit marker bit of the fast-provisioning action byte.
pub const FAST_PROV_ACTION_COMMIT: u8 = 0x80;

/// Action carried in a Fast-Prov-Info-Set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FastProvAction {
    /// Freshly computed allocation.
    Allocate,
    /// Previously handed-out allocation, re-sent unchanged.
    Reaffirm,
}

impl FastProvAction {
    /// Encoded action byte. Both variants carry the commit marker.
    pub fn as_byte(self) -> u8 {
        match self {
            FastProvAction::Allocate => FAST_PROV_ACTION_COMMIT | 0x01,
            FastProvAction::Reaffirm => FAST_PROV_ACTION_COMMIT,
        }
    }

    /// Decode an action byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x81 => Some(FastProvAction::Allocate),
            0x80 => Some(FastProvAction::Reaffirm),
            _ => None,
        }
    }
}

/// Addressing and key parameters handed to a node so it can act as a
/// sub-provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastProvAllocation {
    pub addr_range_count: u16,
    pub unicast_min: Address,
    pub unicast_max: Address,
    pub flags: u8,
    pub iv_index: u32,
    pub net_index: NetKeyIndex,
    pub group_address: Address,
    pub match_filter: Vec<u8>,
    pub action: Option<FastProvAction>,
}

impl FastProvAllocation {
    /// Whether this record carries a previously assigned range.
    pub fn has_valid_range(&self) -> bool {
        self.unicast_min.is_unicast()
    }
}

impl Default for FastProvAllocation {
    fn default() -> Self {
        Self {
            addr_range_count: 0,
            unicast_min: Address::UNASSIGNED,
            unicast_max: Address::UNASSIGNED,
            flags: 0,
            iv_index: 0,
            net_index: NetKeyIndex::PRIMARY,
            group_address: Address::UNASSIGNED,
            match_filter: Vec::new(),
            action: None,
        }
    }
}

/// One provisioned device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub uuid: DeviceUuid,
    pub node_index: NodeIndex,
    pub address: Address,
    pub element_count: u8,
    pub net_key_index: NetKeyIndex,
    pub app_key_index: AppKeyIndex,
    pub name: Option<String>,
    state: NodeState,
    /// The uuid was already registered before the current onboarding attempt.
    pub reprovisioned: bool,
    /// Number of onboarding attempts, starting at 1.
    pub attempts: u32,
    pub fast_prov: FastProvAllocation,
}

impl NodeRecord {
    /// Create a record for a node that has just been provisioned.
    pub fn new(
        uuid: DeviceUuid,
        node_index: NodeIndex,
        address: Address,
        element_count: u8,
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
    ) -> Self {
        Self {
            uuid,
            node_index,
            address,
            element_count,
            net_key_index,
            app_key_index,
            name: None,
            state: NodeState::Discovered,
            reprovisioned: false,
            attempts: 1,
            fast_prov: FastProvAllocation::default(),
        }
    }

    /// Current onboarding state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Move the node forward to `next`.
    pub fn advance(&mut self, next: NodeState) -> Result<(), StateTransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(StateTransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Begin a new onboarding attempt for a device provisioned again.
    ///
    /// The allocation is kept; state starts over from `Discovered`.
    pub fn restart_onboarding(
        &mut self,
        node_index: NodeIndex,
        address: Address,
        element_count: u8,
        net_key_index: NetKeyIndex,
    ) {
        self.node_index = node_index;
        self.address = address;
        self.element_count = element_count;
        self.net_key_index = net_key_index;
        self.name = None;
        self.state = NodeState::Discovered;
        self.reprovisioned = true;
        self.attempts += 1;
    }

    /// Whether the fast-prov allocation must be (re)computed for this node.
    ///
    /// A node counts as new unless it is being re-provisioned and already
    /// holds a valid unicast range.
    pub fn needs_allocation(&self) -> bool {
        !self.reprovisioned || !self.fast_prov.has_valid_range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> NodeRecord {
        NodeRecord::new(
            DeviceUuid([0xAA; 16]),
            NodeIndex(1),
            Address(0x0002),
            1,
            NetKeyIndex::PRIMARY,
            AppKeyIndex(0),
        )
    }

    #[test]
    fn test_forward_transitions_only() {
        let mut node = record();
        assert!(node.advance(NodeState::Named).is_ok());
        assert!(node.advance(NodeState::Registered).is_ok());
        assert!(node.advance(NodeState::AppKeyRequested).is_ok());
        assert!(node.advance(NodeState::Registered).is_err());
        assert!(node.advance(NodeState::AppKeyBound).is_ok());
        assert!(node.advance(NodeState::FastProvSent).is_ok());
        assert!(node.advance(NodeState::Ready).is_ok());
        assert_eq!(node.state(), NodeState::Ready);
    }

    #[test]
    fn test_stuck_only_from_appkey_requested() {
        assert!(NodeState::AppKeyRequested.can_transition_to(NodeState::Stuck));
        assert!(!NodeState::Registered.can_transition_to(NodeState::Stuck));
        assert!(!NodeState::FastProvSent.can_transition_to(NodeState::Stuck));
        assert!(!NodeState::Stuck.can_transition_to(NodeState::Ready));
    }

    #[test]
    fn test_needs_allocation() {
        let mut node = record();
        assert!(node.needs_allocation());

        node.restart_onboarding(NodeIndex(2), Address(0x0003), 1, NetKeyIndex::PRIMARY);
        assert!(node.reprovisioned);
        assert_eq!(node.attempts, 2);
        assert!(node.needs_allocation());

        node.fast_prov.unicast_min = Address(0x0100);
        assert!(!node.needs_allocation());
    }

    #[test]
    fn test_fast_prov_action_bytes() {
        assert_eq!(FastProvAction::Allocate.as_byte(), 0x81);
        assert_eq!(FastProvAction::Reaffirm.as_byte(), 0x80);
        assert_eq!(FastProvAction::from_byte(0x81), Some(FastProvAction::Allocate));
        assert_eq!(FastProvAction::from_byte(0x01), None);
    }
}
