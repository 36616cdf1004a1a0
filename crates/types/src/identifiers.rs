//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 16-bit mesh address.
///
/// Unicast addresses identify exactly one element; the remaining ranges are
/// virtual, group and the fixed group addresses such as [`Address::ALL_NODES`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Address(pub u16);

impl Address {
    /// The unassigned address.
    pub const UNASSIGNED: Self = Address(0x0000);

    /// Reserved all-nodes group address.
    pub const ALL_NODES: Self = Address(0xFFFF);

    /// Highest valid unicast address.
    pub const UNICAST_MAX: Self = Address(0x7FFF);

    /// Whether this is a unicast address (0x0001..=0x7FFF).
    pub fn is_unicast(self) -> bool {
        self.0 != 0 && self.0 & 0x8000 == 0
    }

    /// Whether this is a group address (0xC000..=0xFFFF).
    pub fn is_group(self) -> bool {
        self.0 & 0xC000 == 0xC000
    }

    /// Address `count` elements after this one, if it stays unicast.
    pub fn offset(self, count: u16) -> Option<Self> {
        let next = Address(self.0.checked_add(count)?);
        next.is_unicast().then_some(next)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Index of a node in the transport's provisioned-node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u16);

impl NodeIndex {
    /// Name assigned to the node at this index: `NODE-` followed by the
    /// index as (at least two) lowercase hex digits.
    pub fn node_name(self) -> String {
        format!("NODE-{:02x}", self.0)
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Handle of a network key (not the key bytes).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NetKeyIndex(pub u16);

impl NetKeyIndex {
    /// The primary network key.
    pub const PRIMARY: Self = NetKeyIndex(0x0000);
}

impl fmt::Display for NetKeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetKey(0x{:03x})", self.0)
    }
}

/// Handle of an application key (not the key bytes).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AppKeyIndex(pub u16);

impl fmt::Display for AppKeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AppKey(0x{:03x})", self.0)
    }
}

/// Message opcode.
///
/// Config messages use one- and two-byte SIG opcodes, vendor messages use
/// three-byte opcodes carrying the company identifier in the low 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u32);

impl Opcode {
    /// Build a three-byte vendor opcode.
    pub const fn vendor(op: u8, company_id: u16) -> Self {
        Opcode(0x00C0_0000 | ((op as u32) << 16) | company_id as u32)
    }

    /// Whether this is a three-byte vendor opcode.
    pub fn is_vendor(self) -> bool {
        self.0 & 0x00C0_0000 == 0x00C0_0000
    }

    /// Get the raw value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_vendor() {
            write!(f, "0x{:06x}", self.0)
        } else {
            write!(f, "0x{:04x}", self.0)
        }
    }
}
