//! Opcode table shared by the config, fast-provisioning and application protocols.
//!
//! The vendor protocol multiplexes its channels over one three-byte opcode
//! space; the fast-provisioning ops sit in the low range and the
//! application ops above them so the two never collide.

use meshroot_types::Opcode;

/// Company identifier carried by every vendor opcode and vendor model.
pub const COMPANY_ID: u16 = 0x02E5;

/// Largest access-layer payload (380 octets) minus a three-byte vendor opcode.
pub const MAX_VENDOR_PAYLOAD: usize = 377;

/// SIG configuration opcodes.
pub mod config {
    use super::Opcode;

    pub const APP_KEY_ADD: Opcode = Opcode(0x0000);
    pub const COMPOSITION_DATA_STATUS: Opcode = Opcode(0x0002);
    pub const APP_KEY_STATUS: Opcode = Opcode(0x8003);
    pub const COMPOSITION_DATA_GET: Opcode = Opcode(0x8008);
}

/// Fast-provisioning vendor opcodes.
pub mod fast_prov {
    use super::{Opcode, COMPANY_ID};

    pub const INFO_SET: Opcode = Opcode::vendor(0x00, COMPANY_ID);
    pub const INFO_STATUS: Opcode = Opcode::vendor(0x01, COMPANY_ID);
    pub const NET_KEY_ADD: Opcode = Opcode::vendor(0x02, COMPANY_ID);
    pub const NET_KEY_STATUS: Opcode = Opcode::vendor(0x03, COMPANY_ID);
    pub const NODE_ADDR_GET: Opcode = Opcode::vendor(0x04, COMPANY_ID);
    pub const NODE_ADDR_STATUS: Opcode = Opcode::vendor(0x05, COMPANY_ID);

    /// Whether `opcode` is one of the fast-provisioning status messages.
    pub fn is_status(opcode: Opcode) -> bool {
        opcode == INFO_STATUS || opcode == NET_KEY_STATUS || opcode == NODE_ADDR_STATUS
    }
}

/// Application protocol vendor opcodes.
pub mod vendor {
    use super::{Opcode, COMPANY_ID};

    /// Directed message; expects a [`RESPONSE`].
    pub const MESSAGE: Opcode = Opcode::vendor(0x10, COMPANY_ID);
    /// Reply to a [`MESSAGE`].
    pub const RESPONSE: Opcode = Opcode::vendor(0x11, COMPANY_ID);
    /// Unacknowledged message to all nodes.
    pub const BROADCAST: Opcode = Opcode::vendor(0x12, COMPANY_ID);
    /// Status paired with [`BROADCAST`]; never sent.
    pub const EMPTY: Opcode = Opcode::vendor(0x13, COMPANY_ID);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_opcodes_distinct() {
        let all = [
            fast_prov::INFO_SET,
            fast_prov::INFO_STATUS,
            fast_prov::NET_KEY_ADD,
            fast_prov::NET_KEY_STATUS,
            fast_prov::NODE_ADDR_GET,
            fast_prov::NODE_ADDR_STATUS,
            vendor::MESSAGE,
            vendor::RESPONSE,
            vendor::BROADCAST,
            vendor::EMPTY,
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(a.is_vendor());
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_fast_prov_status_classification() {
        assert!(fast_prov::is_status(fast_prov::INFO_STATUS));
        assert!(fast_prov::is_status(fast_prov::NODE_ADDR_STATUS));
        assert!(!fast_prov::is_status(fast_prov::INFO_SET));
        assert!(!fast_prov::is_status(vendor::RESPONSE));
    }
}
