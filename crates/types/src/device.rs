//! Device identity and unprovisioned-device advertisement types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 16-byte device UUID. Immutable identity of a device across provisioning attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceUuid(pub [u8; 16]);

impl DeviceUuid {
    /// Get the bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Whether the UUID begins with `prefix`.
    pub fn matches_prefix(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// 6-byte Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|b| format!("{:02x}", b)).collect();
        write!(f, "{}", parts.join(":"))
    }
}

/// Bluetooth address type of the advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrType {
    Public,
    Random,
    RpaPublic,
    RpaRandom,
}

/// Provisioning bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bearer {
    /// PB-ADV.
    Adv,
    /// PB-GATT.
    Gatt,
}

impl fmt::Display for Bearer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bearer::Adv => write!(f, "PB-ADV"),
            Bearer::Gatt => write!(f, "PB-GATT"),
        }
    }
}

/// Set of bearers enabled on the provisioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BearerSet {
    pub adv: bool,
    pub gatt: bool,
}

impl BearerSet {
    /// Both PB-ADV and PB-GATT.
    pub const ALL: Self = BearerSet {
        adv: true,
        gatt: true,
    };

    /// Whether the set includes `bearer`.
    pub fn contains(&self, bearer: Bearer) -> bool {
        match bearer {
            Bearer::Adv => self.adv,
            Bearer::Gatt => self.gatt,
        }
    }
}

impl Default for BearerSet {
    fn default() -> Self {
        Self::ALL
    }
}

/// An unprovisioned-device beacon seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprovisionedDevice {
    pub uuid: DeviceUuid,
    pub mac: MacAddress,
    pub addr_type: AddrType,
    pub oob_info: u16,
    pub adv_type: u8,
    pub bearer: Bearer,
}

/// Flags passed along with an add-unprovisioned-device request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddDeviceFlags {
    /// Remove the device from the transport's queue once provisioned.
    pub remove_after_provision: bool,
    /// Start provisioning immediately instead of waiting for the next beacon.
    pub start_immediately: bool,
    /// Allow the transport to evict the entry when its queue is full.
    pub flushable: bool,
}

impl AddDeviceFlags {
    /// The flag set used for every admission.
    pub const ADMIT: Self = AddDeviceFlags {
        remove_after_provision: true,
        start_immediately: true,
        flushable: true,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_display_and_prefix() {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xdd;
        bytes[1] = 0xdd;
        bytes[15] = 0x0a;
        let uuid = DeviceUuid(bytes);
        assert_eq!(uuid.to_string(), "DDDD000000000000000000000000000A");
        assert!(uuid.matches_prefix(&[0xdd, 0xdd]));
        assert!(!uuid.matches_prefix(&[0xdd, 0xde]));
        assert!(uuid.matches_prefix(&[]));
    }

    #[test]
    fn test_mac_display() {
        let mac = MacAddress([0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03]);
        assert_eq!(mac.to_string(), "aa:bb:cc:01:02:03");
    }

    #[test]
    fn test_bearer_set() {
        let adv_only = BearerSet {
            adv: true,
            gatt: false,
        };
        assert!(adv_only.contains(Bearer::Adv));
        assert!(!adv_only.contains(Bearer::Gatt));
        assert!(BearerSet::default().contains(Bearer::Gatt));
    }
}
