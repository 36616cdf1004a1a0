//! Configuration for the provisioning authority.

use meshroot_types::{
    Address, AppKeyIndex, BearerSet, FastProvAllocation, KeyMaterial, MessageRole, NetKeyIndex,
    APP_KEY_LEN, DEFAULT_SEND_TTL, MAX_MATCH_FILTER_LEN,
};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Address {field} = {address} is not a unicast address")]
    NotUnicast { field: &'static str, address: Address },

    #[error("Fast-prov range is empty: {min} > {max}")]
    EmptyRange { min: Address, max: Address },

    #[error("Match filter too long: {0} bytes")]
    MatchFilterTooLong(usize),
}

/// Configuration for provisioning, onboarding and messaging.
///
/// Every field has a default, so a TOML file only needs to name the values
/// it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// The provisioner's own unicast address.
    pub own_address: Address,

    /// First address the transport hands to provisioned devices.
    pub start_address: Address,

    pub net_key_index: NetKeyIndex,

    pub app_key_index: AppKeyIndex,

    /// AppKey distributed to every node. Hex in TOML.
    #[serde(deserialize_with = "de_app_key")]
    pub app_key: [u8; APP_KEY_LEN],

    /// Initial provisioning quota: how many new devices may be admitted.
    ///
    /// Re-provisioned devices are admitted regardless.
    pub max_node_num: u32,

    /// Number of addresses a sub-provisioner may assign.
    pub node_addr_count: u16,

    pub unicast_min: Address,

    pub unicast_max: Address,

    pub prov_flags: u8,

    pub iv_index: u32,

    pub fast_prov_net_index: NetKeyIndex,

    pub group_address: Address,

    /// Device-uuid prefix the provisioner (and its sub-provisioners) admit.
    #[serde(deserialize_with = "de_hex")]
    pub match_filter: Vec<u8>,

    /// Response timeout for directed requests.
    #[serde(rename = "message_timeout_ms", with = "duration_ms")]
    pub message_timeout: Duration,

    pub send_ttl: u8,

    pub role: MessageRole,

    /// Fetch composition data page 0 before distributing the AppKey.
    pub fetch_composition_data: bool,

    /// Interval of the sweep releasing requests whose timeout event was lost.
    ///
    /// `None` disables the sweep.
    #[serde(rename = "request_sweep_interval_ms", with = "opt_duration_ms")]
    pub request_sweep_interval: Option<Duration>,

    pub bearers: BearerSet,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            own_address: Address(0x0001),
            start_address: Address(0x0005),
            net_key_index: NetKeyIndex::PRIMARY,
            app_key_index: AppKeyIndex(0x0000),
            app_key: [0x12; APP_KEY_LEN],
            max_node_num: 1,
            node_addr_count: 100,
            unicast_min: Address(0x0100),
            unicast_max: Address::UNICAST_MAX,
            prov_flags: 0,
            iv_index: 0,
            fast_prov_net_index: NetKeyIndex::PRIMARY,
            group_address: Address(0xC000),
            match_filter: vec![0xDD, 0xDD],
            message_timeout: Duration::from_secs(4),
            send_ttl: DEFAULT_SEND_TTL,
            role: MessageRole::Provisioner,
            fetch_composition_data: false,
            request_sweep_interval: Some(Duration::from_secs(10)),
            bearers: BearerSet::ALL,
        }
    }
}

impl ProvisionerConfig {
    /// Create a new config with a custom quota.
    pub fn with_max_node_num(max_node_num: u32) -> Self {
        Self {
            max_node_num,
            ..Default::default()
        }
    }

    /// Set the AppKey bytes and index.
    pub fn with_app_key(mut self, app_key_index: AppKeyIndex, app_key: [u8; APP_KEY_LEN]) -> Self {
        self.app_key_index = app_key_index;
        self.app_key = app_key;
        self
    }

    /// Set the fast-prov unicast range.
    pub fn with_unicast_range(mut self, min: Address, max: Address) -> Self {
        self.unicast_min = min;
        self.unicast_max = max;
        self
    }

    /// Set the request timeout.
    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    /// Enable or disable fetching composition data before the AppKey.
    pub fn with_composition_fetch(mut self, enabled: bool) -> Self {
        self.fetch_composition_data = enabled;
        self
    }

    /// Set (or disable, with `None`) the stale-request sweep.
    pub fn with_request_sweep(mut self, interval: Option<Duration>) -> Self {
        self.request_sweep_interval = interval;
        self
    }

    /// Key material derived from this config.
    pub fn keys(&self) -> KeyMaterial {
        KeyMaterial::new(self.net_key_index, self.app_key_index, self.app_key)
    }

    /// The provisioner's own fast-prov parameters, as handed to new nodes.
    pub fn allocation_template(&self) -> FastProvAllocation {
        FastProvAllocation {
            addr_range_count: self.node_addr_count,
            unicast_min: self.unicast_min,
            unicast_max: self.unicast_max,
            flags: self.prov_flags,
            iv_index: self.iv_index,
            net_index: self.fast_prov_net_index,
            group_address: self.group_address,
            match_filter: self.match_filter.clone(),
            action: None,
        }
    }

    /// Check the invariants the orchestrator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, address) in [
            ("own_address", self.own_address),
            ("start_address", self.start_address),
            ("unicast_min", self.unicast_min),
            ("unicast_max", self.unicast_max),
        ] {
            if !address.is_unicast() {
                return Err(ConfigError::NotUnicast { field, address });
            }
        }
        if self.unicast_min > self.unicast_max {
            return Err(ConfigError::EmptyRange {
                min: self.unicast_min,
                max: self.unicast_max,
            });
        }
        if self.match_filter.len() > MAX_MATCH_FILTER_LEN {
            return Err(ConfigError::MatchFilterTooLong(self.match_filter.len()));
        }
        Ok(())
    }
}

fn de_hex<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
}

fn de_app_key<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<[u8; APP_KEY_LEN], D::Error> {
    let bytes = de_hex(deserializer)?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        serde::de::Error::custom(format!("app_key must be {} bytes, got {}", APP_KEY_LEN, b.len()))
    })
}

mod duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    /// Zero disables.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok((ms > 0).then(|| Duration::from_millis(ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProvisionerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_node_num, 1);
        assert_eq!(config.node_addr_count, 100);
        assert_eq!(config.unicast_max, Address(0x7FFF));
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: ProvisionerConfig = toml::from_str(
            r#"
            max_node_num = 5
            app_key = "000102030405060708090a0b0c0d0e0f"
            match_filter = "dddd01"
            message_timeout_ms = 2500
            request_sweep_interval_ms = 0
            unicast_min = 512
            "#,
        )
        .unwrap();

        assert_eq!(config.max_node_num, 5);
        assert_eq!(config.app_key[15], 0x0f);
        assert_eq!(config.match_filter, vec![0xdd, 0xdd, 0x01]);
        assert_eq!(config.message_timeout, Duration::from_millis(2500));
        assert_eq!(config.request_sweep_interval, None);
        assert_eq!(config.unicast_min, Address(0x0200));
        // Untouched fields keep their defaults
        assert_eq!(config.group_address, Address(0xC000));
    }

    #[test]
    fn test_short_app_key_rejected() {
        let result: Result<ProvisionerConfig, _> = toml::from_str(r#"app_key = "0011""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_range() {
        let config = ProvisionerConfig::default()
            .with_unicast_range(Address(0x0200), Address(0x0100));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyRange { .. })
        ));

        let config = ProvisionerConfig {
            own_address: Address(0xC001),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotUnicast { field: "own_address", .. })
        ));
    }
}
