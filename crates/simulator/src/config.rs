//! Configuration types for the simulator.

use meshroot_provisioner::ProvisionerConfig;
use meshroot_simulation::{NetworkConfig, WorkloadConfig};
use serde::Deserialize;
use std::time::Duration;

/// Configuration for a simulation run, loadable from TOML.
///
/// ```toml
/// seed = 7
/// duration_secs = 120
///
/// [provisioner]
/// max_node_num = 8
///
/// [network]
/// devices = 10
/// config_loss_rate = 0.1
///
/// [workload]
/// message_interval_ms = 500
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Random seed for deterministic simulation.
    pub seed: u64,

    /// Simulated time to run.
    pub duration_secs: u64,

    pub provisioner: ProvisionerConfig,

    pub network: NetworkSection,

    pub workload: WorkloadSection,
}

impl SimulatorConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the simulated run time.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_secs = duration.as_secs();
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Convert to a NetworkConfig for the underlying simulation.
    pub fn to_network_config(&self) -> NetworkConfig {
        let network = &self.network;
        NetworkConfig {
            num_devices: network.devices,
            foreign_devices: network.foreign_devices,
            uuid_prefix: self.provisioner.match_filter.clone(),
            gatt_ratio: network.gatt_ratio.clamp(0.0, 1.0),
            start_address: self.provisioner.start_address,
            element_count: network.element_count,
            own_address: self.provisioner.own_address,
            min_latency: Duration::from_millis(network.min_latency_ms),
            max_latency: Duration::from_millis(network.max_latency_ms),
            config_loss_rate: network.config_loss_rate.clamp(0.0, 1.0),
            message_loss_rate: network.message_loss_rate.clamp(0.0, 1.0),
            app_key_reject_rate: network.app_key_reject_rate.clamp(0.0, 1.0),
            report_timeouts: network.report_timeouts,
            ..NetworkConfig::default()
        }
    }

    pub fn to_workload_config(&self) -> WorkloadConfig {
        let ms = |v: u64| (v > 0).then(|| Duration::from_millis(v));
        WorkloadConfig {
            message_interval: ms(self.workload.message_interval_ms),
            broadcast_interval: ms(self.workload.broadcast_interval_ms),
            inbound_interval: ms(self.workload.inbound_interval_ms),
            payload_len: self.workload.payload_len,
        }
    }
}

const DEFAULT_DURATION_SECS: u64 = 60;

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            duration_secs: DEFAULT_DURATION_SECS,
            provisioner: ProvisionerConfig::default(),
            network: NetworkSection::default(),
            workload: WorkloadSection::default(),
        }
    }
}

/// `[network]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub devices: usize,
    pub foreign_devices: usize,
    pub gatt_ratio: f64,
    pub element_count: u8,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub config_loss_rate: f64,
    pub message_loss_rate: f64,
    pub app_key_reject_rate: f64,
    pub report_timeouts: bool,
}

impl Default for NetworkSection {
    fn default() -> Self {
        let defaults = NetworkConfig::default();
        Self {
            devices: defaults.num_devices,
            foreign_devices: defaults.foreign_devices,
            gatt_ratio: defaults.gatt_ratio,
            element_count: defaults.element_count,
            min_latency_ms: defaults.min_latency.as_millis() as u64,
            max_latency_ms: defaults.max_latency.as_millis() as u64,
            config_loss_rate: defaults.config_loss_rate,
            message_loss_rate: defaults.message_loss_rate,
            app_key_reject_rate: defaults.app_key_reject_rate,
            report_timeouts: defaults.report_timeouts,
        }
    }
}

/// `[workload]` table. Zero intervals disable a traffic source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkloadSection {
    pub message_interval_ms: u64,
    pub broadcast_interval_ms: u64,
    pub inbound_interval_ms: u64,
    pub payload_len: usize,
}

impl Default for WorkloadSection {
    fn default() -> Self {
        let defaults = WorkloadConfig::default();
        let ms = |d: Option<Duration>| d.map_or(0, |d| d.as_millis() as u64);
        Self {
            message_interval_ms: ms(defaults.message_interval),
            broadcast_interval_ms: ms(defaults.broadcast_interval),
            inbound_interval_ms: ms(defaults.inbound_interval),
            payload_len: defaults.payload_len,
        }
    }
}
