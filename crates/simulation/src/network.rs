//! Simulated mesh network.

use meshroot_core::opcodes::{config, fast_prov, vendor};
use meshroot_core::{
    ClientSend, ConfigClientEvent, ConfigEventKind, ConfigRequest, ConfigStatus, Event,
    FastProvInfoSet, FastProvStatus, MeshTransport, ModelKind, NodeHandle, ProvisionedNode,
    TransportError, VendorModelEvent,
};
use meshroot_types::{
    AddDeviceFlags, AddrType, Address, AppKeyIndex, Bearer, BearerSet, DeviceUuid, KeyMaterial,
    MacAddress, MessageContext, NetKeyIndex, NodeIndex, Opcode, UnprovisionedDevice,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

const ENOENT: i32 = -2;
const ENOMEM: i32 = -12;
const EINVAL: i32 = -22;
const EALREADY: i32 = -114;

/// Parameters of the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Devices whose UUID carries `uuid_prefix`.
    pub num_devices: usize,
    /// Devices with a foreign UUID prefix; the stack never reports them.
    pub foreign_devices: usize,
    /// UUID prefix of the matching devices.
    pub uuid_prefix: Vec<u8>,
    /// Fraction of devices advertising over PB-GATT instead of PB-ADV.
    pub gatt_ratio: f64,
    /// First unicast address handed out by the stack.
    pub start_address: Address,
    /// Elements per provisioned device.
    pub element_count: u8,
    /// Our own unicast address (destination of node-originated messages).
    pub own_address: Address,
    pub min_latency: Duration,
    pub max_latency: Duration,
    /// Interval between beacons of a device still waiting to be admitted.
    pub beacon_interval: Duration,
    /// Duration of the provisioning procedure itself.
    pub provisioning_time: Duration,
    /// Probability a config request (AppKey-Add) goes unanswered.
    pub config_loss_rate: f64,
    /// Probability a directed vendor message goes unanswered.
    pub message_loss_rate: f64,
    /// Probability a node rejects AppKey-Add.
    pub app_key_reject_rate: f64,
    /// Whether the stack reports timeouts of lost messages.
    pub report_timeouts: bool,
    /// Config-client response timeout of the stack.
    pub config_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            num_devices: 4,
            foreign_devices: 0,
            uuid_prefix: vec![0xDD, 0xDD],
            gatt_ratio: 0.0,
            start_address: Address(0x0005),
            element_count: 1,
            own_address: Address(0x0001),
            min_latency: Duration::from_millis(20),
            max_latency: Duration::from_millis(80),
            beacon_interval: Duration::from_millis(500),
            provisioning_time: Duration::from_secs(2),
            config_loss_rate: 0.0,
            message_loss_rate: 0.0,
            app_key_reject_rate: 0.0,
            report_timeouts: true,
            config_timeout: Duration::from_secs(4),
        }
    }
}

impl NetworkConfig {
    /// Create a network of `num_devices` matching devices.
    pub fn new(num_devices: usize) -> Self {
        Self {
            num_devices,
            ..Default::default()
        }
    }

    pub fn with_foreign_devices(mut self, count: usize) -> Self {
        self.foreign_devices = count;
        self
    }

    pub fn with_gatt_ratio(mut self, ratio: f64) -> Self {
        self.gatt_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_config_loss_rate(mut self, rate: f64) -> Self {
        self.config_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_message_loss_rate(mut self, rate: f64) -> Self {
        self.message_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_app_key_reject_rate(mut self, rate: f64) -> Self {
        self.app_key_reject_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_report_timeouts(mut self, report: bool) -> Self {
        self.report_timeouts = report;
        self
    }

    /// Total number of simulated devices.
    pub fn total_devices(&self) -> usize {
        self.num_devices + self.foreign_devices
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceStatus {
    Advertising,
    Provisioned,
}

#[derive(Debug, Clone)]
struct SimDevice {
    advertisement: UnprovisionedDevice,
    status: DeviceStatus,
}

/// Counters kept by the simulated stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshStats {
    pub devices_queued: u64,
    pub names_set: u64,
    pub compositions_stored: u64,
    pub app_key_adds: u64,
    pub fast_prov_info_sets: u64,
    pub messages_lost: u64,
    pub broadcasts: u64,
    pub responses_sent: u64,
}

/// In-memory [`MeshTransport`].
///
/// Every accepted call is answered by zero or more events, collected with
/// a delay in the outbox for the runner to schedule.
#[derive(Debug)]
pub struct SimulatedMesh {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    devices: Vec<SimDevice>,
    uuid_filter: Vec<u8>,
    bearers: Option<BearerSet>,
    local_keys: Option<KeyMaterial>,
    nodes: BTreeMap<Address, NodeHandle>,
    next_address: Address,
    next_node_index: u16,
    outbox: Vec<(Duration, Event)>,
    stats: MeshStats,
}

impl SimulatedMesh {
    pub fn new(config: NetworkConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let devices = (0..config.total_devices())
            .map(|i| {
                let foreign = i >= config.num_devices;
                let mut uuid = [0u8; 16];
                if !foreign {
                    let len = config.uuid_prefix.len().min(14);
                    uuid[..len].copy_from_slice(&config.uuid_prefix[..len]);
                }
                uuid[14..].copy_from_slice(&(i as u16).to_be_bytes());
                let bearer = if rng.gen::<f64>() < config.gatt_ratio {
                    Bearer::Gatt
                } else {
                    Bearer::Adv
                };
                let mut mac = [0u8; 6];
                rng.fill(&mut mac);
                SimDevice {
                    advertisement: UnprovisionedDevice {
                        uuid: DeviceUuid(uuid),
                        mac: MacAddress(mac),
                        addr_type: AddrType::Public,
                        oob_info: 0,
                        adv_type: 0,
                        bearer,
                    },
                    status: DeviceStatus::Advertising,
                }
            })
            .collect();

        Self {
            next_address: config.start_address,
            config,
            rng,
            devices,
            uuid_filter: Vec::new(),
            bearers: None,
            local_keys: None,
            nodes: BTreeMap::new(),
            next_node_index: 1,
            outbox: Vec::new(),
            stats: MeshStats::default(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Runner interface
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn stats(&self) -> &MeshStats {
        &self.stats
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Whether provisioning has been enabled on some bearer.
    pub fn is_provisioning(&self) -> bool {
        self.bearers.is_some()
    }

    /// Whether device `index` still sends beacons.
    pub fn is_advertising(&self, index: usize) -> bool {
        self.devices
            .get(index)
            .is_some_and(|d| d.status == DeviceStatus::Advertising)
    }

    /// The beacon of device `index`, if the stack would report it.
    ///
    /// Only beacons whose UUID matches the configured filter are reported,
    /// and only once provisioning is enabled.
    pub fn beacon(&self, index: usize) -> Option<Event> {
        let device = self.devices.get(index)?;
        if self.bearers.is_none()
            || device.status != DeviceStatus::Advertising
            || !device.advertisement.uuid.matches_prefix(&self.uuid_filter)
        {
            return None;
        }
        Some(Event::UnprovisionedDeviceSeen(device.advertisement.clone()))
    }

    /// A node-originated directed message to us from a random provisioned node.
    pub fn inbound_message(&mut self, payload: &[u8]) -> Option<Event> {
        if self.nodes.is_empty() {
            return None;
        }
        let pick = self.rng.gen_range(0..self.nodes.len());
        let address = *self.nodes.keys().nth(pick)?;
        Some(Event::VendorModel(VendorModelEvent::Operation {
            opcode: vendor::MESSAGE,
            context: self.inbound_context(address),
            payload: payload.to_vec(),
        }))
    }

    /// Take the events produced since the last call, with their delays.
    pub fn take_outbox(&mut self) -> Vec<(Duration, Event)> {
        std::mem::take(&mut self.outbox)
    }

    fn latency(&mut self) -> Duration {
        let min = self.config.min_latency.as_millis() as u64;
        let max = (self.config.max_latency.as_millis() as u64).max(min);
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    fn lost(&mut self, rate: f64) -> bool {
        self.rng.gen::<f64>() < rate
    }

    fn reply(&mut self, event: Event) {
        let delay = self.latency();
        self.outbox.push((delay, event));
    }

    fn inbound_context(&self, source: Address) -> MessageContext {
        let (net_key_index, app_key_index) = self
            .local_keys
            .as_ref()
            .map(|k| (k.net_key_index, k.app_key_index))
            .unwrap_or((NetKeyIndex::PRIMARY, AppKeyIndex(0)));
        MessageContext {
            net_key_index,
            app_key_index,
            address: source,
            recv_dst: self.config.own_address,
            send_ttl: 7,
        }
    }

    fn config_status(
        &mut self,
        opcode: Opcode,
        kind: ConfigEventKind,
        to: Address,
        status: ConfigStatus,
    ) {
        self.reply(Event::ConfigClient(ConfigClientEvent {
            kind,
            opcode,
            destination: to,
            result: Ok(status),
        }));
    }

    fn composition_page(&self) -> Vec<u8> {
        let mut page = vec![0x00];
        page.extend_from_slice(&meshroot_core::opcodes::COMPANY_ID.to_le_bytes());
        page.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x03, 0x00]);
        for _ in 0..self.config.element_count {
            page.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        }
        page
    }
}

impl MeshTransport for SimulatedMesh {
    fn set_uuid_match(&mut self, prefix: &[u8]) -> Result<(), TransportError> {
        self.uuid_filter = prefix.to_vec();
        Ok(())
    }

    fn enable_provisioning(&mut self, bearers: BearerSet) -> Result<(), TransportError> {
        if !bearers.adv && !bearers.gatt {
            return Err(TransportError::new("enable_provisioning", EINVAL));
        }
        self.bearers = Some(bearers);
        Ok(())
    }

    fn add_local_app_key(&mut self, keys: &KeyMaterial) -> Result<(), TransportError> {
        self.local_keys = Some(keys.clone());
        self.reply(Event::LocalAppKeyAdded {
            app_key_index: keys.app_key_index,
            result: Ok(()),
        });
        Ok(())
    }

    fn bind_local_model(
        &mut self,
        _element: Address,
        _model: ModelKind,
        app_key_index: AppKeyIndex,
    ) -> Result<(), TransportError> {
        match &self.local_keys {
            Some(keys) if keys.app_key_index == app_key_index => Ok(()),
            _ => Err(TransportError::new("bind_local_model", ENOENT)),
        }
    }

    fn add_unprovisioned_device(
        &mut self,
        device: &UnprovisionedDevice,
        _flags: AddDeviceFlags,
    ) -> Result<(), TransportError> {
        let Some(index) = self
            .devices
            .iter()
            .position(|d| d.advertisement.uuid == device.uuid)
        else {
            return Err(TransportError::new("add_unprovisioned_device", ENOENT));
        };
        if self.devices[index].status != DeviceStatus::Advertising {
            return Err(TransportError::new("add_unprovisioned_device", EALREADY));
        }

        let element_count = self.config.element_count.max(1);
        let address = self.next_address;
        let next = address
            .0
            .checked_add(element_count as u16)
            .filter(|n| Address(n - 1).is_unicast())
            .ok_or(TransportError::new("add_unprovisioned_device", ENOMEM))?;
        self.next_address = Address(next);

        let node_index = NodeIndex(self.next_node_index);
        self.next_node_index += 1;
        self.stats.devices_queued += 1;

        self.nodes.insert(
            address,
            NodeHandle {
                node_index,
                address,
                name: None,
            },
        );
        self.devices[index].status = DeviceStatus::Provisioned;
        debug!(uuid = %device.uuid, addr = %address, "Simulated provisioning started");

        let delay = self.config.provisioning_time + self.latency();
        self.outbox.push((
            delay,
            Event::ProvisioningComplete(ProvisionedNode {
                node_index,
                uuid: device.uuid,
                address,
                element_count,
                net_key_index: NetKeyIndex::PRIMARY,
            }),
        ));
        Ok(())
    }

    fn set_node_name(&mut self, node_index: NodeIndex, name: &str) -> Result<(), TransportError> {
        let node = self
            .nodes
            .values_mut()
            .find(|n| n.node_index == node_index)
            .ok_or(TransportError::new("set_node_name", ENOENT))?;
        node.name = Some(name.to_string());
        self.stats.names_set += 1;
        Ok(())
    }

    fn get_node_by_address(&self, address: Address) -> Option<NodeHandle> {
        self.nodes.get(&address).cloned()
    }

    fn store_node_composition_data(
        &mut self,
        address: Address,
        _data: &[u8],
    ) -> Result<(), TransportError> {
        if !self.nodes.contains_key(&address) {
            return Err(TransportError::new("store_node_composition_data", ENOENT));
        }
        self.stats.compositions_stored += 1;
        Ok(())
    }

    fn config_client_send(
        &mut self,
        context: &MessageContext,
        request: &ConfigRequest,
    ) -> Result<(), TransportError> {
        let to = context.address;
        if !self.nodes.contains_key(&to) {
            return Err(TransportError::new("config_client_set_state", ENOENT));
        }

        match request {
            ConfigRequest::AppKeyAdd { .. } => {
                self.stats.app_key_adds += 1;
                if self.lost(self.config.config_loss_rate) {
                    trace!(addr = %to, "AppKey-Add lost");
                    self.outbox.push((
                        self.config.config_timeout,
                        Event::ConfigClient(ConfigClientEvent {
                            kind: ConfigEventKind::Timeout,
                            opcode: config::APP_KEY_ADD,
                            destination: to,
                            result: Err(TransportError::new("config_client_set_state", -110)),
                        }),
                    ));
                    return Ok(());
                }
                let status = if self.rng.gen::<f64>() < self.config.app_key_reject_rate {
                    0x05
                } else {
                    0x00
                };
                self.config_status(
                    config::APP_KEY_ADD,
                    ConfigEventKind::Set,
                    to,
                    ConfigStatus {
                        status,
                        composition_data: None,
                    },
                );
            }
            ConfigRequest::CompositionDataGet { .. } => {
                let page = self.composition_page();
                self.config_status(
                    config::COMPOSITION_DATA_GET,
                    ConfigEventKind::Get,
                    to,
                    ConfigStatus {
                        status: 0,
                        composition_data: Some(page),
                    },
                );
            }
        }
        Ok(())
    }

    fn client_model_send(&mut self, send: &ClientSend) -> Result<(), TransportError> {
        let to = send.context.address;
        match (send.model, send.opcode) {
            (ModelKind::FastProvClient, fast_prov::INFO_SET) => {
                FastProvInfoSet::decode(&send.payload)
                    .map_err(|_| TransportError::new("client_model_send", EINVAL))?;
                self.stats.fast_prov_info_sets += 1;
                let context = self.inbound_context(to);
                self.reply(Event::VendorModel(VendorModelEvent::Operation {
                    opcode: fast_prov::INFO_STATUS,
                    context,
                    payload: FastProvStatus::SUCCESS.encode(),
                }));
            }
            (ModelKind::VendorClient, vendor::MESSAGE) => {
                if !self.nodes.contains_key(&to) {
                    return Err(TransportError::new("client_model_send", ENOENT));
                }
                if self.lost(self.config.message_loss_rate) {
                    self.stats.messages_lost += 1;
                    if self.config.report_timeouts {
                        self.outbox.push((
                            send.timeout,
                            Event::VendorModel(VendorModelEvent::SendTimeout {
                                opcode: send.opcode,
                                context: send.context.clone(),
                            }),
                        ));
                    }
                    return Ok(());
                }
                let context = self.inbound_context(to);
                self.reply(Event::VendorModel(VendorModelEvent::Operation {
                    opcode: vendor::RESPONSE,
                    context,
                    payload: send.payload.clone(),
                }));
            }
            (ModelKind::VendorClient, vendor::BROADCAST) => {
                self.stats.broadcasts += 1;
                self.reply(Event::VendorModel(VendorModelEvent::SendComplete {
                    opcode: send.opcode,
                    context: send.context.clone(),
                    result: Ok(()),
                }));
            }
            _ => return Err(TransportError::new("client_model_send", EINVAL)),
        }
        Ok(())
    }

    fn server_model_send(
        &mut self,
        model: ModelKind,
        context: &MessageContext,
        _opcode: Opcode,
        _payload: &[u8],
    ) -> Result<(), TransportError> {
        if model != ModelKind::VendorServer || !self.nodes.contains_key(&context.address) {
            return Err(TransportError::new("server_model_send", EINVAL));
        }
        self.stats.responses_sent += 1;
        Ok(())
    }
}
