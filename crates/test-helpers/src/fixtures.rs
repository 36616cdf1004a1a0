//! Ready-made devices, nodes and inbound events.

use meshroot_core::opcodes::{config, fast_prov, vendor};
use meshroot_core::{
    ConfigClientEvent, ConfigEventKind, ConfigStatus, Event, FastProvStatus, ProvisionedNode,
    TransportError, VendorModelEvent,
};
use meshroot_types::{
    AddrType, Address, AppKeyIndex, Bearer, DeviceUuid, MacAddress, MessageContext, NetKeyIndex,
    NodeIndex, UnprovisionedDevice, DEFAULT_SEND_TTL,
};

/// UUID whose first byte is `seed` and the rest `0xDD`.
pub fn uuid(seed: u8) -> DeviceUuid {
    let mut bytes = [0xDD; 16];
    bytes[0] = seed;
    DeviceUuid(bytes)
}

/// Advertisement of device `seed` over PB-ADV.
pub fn device(seed: u8) -> UnprovisionedDevice {
    device_on(seed, Bearer::Adv)
}

pub fn device_on(seed: u8, bearer: Bearer) -> UnprovisionedDevice {
    UnprovisionedDevice {
        uuid: uuid(seed),
        mac: MacAddress([0xC0, 0xFF, 0xEE, 0x00, 0x00, seed]),
        addr_type: AddrType::Public,
        oob_info: 0,
        adv_type: 0,
        bearer,
    }
}

/// Device `seed` provisioned as node `index` at `address`.
pub fn provisioned(seed: u8, index: u16, address: u16) -> ProvisionedNode {
    ProvisionedNode {
        node_index: NodeIndex(index),
        uuid: uuid(seed),
        address: Address(address),
        element_count: 1,
        net_key_index: NetKeyIndex::PRIMARY,
    }
}

/// Context of a message received from `source`.
pub fn context_from(source: Address) -> MessageContext {
    MessageContext {
        net_key_index: NetKeyIndex::PRIMARY,
        app_key_index: AppKeyIndex(0),
        address: source,
        recv_dst: Address(0x0001),
        send_ttl: DEFAULT_SEND_TTL,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Inbound events
// ═══════════════════════════════════════════════════════════════════════════

pub fn device_seen(seed: u8) -> Event {
    Event::UnprovisionedDeviceSeen(device(seed))
}

pub fn prov_complete(seed: u8, index: u16, address: u16) -> Event {
    Event::ProvisioningComplete(provisioned(seed, index, address))
}

/// AppKey Status from `address` with `status`.
pub fn app_key_status(address: u16, status: u8) -> Event {
    Event::ConfigClient(ConfigClientEvent {
        kind: ConfigEventKind::Set,
        opcode: config::APP_KEY_ADD,
        destination: Address(address),
        result: Ok(ConfigStatus {
            status,
            composition_data: None,
        }),
    })
}

pub fn app_key_timeout(address: u16) -> Event {
    Event::ConfigClient(ConfigClientEvent {
        kind: ConfigEventKind::Timeout,
        opcode: config::APP_KEY_ADD,
        destination: Address(address),
        result: Err(TransportError::new("config_client_set_state", -1)),
    })
}

pub fn composition_status(address: u16, data: Vec<u8>) -> Event {
    Event::ConfigClient(ConfigClientEvent {
        kind: ConfigEventKind::Get,
        opcode: config::COMPOSITION_DATA_GET,
        destination: Address(address),
        result: Ok(ConfigStatus {
            status: 0,
            composition_data: Some(data),
        }),
    })
}

pub fn fast_prov_status(address: u16, status: FastProvStatus) -> Event {
    Event::VendorModel(VendorModelEvent::Operation {
        opcode: fast_prov::INFO_STATUS,
        context: context_from(Address(address)),
        payload: status.encode(),
    })
}

pub fn message_from(address: u16, payload: &[u8]) -> Event {
    Event::VendorModel(VendorModelEvent::Operation {
        opcode: vendor::MESSAGE,
        context: context_from(Address(address)),
        payload: payload.to_vec(),
    })
}

pub fn response_from(address: u16, payload: &[u8]) -> Event {
    Event::VendorModel(VendorModelEvent::Operation {
        opcode: vendor::RESPONSE,
        context: context_from(Address(address)),
        payload: payload.to_vec(),
    })
}

pub fn broadcast_from(address: u16, payload: &[u8]) -> Event {
    Event::VendorModel(VendorModelEvent::Operation {
        opcode: vendor::BROADCAST,
        context: context_from(Address(address)),
        payload: payload.to_vec(),
    })
}

pub fn message_timeout(address: u16) -> Event {
    Event::VendorModel(VendorModelEvent::SendTimeout {
        opcode: vendor::MESSAGE,
        context: context_from(Address(address)),
    })
}
