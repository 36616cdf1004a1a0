//! Inbound events from the mesh transport.

use crate::{TimerId, TransportCall, TransportError};
use meshroot_types::{
    Address, AppKeyIndex, DeviceUuid, MessageContext, NetKeyIndex, NodeIndex, Opcode,
    UnprovisionedDevice,
};

/// A device that has just completed provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedNode {
    pub node_index: NodeIndex,
    pub uuid: DeviceUuid,
    pub address: Address,
    pub element_count: u8,
    pub net_key_index: NetKeyIndex,
}

/// Kind of configuration-client callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigEventKind {
    /// Status answering a Get request.
    Get,
    /// Status answering a Set request.
    Set,
    /// Unsolicited status published by a node.
    Publish,
    /// No status arrived in time.
    Timeout,
}

/// Status carried by a configuration-client callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStatus {
    /// Config status code; zero is success.
    pub status: u8,
    /// Page bytes of a Composition Data Status.
    pub composition_data: Option<Vec<u8>>,
}

impl ConfigStatus {
    /// Successful status without payload.
    pub fn success() -> Self {
        Self::default()
    }

    /// Whether the status code reports success.
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Configuration-client callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigClientEvent {
    pub kind: ConfigEventKind,
    pub opcode: Opcode,
    pub destination: Address,
    /// `Err` when the stack reports an error code for the exchange.
    pub result: Result<ConfigStatus, TransportError>,
}

/// Vendor-model callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorModelEvent {
    /// A message addressed to one of our vendor models arrived.
    Operation {
        opcode: Opcode,
        context: MessageContext,
        payload: Vec<u8>,
    },
    /// The transport finished sending one of our messages.
    SendComplete {
        opcode: Opcode,
        context: MessageContext,
        result: Result<(), TransportError>,
    },
    /// A publication was received by the client model.
    PublishReceived {
        opcode: Opcode,
        context: MessageContext,
        payload: Vec<u8>,
    },
    /// No response arrived for an acknowledged send.
    SendTimeout {
        opcode: Opcode,
        context: MessageContext,
    },
}

/// Events processed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Provisioning
    // ═══════════════════════════════════════════════════════════════════════
    /// Unprovisioned-device beacon.
    UnprovisionedDeviceSeen(UnprovisionedDevice),

    /// Provisioning of a device finished.
    ProvisioningComplete(ProvisionedNode),

    /// The transport finished installing the local AppKey.
    LocalAppKeyAdded {
        app_key_index: AppKeyIndex,
        result: Result<(), TransportError>,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Models
    // ═══════════════════════════════════════════════════════════════════════
    ConfigClient(ConfigClientEvent),

    VendorModel(VendorModelEvent),

    // ═══════════════════════════════════════════════════════════════════════
    // Dispatcher feedback
    // ═══════════════════════════════════════════════════════════════════════
    /// A call emitted by a previous action failed synchronously.
    TransportCallFailed {
        call: TransportCall,
        error: TransportError,
    },

    /// A timer requested via `Action::SetTimer` fired.
    Timer(TimerId),
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::UnprovisionedDeviceSeen(_) => "UnprovisionedDeviceSeen",
            Event::ProvisioningComplete(_) => "ProvisioningComplete",
            Event::LocalAppKeyAdded { .. } => "LocalAppKeyAdded",
            Event::ConfigClient(_) => "ConfigClient",
            Event::VendorModel(_) => "VendorModel",
            Event::TransportCallFailed { .. } => "TransportCallFailed",
            Event::Timer(_) => "Timer",
        }
    }
}
