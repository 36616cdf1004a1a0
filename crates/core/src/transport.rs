//! The narrow interface into the mesh transport stack.
//!
//! The orchestrator never talks to the radio stack directly. It emits
//! [`TransportCall`]s; the dispatcher hands each one to a [`MeshTransport`]
//! implementation via [`execute`].

use crate::opcodes::{self, COMPANY_ID};
use meshroot_types::{
    AddDeviceFlags, Address, AppKeyIndex, BearerSet, KeyMaterial, MessageContext, MessageRole,
    NetKeyIndex, NodeIndex, Opcode, UnprovisionedDevice, APP_KEY_LEN,
};
use std::time::Duration;
use thiserror::Error;

/// A call into the transport failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Transport call {call} failed (err {code})")]
pub struct TransportError {
    /// Name of the failed call.
    pub call: &'static str,
    /// Stack-specific error code.
    pub code: i32,
}

impl TransportError {
    /// Create a transport error.
    pub fn new(call: &'static str, code: i32) -> Self {
        Self { call, code }
    }
}

/// Local models the provisioner sends from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// SIG configuration client.
    ConfigClient,
    /// Fast-provisioning vendor client.
    FastProvClient,
    /// Application vendor client (sends messages and broadcasts).
    VendorClient,
    /// Application vendor server (sends responses).
    VendorServer,
}

impl ModelKind {
    /// `(company_id, model_id)` of a vendor model, `None` for SIG models.
    pub fn vendor_id(self) -> Option<(u16, u16)> {
        match self {
            ModelKind::ConfigClient => None,
            ModelKind::FastProvClient => Some((COMPANY_ID, 0x0001)),
            ModelKind::VendorClient => Some((COMPANY_ID, 0x0010)),
            ModelKind::VendorServer => Some((COMPANY_ID, 0x0011)),
        }
    }
}

/// Request sent through the configuration client.
#[derive(Clone, PartialEq, Eq)]
pub enum ConfigRequest {
    AppKeyAdd {
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
        app_key: [u8; APP_KEY_LEN],
    },
    CompositionDataGet {
        page: u8,
    },
}

impl ConfigRequest {
    /// AppKey-Add carrying the process key material.
    pub fn app_key_add(keys: &KeyMaterial) -> Self {
        ConfigRequest::AppKeyAdd {
            net_key_index: keys.net_key_index,
            app_key_index: keys.app_key_index,
            app_key: keys.app_key,
        }
    }

    /// Opcode the request is sent with.
    pub fn opcode(&self) -> Opcode {
        match self {
            ConfigRequest::AppKeyAdd { .. } => opcodes::config::APP_KEY_ADD,
            ConfigRequest::CompositionDataGet { .. } => opcodes::config::COMPOSITION_DATA_GET,
        }
    }
}

impl std::fmt::Debug for ConfigRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigRequest::AppKeyAdd {
                net_key_index,
                app_key_index,
                ..
            } => f
                .debug_struct("AppKeyAdd")
                .field("net_key_index", net_key_index)
                .field("app_key_index", app_key_index)
                .finish_non_exhaustive(),
            ConfigRequest::CompositionDataGet { page } => f
                .debug_struct("CompositionDataGet")
                .field("page", page)
                .finish(),
        }
    }
}

/// A message sent from a local client model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSend {
    pub model: ModelKind,
    pub context: MessageContext,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    /// Response timeout; zero means the transport does not track a response.
    pub timeout: Duration,
    /// Whether the transport expects a response (acknowledged send).
    pub ack: bool,
    pub role: MessageRole,
}

/// The transport's view of a provisioned node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHandle {
    pub node_index: NodeIndex,
    pub address: Address,
    pub name: Option<String>,
}

/// Every call the orchestrator can ask the transport to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    SetUuidMatch {
        prefix: Vec<u8>,
    },
    EnableProvisioning {
        bearers: BearerSet,
    },
    AddLocalAppKey {
        keys: KeyMaterial,
    },
    BindLocalModel {
        element: Address,
        model: ModelKind,
        app_key_index: AppKeyIndex,
    },
    AddUnprovisionedDevice {
        device: UnprovisionedDevice,
        flags: AddDeviceFlags,
    },
    SetNodeName {
        node_index: NodeIndex,
        name: String,
    },
    StoreCompositionData {
        address: Address,
        data: Vec<u8>,
    },
    ConfigClientSend {
        context: MessageContext,
        request: ConfigRequest,
    },
    ClientModelSend(ClientSend),
    ServerModelSend {
        model: ModelKind,
        context: MessageContext,
        opcode: Opcode,
        payload: Vec<u8>,
    },
}

impl TransportCall {
    /// Get a human-readable name for this call.
    pub fn type_name(&self) -> &'static str {
        match self {
            TransportCall::SetUuidMatch { .. } => "set_uuid_match",
            TransportCall::EnableProvisioning { .. } => "enable_provisioning",
            TransportCall::AddLocalAppKey { .. } => "add_local_app_key",
            TransportCall::BindLocalModel { .. } => "bind_local_model",
            TransportCall::AddUnprovisionedDevice { .. } => "add_unprovisioned_device",
            TransportCall::SetNodeName { .. } => "set_node_name",
            TransportCall::StoreCompositionData { .. } => "store_node_composition_data",
            TransportCall::ConfigClientSend { .. } => "config_client_set_state",
            TransportCall::ClientModelSend(_) => "client_model_send",
            TransportCall::ServerModelSend { .. } => "server_model_send",
        }
    }

    /// Destination address of a message-sending call.
    pub fn destination(&self) -> Option<Address> {
        match self {
            TransportCall::ConfigClientSend { context, .. }
            | TransportCall::ServerModelSend { context, .. } => Some(context.address),
            TransportCall::ClientModelSend(send) => Some(send.context.address),
            _ => None,
        }
    }
}

/// Outbound interface of the mesh transport stack.
///
/// Every method either succeeds synchronously or reports a
/// [`TransportError`]; completions arrive later as events.
pub trait MeshTransport {
    fn set_uuid_match(&mut self, prefix: &[u8]) -> Result<(), TransportError>;

    fn enable_provisioning(&mut self, bearers: BearerSet) -> Result<(), TransportError>;

    fn add_local_app_key(&mut self, keys: &KeyMaterial) -> Result<(), TransportError>;

    fn bind_local_model(
        &mut self,
        element: Address,
        model: ModelKind,
        app_key_index: AppKeyIndex,
    ) -> Result<(), TransportError>;

    /// Queue a device for provisioning.
    fn add_unprovisioned_device(
        &mut self,
        device: &UnprovisionedDevice,
        flags: AddDeviceFlags,
    ) -> Result<(), TransportError>;

    fn set_node_name(&mut self, node_index: NodeIndex, name: &str) -> Result<(), TransportError>;

    /// Look up the transport's own record of a node.
    fn get_node_by_address(&self, address: Address) -> Option<NodeHandle>;

    fn store_node_composition_data(
        &mut self,
        address: Address,
        data: &[u8],
    ) -> Result<(), TransportError>;

    fn config_client_send(
        &mut self,
        context: &MessageContext,
        request: &ConfigRequest,
    ) -> Result<(), TransportError>;

    fn client_model_send(&mut self, send: &ClientSend) -> Result<(), TransportError>;

    fn server_model_send(
        &mut self,
        model: ModelKind,
        context: &MessageContext,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<(), TransportError>;
}

/// Perform `call` against `transport`.
pub fn execute<T: MeshTransport + ?Sized>(
    transport: &mut T,
    call: &TransportCall,
) -> Result<(), TransportError> {
    match call {
        TransportCall::SetUuidMatch { prefix } => transport.set_uuid_match(prefix),
        TransportCall::EnableProvisioning { bearers } => transport.enable_provisioning(*bearers),
        TransportCall::AddLocalAppKey { keys } => transport.add_local_app_key(keys),
        TransportCall::BindLocalModel {
            element,
            model,
            app_key_index,
        } => transport.bind_local_model(*element, *model, *app_key_index),
        TransportCall::AddUnprovisionedDevice { device, flags } => {
            transport.add_unprovisioned_device(device, *flags)
        }
        TransportCall::SetNodeName { node_index, name } => {
            transport.set_node_name(*node_index, name)
        }
        TransportCall::StoreCompositionData { address, data } => {
            transport.store_node_composition_data(*address, data)
        }
        TransportCall::ConfigClientSend { context, request } => {
            transport.config_client_send(context, request)
        }
        TransportCall::ClientModelSend(send) => transport.client_model_send(send),
        TransportCall::ServerModelSend {
            model,
            context,
            opcode,
            payload,
        } => transport.server_model_send(*model, context, *opcode, payload),
    }
}
