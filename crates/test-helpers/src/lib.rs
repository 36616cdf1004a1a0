//! Test helpers for the mesh root.
//!
//! - [`RecordingTransport`] - records every call, fails on demand
//! - [`RecordingApplication`] - records every callback
//! - [`fixtures`] - devices, provisioned nodes and inbound events

pub mod fixtures;

use meshroot_core::{
    ClientSend, ConfigRequest, MeshApplication, MeshTransport, ModelKind, NodeHandle,
    ProvisionedNode, TransportCall, TransportError,
};
use meshroot_types::{
    AddDeviceFlags, Address, AppKeyIndex, BearerSet, InboundContext, KeyMaterial, MessageContext,
    NodeIndex, Opcode, UnprovisionedDevice,
};
use std::collections::{BTreeMap, HashMap, VecDeque};

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// In-memory [`MeshTransport`] that records calls.
///
/// Failures are injected per call name (see [`TransportCall::type_name`]):
/// queued one-shot codes are consumed first, then a sticky code if set.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Vec<TransportCall>,
    failed: Vec<TransportCall>,
    fail_once: HashMap<&'static str, VecDeque<i32>>,
    fail_always: HashMap<&'static str, i32>,
    nodes: BTreeMap<Address, NodeHandle>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call named `call` with `code`.
    pub fn fail_next(&mut self, call: &'static str, code: i32) {
        self.fail_once.entry(call).or_default().push_back(code);
    }

    /// Fail every call named `call` with `code` until cleared.
    pub fn fail_always(&mut self, call: &'static str, code: i32) {
        self.fail_always.insert(call, code);
    }

    pub fn clear_failures(&mut self) {
        self.fail_once.clear();
        self.fail_always.clear();
    }

    /// Calls that succeeded, in order.
    pub fn calls(&self) -> &[TransportCall] {
        &self.calls
    }

    /// Calls that were rejected, in order.
    pub fn failed(&self) -> &[TransportCall] {
        &self.failed
    }

    /// Take and clear the recorded calls.
    pub fn take_calls(&mut self) -> Vec<TransportCall> {
        std::mem::take(&mut self.calls)
    }

    /// Successful calls named `call`.
    pub fn calls_named(&self, call: &str) -> Vec<&TransportCall> {
        self.calls.iter().filter(|c| c.type_name() == call).collect()
    }

    /// Successful client-model sends from `model`.
    pub fn client_sends(&self, model: ModelKind) -> Vec<&ClientSend> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::ClientModelSend(send) if send.model == model => Some(send),
                _ => None,
            })
            .collect()
    }

    /// Make a node known to the transport, as the stack does once it is provisioned.
    pub fn add_node(&mut self, node: &ProvisionedNode) {
        self.nodes.insert(
            node.address,
            NodeHandle {
                node_index: node.node_index,
                address: node.address,
                name: None,
            },
        );
    }

    fn record(&mut self, call: TransportCall) -> Result<(), TransportError> {
        let name = call.type_name();
        let code = self
            .fail_once
            .get_mut(name)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.fail_always.get(name).copied());
        match code {
            Some(code) => {
                self.failed.push(call);
                Err(TransportError::new(name, code))
            }
            None => {
                self.calls.push(call);
                Ok(())
            }
        }
    }
}

impl MeshTransport for RecordingTransport {
    fn set_uuid_match(&mut self, prefix: &[u8]) -> Result<(), TransportError> {
        self.record(TransportCall::SetUuidMatch {
            prefix: prefix.to_vec(),
        })
    }

    fn enable_provisioning(&mut self, bearers: BearerSet) -> Result<(), TransportError> {
        self.record(TransportCall::EnableProvisioning { bearers })
    }

    fn add_local_app_key(&mut self, keys: &KeyMaterial) -> Result<(), TransportError> {
        self.record(TransportCall::AddLocalAppKey { keys: keys.clone() })
    }

    fn bind_local_model(
        &mut self,
        element: Address,
        model: ModelKind,
        app_key_index: AppKeyIndex,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::BindLocalModel {
            element,
            model,
            app_key_index,
        })
    }

    fn add_unprovisioned_device(
        &mut self,
        device: &UnprovisionedDevice,
        flags: AddDeviceFlags,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::AddUnprovisionedDevice {
            device: device.clone(),
            flags,
        })
    }

    fn set_node_name(&mut self, node_index: NodeIndex, name: &str) -> Result<(), TransportError> {
        self.record(TransportCall::SetNodeName {
            node_index,
            name: name.to_string(),
        })?;
        if let Some(node) = self
            .nodes
            .values_mut()
            .find(|n| n.node_index == node_index)
        {
            node.name = Some(name.to_string());
        }
        Ok(())
    }

    fn get_node_by_address(&self, address: Address) -> Option<NodeHandle> {
        self.nodes.get(&address).cloned()
    }

    fn store_node_composition_data(
        &mut self,
        address: Address,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.record(TransportCall::StoreCompositionData {
            address,
            data: data.to_vec(),
        })
    }

    fn config_client_send(
        &mut self,
        context: &MessageContext,
        request: &ConfigRequest,
    ) -> Result<(), TransportError> {
        self.record(TransportCall::ConfigClientSend {
            context: context.clone(),
            request: request.clone(),
        })
    }

    fn client_model_send(&mut self, send: &ClientSend) -> Result<(), TransportError> {
        self.record(TransportCall::ClientModelSend(send.clone()))
    }

    fn server_model_send(
        &mut self,
        model: ModelKind,
        context: &MessageContext,
        opcode: Opcode,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.record(TransportCall::ServerModelSend {
            model,
            context: context.clone(),
            opcode,
            payload: payload.to_vec(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Application
// ═══════════════════════════════════════════════════════════════════════════

/// One application callback, as recorded by [`RecordingApplication`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCall {
    ProvComplete(Address),
    RecvMessage { source: Address, payload: Vec<u8> },
    RecvResponse { source: Address, payload: Vec<u8> },
    Timeout { destination: Address, opcode: Opcode },
    Broadcast { source: Address, payload: Vec<u8> },
    SendFailed { destination: Address, opcode: Opcode },
}

/// [`MeshApplication`] that records callbacks and keeps inbound contexts
/// so tests can reply to them.
#[derive(Debug, Default)]
pub struct RecordingApplication {
    calls: Vec<AppCall>,
    inbox: VecDeque<InboundContext>,
}

impl RecordingApplication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[AppCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<AppCall> {
        std::mem::take(&mut self.calls)
    }

    /// Oldest unanswered inbound message context.
    pub fn take_inbound(&mut self) -> Option<InboundContext> {
        self.inbox.pop_front()
    }

    pub fn count(&self, pred: impl Fn(&AppCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl MeshApplication for RecordingApplication {
    fn on_prov_complete(&mut self, node: &ProvisionedNode) {
        self.calls.push(AppCall::ProvComplete(node.address));
    }

    fn on_recv_message(&mut self, context: InboundContext, payload: &[u8]) {
        self.calls.push(AppCall::RecvMessage {
            source: context.source(),
            payload: payload.to_vec(),
        });
        self.inbox.push_back(context);
    }

    fn on_recv_response(&mut self, context: &MessageContext, payload: &[u8]) {
        self.calls.push(AppCall::RecvResponse {
            source: context.address,
            payload: payload.to_vec(),
        });
    }

    fn on_timeout(&mut self, context: &MessageContext, opcode: Opcode) {
        self.calls.push(AppCall::Timeout {
            destination: context.address,
            opcode,
        });
    }

    fn on_broadcast(&mut self, context: &MessageContext, payload: &[u8]) {
        self.calls.push(AppCall::Broadcast {
            source: context.address,
            payload: payload.to_vec(),
        });
    }

    fn on_send_failed(&mut self, context: &MessageContext, opcode: Opcode, _error: &TransportError) {
        self.calls.push(AppCall::SendFailed {
            destination: context.address,
            opcode,
        });
    }
}
