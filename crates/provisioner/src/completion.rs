//! Provisioning completion: naming, registration, AppKey distribution.
//!
//! Every config-client outcome for a node goes through [`transition`], a
//! plain `(state, input, retry_count) -> (next state, effect)` table. The
//! coordinator applies the effect; it never branches on node state itself.
//!
//! ```text
//! provisioning complete
//!     │  name, register
//!     ▼
//! Registered ──(composition status | composition unavailable)──┐
//!     │ (no composition fetch)                                  │
//!     ▼                                                         ▼
//! AppKeyRequested ◄─────────────────────────────────────────────┘
//!     │  timeout, retry_count < 1  → resend, stay
//!     │  timeout, retry_count = 1  → Stuck
//!     │  status fail / send fail   → Stuck
//!     ▼  status ok
//! AppKeyBound ──(fast-prov info set)──► FastProvSent
//! ```

use crate::{FastProvPropagator, NodeRegistry, ProvisionerError};
use meshroot_core::opcodes::config;
use meshroot_core::{
    Action, ConfigClientEvent, ConfigEventKind, ConfigRequest, ModelKind, PendingRequests,
    ProvisionedNode, TransportCall,
};
use meshroot_types::{
    Address, AppKeyIndex, KeyMaterial, MessageContext, NodeRecord, NodeState, Opcode,
};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Automatic AppKey-Add resends after a timeout.
pub const MAX_APP_KEY_RETRIES: u8 = 1;

/// Config-client outcome fed into the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingInput {
    /// Composition data page arrived.
    CompositionReceived,
    /// Composition fetch timed out or failed.
    CompositionUnavailable,
    /// AppKey Status arrived.
    AppKeyStatus { success: bool },
    /// No AppKey Status within the timeout.
    AppKeyTimeout,
    /// The AppKey-Add could not be sent.
    AppKeyFailed,
}

impl OnboardingInput {
    /// Opcode of the request this input answers.
    pub fn request_opcode(self) -> Opcode {
        match self {
            OnboardingInput::CompositionReceived | OnboardingInput::CompositionUnavailable => {
                config::COMPOSITION_DATA_GET
            }
            _ => config::APP_KEY_ADD,
        }
    }
}

/// What the coordinator does after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SendAppKey,
    ResendAppKey,
    HandOffFastProv,
    Abandon,
    Ignore,
}

/// One row of the onboarding transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// `None` keeps the current state.
    pub next: Option<NodeState>,
    pub effect: Effect,
}

/// The onboarding transition table.
pub fn transition(state: NodeState, input: OnboardingInput, retry_count: u8) -> Transition {
    use NodeState::*;
    use OnboardingInput::*;

    let (next, effect) = match (state, input) {
        (Registered, CompositionReceived | CompositionUnavailable) => {
            (Some(AppKeyRequested), Effect::SendAppKey)
        }
        (AppKeyRequested, AppKeyStatus { success: true }) => {
            (Some(AppKeyBound), Effect::HandOffFastProv)
        }
        (AppKeyRequested, AppKeyTimeout) if retry_count < MAX_APP_KEY_RETRIES => {
            (None, Effect::ResendAppKey)
        }
        (AppKeyRequested, AppKeyTimeout | AppKeyFailed | AppKeyStatus { success: false }) => {
            (Some(Stuck), Effect::Abandon)
        }
        _ => (None, Effect::Ignore),
    };
    Transition { next, effect }
}

/// Drives each provisioned node from registration to fast-prov handoff.
#[derive(Debug)]
pub struct CompletionCoordinator {
    keys: KeyMaterial,
    send_ttl: u8,
    fetch_composition: bool,
    /// In-flight config requests (AppKey-Add, Composition Data Get).
    pending: PendingRequests,
    now: Duration,
}

impl CompletionCoordinator {
    pub fn new(keys: KeyMaterial, send_ttl: u8, fetch_composition: bool) -> Self {
        Self {
            keys,
            send_ttl,
            fetch_composition,
            pending: PendingRequests::new(),
            now: Duration::ZERO,
        }
    }

    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    /// Key material distributed to nodes.
    pub fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    /// Config requests in flight.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Record the app key index the local stack actually installed.
    pub fn set_app_key_index(&mut self, app_key_index: AppKeyIndex) {
        self.keys.app_key_index = app_key_index;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event handlers
    // ═══════════════════════════════════════════════════════════════════════

    /// Name and register a freshly provisioned node, then start key distribution.
    pub fn on_provisioning_complete(
        &mut self,
        node: &ProvisionedNode,
        registry: &mut NodeRegistry,
    ) -> Result<Vec<Action>, ProvisionerError> {
        let registration = registry.register(node, self.keys.app_key_index)?;

        // Leftovers from an earlier attempt at this address
        self.pending.remove(node.address, config::APP_KEY_ADD);
        self.pending.remove(node.address, config::COMPOSITION_DATA_GET);

        let record = registry
            .get_mut(node.address)
            .ok_or(ProvisionerError::NodeNotFound(node.address))?;

        let name = node.node_index.node_name();
        record.name = Some(name.clone());
        record.advance(NodeState::Named)?;
        let mut actions = vec![Action::Transport(TransportCall::SetNodeName {
            node_index: node.node_index,
            name,
        })];

        record.advance(NodeState::Registered)?;
        info!(
            index = %node.node_index,
            uuid = %node.uuid,
            addr = %node.address,
            elements = node.element_count,
            net_idx = %node.net_key_index,
            reprovisioned = registration.reprovisioned,
            "Node registered"
        );

        if self.fetch_composition {
            if self
                .pending
                .insert(node.address, config::COMPOSITION_DATA_GET, self.now)
            {
                actions.push(self.config_send(record, ConfigRequest::CompositionDataGet { page: 0 }));
            }
        } else {
            record.advance(NodeState::AppKeyRequested)?;
            actions.extend(self.issue_app_key(record));
        }

        Ok(actions)
    }

    /// Handle a configuration-client callback.
    pub fn on_config_event(
        &mut self,
        event: ConfigClientEvent,
        registry: &mut NodeRegistry,
        fast_prov: &FastProvPropagator,
    ) -> Result<Vec<Action>, ProvisionerError> {
        let ConfigClientEvent {
            kind,
            opcode,
            destination,
            result,
        } = event;

        if kind == ConfigEventKind::Publish {
            if let Ok(status) = &result {
                if let Some(data) = &status.composition_data {
                    debug!(addr = %destination, data = %hex::encode(data), "Published composition data");
                }
            }
            return Ok(vec![]);
        }

        match opcode {
            config::APP_KEY_ADD => {
                let input = match (kind, &result) {
                    (ConfigEventKind::Timeout, _) => OnboardingInput::AppKeyTimeout,
                    (_, Ok(status)) => OnboardingInput::AppKeyStatus {
                        success: status.is_success(),
                    },
                    (_, Err(err)) => {
                        error!(addr = %destination, error = %err, "AppKey-Add failed");
                        OnboardingInput::AppKeyFailed
                    }
                };
                self.apply(destination, input, None, registry, fast_prov)
            }
            config::COMPOSITION_DATA_GET => {
                let (input, data) = match (kind, result) {
                    (ConfigEventKind::Timeout, _) => (OnboardingInput::CompositionUnavailable, None),
                    (_, Ok(status)) => match status.composition_data {
                        Some(data) => (OnboardingInput::CompositionReceived, Some(data)),
                        None => (OnboardingInput::CompositionUnavailable, None),
                    },
                    (_, Err(err)) => {
                        warn!(addr = %destination, error = %err, "Composition Data Get failed");
                        (OnboardingInput::CompositionUnavailable, None)
                    }
                };
                self.apply(destination, input, data, registry, fast_prov)
            }
            _ => {
                warn!(addr = %destination, %opcode, ?kind, "Unexpected config client event");
                Ok(vec![])
            }
        }
    }

    /// Handle a transport call that failed synchronously.
    pub fn on_call_failed(
        &mut self,
        call: &TransportCall,
        registry: &mut NodeRegistry,
        fast_prov: &FastProvPropagator,
    ) -> Result<Vec<Action>, ProvisionerError> {
        match call {
            TransportCall::SetNodeName { node_index, name } => {
                warn!(index = %node_index, name = %name, "Failed to set node name");
                if let Some(node) = registry.get_by_node_index_mut(*node_index) {
                    node.name = None;
                }
                Ok(vec![])
            }
            TransportCall::ConfigClientSend { context, request } => {
                let input = match request {
                    ConfigRequest::AppKeyAdd { .. } => OnboardingInput::AppKeyFailed,
                    ConfigRequest::CompositionDataGet { .. } => {
                        OnboardingInput::CompositionUnavailable
                    }
                };
                self.apply(context.address, input, None, registry, fast_prov)
            }
            TransportCall::StoreCompositionData { address, .. } => {
                warn!(addr = %address, "Failed to store composition data");
                Ok(vec![])
            }
            TransportCall::ClientModelSend(send) if send.model == ModelKind::FastProvClient => {
                error!(addr = %send.context.address, "Failed to send fast-prov info");
                Ok(vec![])
            }
            _ => Ok(vec![]),
        }
    }

    /// Treat config requests pending longer than `max_age` as timed out.
    ///
    /// Covers timeout callbacks the transport never delivered.
    pub fn on_sweep(
        &mut self,
        max_age: Duration,
        registry: &mut NodeRegistry,
        fast_prov: &FastProvPropagator,
    ) -> Vec<Action> {
        let mut actions = vec![];
        for request in self.pending.expired(self.now, max_age) {
            let input = if request.opcode == config::APP_KEY_ADD {
                OnboardingInput::AppKeyTimeout
            } else {
                OnboardingInput::CompositionUnavailable
            };
            warn!(
                addr = %request.destination,
                opcode = %request.opcode,
                age = ?self.now.saturating_sub(request.issued_at),
                "Config request stale, treating as timed out"
            );
            match self.apply(request.destination, input, None, registry, fast_prov) {
                Ok(more) => actions.extend(more),
                Err(e) => warn!(addr = %request.destination, error = %e, "Sweep failed"),
            }
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════════════════

    fn apply(
        &mut self,
        address: Address,
        input: OnboardingInput,
        composition: Option<Vec<u8>>,
        registry: &mut NodeRegistry,
        fast_prov: &FastProvPropagator,
    ) -> Result<Vec<Action>, ProvisionerError> {
        let opcode = input.request_opcode();
        let Some(request) = self.pending.get(address, opcode).copied() else {
            debug!(addr = %address, ?input, "No request in flight, ignoring");
            return Ok(vec![]);
        };

        let Some(node) = registry.get_mut(address) else {
            self.pending.remove(address, opcode);
            return Err(ProvisionerError::NodeNotFound(address));
        };

        let from = node.state();
        let step = transition(from, input, request.retry_count);
        if let Some(next) = step.next {
            node.advance(next)?;
            debug!(addr = %address, %from, to = %next, ?input, "Node state transition");
        }

        match step.effect {
            Effect::SendAppKey => {
                self.pending.remove(address, opcode);
                let mut actions = vec![];
                if let Some(data) = composition {
                    actions.push(Action::Transport(TransportCall::StoreCompositionData {
                        address,
                        data,
                    }));
                }
                actions.extend(self.issue_app_key(node));
                Ok(actions)
            }
            Effect::ResendAppKey => {
                let retry = self.pending.record_retry(address, opcode, self.now);
                warn!(addr = %address, ?retry, "AppKey-Add timed out, resending");
                Ok(vec![self.config_send(node, ConfigRequest::app_key_add(&self.keys))])
            }
            Effect::HandOffFastProv => {
                self.pending.remove(address, opcode);
                let actions = fast_prov.hand_off(node)?;
                node.advance(NodeState::FastProvSent)?;
                Ok(actions)
            }
            Effect::Abandon => {
                self.pending.remove(address, opcode);
                error!(
                    addr = %address,
                    name = ?node.name,
                    retries = request.retry_count,
                    ?input,
                    "Node stuck, AppKey-Add abandoned"
                );
                Ok(vec![])
            }
            Effect::Ignore => {
                debug!(addr = %address, state = %from, ?input, "Input has no effect in this state");
                Ok(vec![])
            }
        }
    }

    /// Record and emit an AppKey-Add. At most one per node is in flight.
    fn issue_app_key(&mut self, node: &NodeRecord) -> Option<Action> {
        if !self.pending.insert(node.address, config::APP_KEY_ADD, self.now) {
            debug!(addr = %node.address, "AppKey-Add already in flight");
            return None;
        }
        Some(self.config_send(node, ConfigRequest::app_key_add(&self.keys)))
    }

    fn config_send(&self, node: &NodeRecord, request: ConfigRequest) -> Action {
        Action::Transport(TransportCall::ConfigClientSend {
            context: MessageContext::outbound(
                node.net_key_index,
                node.app_key_index,
                node.address,
                self.send_ttl,
            ),
            request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshroot_core::{ConfigStatus, TransportError};
    use meshroot_types::{DeviceUuid, FastProvAllocation, MessageRole, NetKeyIndex, NodeIndex};
    use tracing_test::traced_test;

    const NODE: Address = Address(0x0002);

    fn keys() -> KeyMaterial {
        KeyMaterial::new(NetKeyIndex::PRIMARY, AppKeyIndex(0), [0x12; 16])
    }

    fn propagator() -> FastProvPropagator {
        FastProvPropagator::new(
            FastProvAllocation {
                addr_range_count: 100,
                unicast_min: Address(0x0100),
                unicast_max: Address(0x7FFF),
                group_address: Address(0xC000),
                match_filter: vec![0xDD, 0xDD],
                ..Default::default()
            },
            7,
            MessageRole::Provisioner,
        )
    }

    fn provisioned() -> ProvisionedNode {
        ProvisionedNode {
            node_index: NodeIndex(1),
            uuid: DeviceUuid([0xAA; 16]),
            address: NODE,
            element_count: 1,
            net_key_index: NetKeyIndex::PRIMARY,
        }
    }

    fn app_key_event(kind: ConfigEventKind, result: Result<ConfigStatus, TransportError>) -> ConfigClientEvent {
        ConfigClientEvent {
            kind,
            opcode: config::APP_KEY_ADD,
            destination: NODE,
            result,
        }
    }

    fn timeout() -> ConfigClientEvent {
        app_key_event(ConfigEventKind::Timeout, Ok(ConfigStatus::success()))
    }

    fn app_key_adds(actions: &[Action]) -> Vec<&TransportCall> {
        actions
            .iter()
            .filter_map(Action::as_transport)
            .filter(|call| {
                matches!(
                    call,
                    TransportCall::ConfigClientSend {
                        request: ConfigRequest::AppKeyAdd { .. },
                        ..
                    }
                )
            })
            .collect()
    }

    fn setup(fetch_composition: bool) -> (CompletionCoordinator, NodeRegistry, Vec<Action>) {
        let mut coordinator = CompletionCoordinator::new(keys(), 7, fetch_composition);
        let mut registry = NodeRegistry::new();
        let actions = coordinator
            .on_provisioning_complete(&provisioned(), &mut registry)
            .unwrap();
        (coordinator, registry, actions)
    }

    #[test]
    fn test_transition_table() {
        use NodeState::*;
        use OnboardingInput::*;

        let t = transition(AppKeyRequested, AppKeyTimeout, 0);
        assert_eq!((t.next, t.effect), (None, Effect::ResendAppKey));

        let t = transition(AppKeyRequested, AppKeyTimeout, 1);
        assert_eq!((t.next, t.effect), (Some(Stuck), Effect::Abandon));

        let t = transition(AppKeyRequested, AppKeyStatus { success: true }, 1);
        assert_eq!((t.next, t.effect), (Some(AppKeyBound), Effect::HandOffFastProv));

        let t = transition(Registered, CompositionUnavailable, 0);
        assert_eq!((t.next, t.effect), (Some(AppKeyRequested), Effect::SendAppKey));

        // Late inputs after onboarding moved on
        for state in [AppKeyBound, FastProvSent, Ready, Stuck] {
            let t = transition(state, AppKeyTimeout, 0);
            assert_eq!((t.next, t.effect), (None, Effect::Ignore));
        }
    }

    #[test]
    fn test_registration_names_node_and_requests_app_key() {
        let (coordinator, registry, actions) = setup(false);

        assert_eq!(
            actions[0],
            Action::Transport(TransportCall::SetNodeName {
                node_index: NodeIndex(1),
                name: "NODE-01".to_string(),
            })
        );

        let adds = app_key_adds(&actions);
        assert_eq!(adds.len(), 1);
        match adds[0] {
            TransportCall::ConfigClientSend { context, request } => {
                assert_eq!(context.address, NODE);
                assert_eq!(request, &ConfigRequest::app_key_add(&keys()));
            }
            _ => unreachable!(),
        }

        let node = registry.get(NODE).unwrap();
        assert_eq!(node.name.as_deref(), Some("NODE-01"));
        assert_eq!(node.state(), NodeState::AppKeyRequested);
        assert!(coordinator.pending().contains(NODE, config::APP_KEY_ADD));
    }

    #[traced_test]
    #[test]
    fn test_one_retry_then_stuck() {
        let (mut coordinator, mut registry, first) = setup(false);
        let fp = propagator();

        let actions = coordinator
            .on_config_event(timeout(), &mut registry, &fp)
            .unwrap();
        assert_eq!(app_key_adds(&actions), app_key_adds(&first));
        assert_eq!(coordinator.pending().get(NODE, config::APP_KEY_ADD).unwrap().retry_count, 1);

        let actions = coordinator
            .on_config_event(timeout(), &mut registry, &fp)
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(registry.get(NODE).unwrap().state(), NodeState::Stuck);
        assert!(coordinator.pending().is_empty());
        assert!(logs_contain("Node stuck"));

        // No request in flight anymore: further timeouts are ignored
        let actions = coordinator
            .on_config_event(timeout(), &mut registry, &fp)
            .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_success_hands_off_fast_prov() {
        let (mut coordinator, mut registry, _) = setup(false);

        let actions = coordinator
            .on_config_event(
                app_key_event(ConfigEventKind::Set, Ok(ConfigStatus::success())),
                &mut registry,
                &propagator(),
            )
            .unwrap();

        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions[0].as_transport(),
            Some(TransportCall::ClientModelSend(send)) if send.model == ModelKind::FastProvClient
        ));
        let node = registry.get(NODE).unwrap();
        assert_eq!(node.state(), NodeState::FastProvSent);
        assert_eq!(node.fast_prov.unicast_min, Address(0x0100));
        assert!(coordinator.pending().is_empty());
    }

    #[test]
    fn test_rejected_app_key_is_stuck() {
        let (mut coordinator, mut registry, _) = setup(false);

        coordinator
            .on_config_event(
                app_key_event(
                    ConfigEventKind::Set,
                    Ok(ConfigStatus {
                        status: 0x04,
                        composition_data: None,
                    }),
                ),
                &mut registry,
                &propagator(),
            )
            .unwrap();
        assert_eq!(registry.get(NODE).unwrap().state(), NodeState::Stuck);
    }

    #[test]
    fn test_failed_send_is_stuck() {
        let (mut coordinator, mut registry, actions) = setup(false);
        let call = app_key_adds(&actions)[0].clone();

        coordinator
            .on_call_failed(&call, &mut registry, &propagator())
            .unwrap();
        assert_eq!(registry.get(NODE).unwrap().state(), NodeState::Stuck);
    }

    #[test]
    fn test_failed_naming_is_not_fatal() {
        let (mut coordinator, mut registry, actions) = setup(false);
        let call = actions[0].as_transport().unwrap().clone();

        let more = coordinator
            .on_call_failed(&call, &mut registry, &propagator())
            .unwrap();
        assert!(more.is_empty());

        let node = registry.get(NODE).unwrap();
        assert_eq!(node.name, None);
        assert_eq!(node.state(), NodeState::AppKeyRequested);
    }

    #[test]
    fn test_composition_then_app_key() {
        let (mut coordinator, mut registry, actions) = setup(true);
        assert!(app_key_adds(&actions).is_empty());
        assert_eq!(registry.get(NODE).unwrap().state(), NodeState::Registered);

        let actions = coordinator
            .on_config_event(
                ConfigClientEvent {
                    kind: ConfigEventKind::Get,
                    opcode: config::COMPOSITION_DATA_GET,
                    destination: NODE,
                    result: Ok(ConfigStatus {
                        status: 0,
                        composition_data: Some(vec![0xE5, 0x02, 0x00, 0x00]),
                    }),
                },
                &mut registry,
                &propagator(),
            )
            .unwrap();

        assert_eq!(
            actions[0],
            Action::Transport(TransportCall::StoreCompositionData {
                address: NODE,
                data: vec![0xE5, 0x02, 0x00, 0x00],
            })
        );
        assert_eq!(app_key_adds(&actions).len(), 1);
        assert_eq!(registry.get(NODE).unwrap().state(), NodeState::AppKeyRequested);
        assert!(!coordinator.pending().contains(NODE, config::COMPOSITION_DATA_GET));
    }

    #[test]
    fn test_sweep_counts_as_timeout() {
        let (mut coordinator, mut registry, _) = setup(false);
        let fp = propagator();

        coordinator.set_time(Duration::from_secs(5));
        assert!(coordinator
            .on_sweep(Duration::from_secs(10), &mut registry, &fp)
            .is_empty());

        coordinator.set_time(Duration::from_secs(15));
        let actions = coordinator.on_sweep(Duration::from_secs(10), &mut registry, &fp);
        assert_eq!(app_key_adds(&actions).len(), 1);

        coordinator.set_time(Duration::from_secs(30));
        coordinator.on_sweep(Duration::from_secs(10), &mut registry, &fp);
        assert_eq!(registry.get(NODE).unwrap().state(), NodeState::Stuck);
    }

    #[test]
    fn test_reprovisioning_restarts_onboarding() {
        let (mut coordinator, mut registry, _) = setup(false);
        let fp = propagator();
        coordinator.on_config_event(timeout(), &mut registry, &fp).unwrap();
        coordinator.on_config_event(timeout(), &mut registry, &fp).unwrap();
        assert_eq!(registry.get(NODE).unwrap().state(), NodeState::Stuck);

        let actions = coordinator
            .on_provisioning_complete(&provisioned(), &mut registry)
            .unwrap();
        assert_eq!(app_key_adds(&actions).len(), 1);

        let node = registry.get(NODE).unwrap();
        assert!(node.reprovisioned);
        assert_eq!(node.attempts, 2);
        assert_eq!(node.state(), NodeState::AppKeyRequested);
        assert_eq!(
            coordinator.pending().get(NODE, config::APP_KEY_ADD).unwrap().retry_count,
            0
        );
    }
}
