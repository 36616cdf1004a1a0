//! Combined orchestrator state machine.

use meshroot_core::opcodes::fast_prov;
use meshroot_core::{
    Action, Event, ModelKind, StateMachine, TimerId, TransportCall, VendorModelEvent,
};
use meshroot_messaging::{MessagingConfig, MessagingError, VendorMessaging};
use meshroot_provisioner::{NodeRegistry, ProvisionerConfig, ProvisionerState};
use meshroot_types::{Address, InboundContext};
use std::time::Duration;
use tracing::{debug, info, trace};

/// The mesh root: provisioning authority plus vendor messaging.
///
/// One instance per process. All registry, quota and pending-request state
/// lives here and is only touched through `handle()` and the send methods,
/// so a single dispatch path serializes every mutation.
pub struct MeshOrchestrator {
    provisioner: ProvisionerState,
    messaging: VendorMessaging,
    /// Interval of the stale-request sweep, `None` when disabled.
    sweep_interval: Option<Duration>,
    message_timeout: Duration,
    now: Duration,
}

impl std::fmt::Debug for MeshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshOrchestrator")
            .field("nodes", &self.provisioner.registry().len())
            .field("quota", &self.provisioner.quota().remaining())
            .field("now", &self.now)
            .finish()
    }
}

impl MeshOrchestrator {
    /// Create the orchestrator.
    pub fn new(config: ProvisionerConfig) -> Self {
        let messaging = VendorMessaging::new(MessagingConfig::from(&config));
        let sweep_interval = config.request_sweep_interval;
        let message_timeout = config.message_timeout;
        Self {
            provisioner: ProvisionerState::new(config),
            messaging,
            sweep_interval,
            message_timeout,
            now: Duration::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn provisioner(&self) -> &ProvisionerState {
        &self.provisioner
    }

    pub fn registry(&self) -> &NodeRegistry {
        self.provisioner.registry()
    }

    pub fn messaging(&self) -> &VendorMessaging {
        &self.messaging
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Startup
    // ═══════════════════════════════════════════════════════════════════════

    /// Actions that bring the provisioner online and arm the sweep timer.
    pub fn start(&mut self) -> Vec<Action> {
        let mut actions = self.provisioner.start();
        if let Some(interval) = self.sweep_interval {
            actions.push(Action::SetTimer {
                id: TimerId::RequestSweep,
                duration: interval,
            });
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Application operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Send a directed message to a registered node.
    pub fn send_message(
        &mut self,
        destination: Address,
        payload: &[u8],
    ) -> Result<Vec<Action>, MessagingError> {
        self.messaging
            .send_message(destination, payload, self.provisioner.registry())
    }

    /// Send an unacknowledged message to all nodes.
    pub fn send_broadcast(&self, payload: &[u8]) -> Result<Vec<Action>, MessagingError> {
        self.messaging.send_broadcast(payload)
    }

    /// Reply to an inbound message.
    pub fn send_response(
        &self,
        inbound: InboundContext,
        payload: &[u8],
    ) -> Result<Vec<Action>, MessagingError> {
        self.messaging.send_response(inbound, payload)
    }

    /// Log one line per known node, in registration order.
    pub fn log_network_info(&self) {
        let registry = self.provisioner.registry();
        info!(
            nodes = registry.len(),
            quota = self.provisioner.quota().remaining(),
            "Network info"
        );
        for node in registry.iter() {
            info!(
                name = node.name.as_deref().unwrap_or("-"),
                addr = %node.address,
                uuid = %node.uuid,
                elements = node.element_count,
                state = %node.state(),
                attempts = node.attempts,
                "Node"
            );
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Internal handlers
    // ═══════════════════════════════════════════════════════════════════════

    fn on_vendor_event(&mut self, event: VendorModelEvent) -> Vec<Action> {
        match event {
            VendorModelEvent::Operation {
                opcode,
                context,
                payload,
            } if fast_prov::is_status(opcode) => {
                self.provisioner
                    .on_fast_prov_status(context.address, opcode, &payload);
                vec![]
            }
            other => self.messaging.on_vendor_event(other),
        }
    }

    fn on_call_failed(
        &mut self,
        call: TransportCall,
        error: meshroot_core::TransportError,
    ) -> Vec<Action> {
        match &call {
            TransportCall::ClientModelSend(send) if send.model == ModelKind::VendorClient => {
                self.messaging.on_call_failed(&call);
                vec![]
            }
            TransportCall::ServerModelSend { .. } => {
                self.messaging.on_call_failed(&call);
                vec![]
            }
            _ => self.provisioner.on_call_failed(&call, &error),
        }
    }

    fn on_timer(&mut self, id: TimerId) -> Vec<Action> {
        match id {
            TimerId::RequestSweep => {
                let Some(interval) = self.sweep_interval else {
                    return vec![];
                };
                let max_age = self.message_timeout + interval;
                let mut actions = self.provisioner.on_sweep(max_age);
                actions.extend(self.messaging.on_sweep(max_age));
                debug!(expired = actions.len(), "Request sweep");
                actions.push(Action::SetTimer {
                    id: TimerId::RequestSweep,
                    duration: interval,
                });
                actions
            }
        }
    }
}

impl StateMachine for MeshOrchestrator {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        trace!(event = event.type_name(), "Handling event");
        match event {
            Event::UnprovisionedDeviceSeen(device) => self.provisioner.on_device_seen(device),

            Event::ProvisioningComplete(node) => self.provisioner.on_provisioning_complete(node),

            Event::LocalAppKeyAdded {
                app_key_index,
                result,
            } => {
                if result.is_ok() {
                    self.messaging.set_app_key_index(app_key_index);
                }
                self.provisioner
                    .on_local_app_key_added(app_key_index, result)
            }

            Event::ConfigClient(event) => self.provisioner.on_config_event(event),

            Event::VendorModel(event) => self.on_vendor_event(event),

            Event::TransportCallFailed { call, error } => self.on_call_failed(call, error),

            Event::Timer(id) => self.on_timer(id),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.provisioner.set_time(now);
        self.messaging.set_time(now);
    }

    fn now(&self) -> Duration {
        self.now
    }
}
