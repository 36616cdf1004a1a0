//! Executes orchestrator actions against a transport and an application.

use crate::MeshOrchestrator;
use meshroot_core::{
    execute, Action, Event, MeshApplication, MeshTransport, Notification, StateMachine, TimerId,
    TransportError,
};
use meshroot_messaging::MessagingError;
use meshroot_types::{Address, InboundContext};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Drives a [`MeshOrchestrator`].
///
/// Actions run in the order the orchestrator returned them. A transport call
/// that fails synchronously is fed straight back as
/// `Event::TransportCallFailed` and its follow-up actions run before the
/// remaining ones. Timer requests are collected for the host to schedule.
pub struct Dispatcher<T, A> {
    orchestrator: MeshOrchestrator,
    transport: T,
    application: A,
    timers: BTreeMap<TimerId, Duration>,
}

impl<T: MeshTransport, A: MeshApplication> Dispatcher<T, A> {
    pub fn new(orchestrator: MeshOrchestrator, transport: T, application: A) -> Self {
        Self {
            orchestrator,
            transport,
            application,
            timers: BTreeMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn orchestrator(&self) -> &MeshOrchestrator {
        &self.orchestrator
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn application(&self) -> &A {
        &self.application
    }

    pub fn application_mut(&mut self) -> &mut A {
        &mut self.application
    }

    /// Timers requested since the last call, at most one per id.
    pub fn drain_timers(&mut self) -> Vec<(TimerId, Duration)> {
        std::mem::take(&mut self.timers).into_iter().collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Driving
    // ═══════════════════════════════════════════════════════════════════════

    /// Bring the provisioner online.
    pub fn start(&mut self) -> Result<(), TransportError> {
        let actions = self.orchestrator.start();
        self.run(actions)
    }

    pub fn set_time(&mut self, now: Duration) {
        self.orchestrator.set_time(now);
    }

    /// Process one inbound event to completion.
    pub fn dispatch(&mut self, event: Event) {
        let actions = self.orchestrator.handle(event);
        // Failures were already fed back to the orchestrator.
        let _ = self.run(actions);
    }

    /// Send a directed message to a registered node.
    pub fn send_message(
        &mut self,
        destination: Address,
        payload: &[u8],
    ) -> Result<(), MessagingError> {
        let actions = self.orchestrator.send_message(destination, payload)?;
        Ok(self.run(actions)?)
    }

    /// Send an unacknowledged message to every node.
    pub fn send_broadcast(&mut self, payload: &[u8]) -> Result<(), MessagingError> {
        let actions = self.orchestrator.send_broadcast(payload)?;
        Ok(self.run(actions)?)
    }

    /// Reply to an inbound message.
    pub fn send_response(
        &mut self,
        inbound: InboundContext,
        payload: &[u8],
    ) -> Result<(), MessagingError> {
        let actions = self.orchestrator.send_response(inbound, payload)?;
        Ok(self.run(actions)?)
    }

    /// Log the node table and cross-check it against the transport's records.
    pub fn log_network_info(&self) {
        self.orchestrator.log_network_info();
        for node in self.orchestrator.registry().iter() {
            match self.transport.get_node_by_address(node.address) {
                None => warn!(addr = %node.address, "Node unknown to transport"),
                Some(handle) if handle.name.as_deref() != node.name.as_deref() => warn!(
                    addr = %node.address,
                    ours = ?node.name,
                    transport = ?handle.name,
                    "Node name mismatch"
                ),
                Some(_) => {}
            }
        }
    }

    /// Execute `actions` in order; returns the first transport failure.
    fn run(&mut self, actions: Vec<Action>) -> Result<(), TransportError> {
        let mut first_error = None;
        for action in actions {
            match action {
                Action::Transport(call) => {
                    if let Err(error) = execute(&mut self.transport, &call) {
                        debug!(call = call.type_name(), code = error.code, "Transport call failed");
                        let follow_up = self.orchestrator.handle(Event::TransportCallFailed {
                            call,
                            error: error.clone(),
                        });
                        let _ = self.run(follow_up);
                        first_error.get_or_insert(error);
                    }
                }
                Action::Notify(notification) => self.notify(notification),
                Action::SetTimer { id, duration } => {
                    self.timers.insert(id, duration);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::ProvComplete(node) => self.application.on_prov_complete(&node),
            Notification::MessageReceived { context, payload } => self
                .application
                .on_recv_message(InboundContext::new(context), &payload),
            Notification::ResponseReceived { context, payload } => {
                self.application.on_recv_response(&context, &payload)
            }
            Notification::Timeout { context, opcode } => {
                self.application.on_timeout(&context, opcode)
            }
            Notification::BroadcastReceived { context, payload } => {
                self.application.on_broadcast(&context, &payload)
            }
            Notification::SendFailed {
                context,
                opcode,
                error,
            } => self.application.on_send_failed(&context, opcode, &error),
        }
    }
}

impl<T, A> std::fmt::Debug for Dispatcher<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("orchestrator", &self.orchestrator)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}
