//! Vendor messaging sub-state machine.

use crate::MessagingError;
use meshroot_core::opcodes::{vendor, MAX_VENDOR_PAYLOAD};
use meshroot_core::{
    Action, ClientSend, ModelKind, Notification, PendingRequests, TransportCall, VendorModelEvent,
};
use meshroot_provisioner::{NodeRegistry, ProvisionerConfig};
use meshroot_types::{
    Address, AppKeyIndex, InboundContext, MessageContext, MessageRole, NetKeyIndex, Opcode,
};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Addressing and timing used for every outbound application message.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub net_key_index: NetKeyIndex,
    pub app_key_index: AppKeyIndex,
    pub send_ttl: u8,
    pub role: MessageRole,
    /// How long a directed message waits for its response.
    pub message_timeout: Duration,
}

impl From<&ProvisionerConfig> for MessagingConfig {
    fn from(config: &ProvisionerConfig) -> Self {
        Self {
            net_key_index: config.net_key_index,
            app_key_index: config.app_key_index,
            send_ttl: config.send_ttl,
            role: config.role,
            message_timeout: config.message_timeout,
        }
    }
}

/// Multiplexes the directed, broadcast and response channels.
///
/// Each directed message is tracked as a pending request keyed by
/// `(destination, MESSAGE)` until exactly one of: a response arrives, the
/// transport reports a timeout, the send fails, or the sweep expires it.
/// There is no resend at this layer.
#[derive(Debug)]
pub struct VendorMessaging {
    config: MessagingConfig,
    pending: PendingRequests,
    now: Duration,
}

impl VendorMessaging {
    pub fn new(config: MessagingConfig) -> Self {
        Self {
            config,
            pending: PendingRequests::new(),
            now: Duration::ZERO,
        }
    }

    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    /// Directed messages awaiting a response.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Adopt the app key index the local stack installed.
    pub fn set_app_key_index(&mut self, app_key_index: AppKeyIndex) {
        self.config.app_key_index = app_key_index;
    }

    fn outbound(&self, address: Address) -> MessageContext {
        MessageContext::outbound(
            self.config.net_key_index,
            self.config.app_key_index,
            address,
            self.config.send_ttl,
        )
    }

    fn check_payload(payload: &[u8]) -> Result<(), MessagingError> {
        if payload.len() > MAX_VENDOR_PAYLOAD {
            return Err(MessagingError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_VENDOR_PAYLOAD,
            });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Application operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Send a directed message to a registered node.
    ///
    /// Fails without emitting anything if the destination is not
    /// registered or already has a message in flight.
    pub fn send_message(
        &mut self,
        destination: Address,
        payload: &[u8],
        registry: &NodeRegistry,
    ) -> Result<Vec<Action>, MessagingError> {
        Self::check_payload(payload)?;

        if !registry.is_registered(destination) {
            error!(addr = %destination, "Node not in network");
            return Err(MessagingError::NodeNotFound(destination));
        }

        if !self.pending.insert(destination, vendor::MESSAGE, self.now) {
            return Err(MessagingError::RequestInFlight {
                destination,
                opcode: vendor::MESSAGE,
            });
        }

        debug!(addr = %destination, len = payload.len(), "Sending message");
        Ok(vec![Action::Transport(TransportCall::ClientModelSend(
            ClientSend {
                model: ModelKind::VendorClient,
                context: self.outbound(destination),
                opcode: vendor::MESSAGE,
                payload: payload.to_vec(),
                timeout: self.config.message_timeout,
                ack: true,
                role: self.config.role,
            },
        ))])
    }

    /// Send an unacknowledged message to every node.
    pub fn send_broadcast(&self, payload: &[u8]) -> Result<Vec<Action>, MessagingError> {
        Self::check_payload(payload)?;

        debug!(len = payload.len(), "Sending broadcast");
        Ok(vec![Action::Transport(TransportCall::ClientModelSend(
            ClientSend {
                model: ModelKind::VendorClient,
                context: self.outbound(Address::ALL_NODES),
                opcode: vendor::BROADCAST,
                payload: payload.to_vec(),
                timeout: Duration::ZERO,
                ack: false,
                role: self.config.role,
            },
        ))])
    }

    /// Reply to an inbound message on the context it arrived with.
    ///
    /// Consumes the context: one reply per inbound message.
    pub fn send_response(
        &self,
        inbound: InboundContext,
        payload: &[u8],
    ) -> Result<Vec<Action>, MessagingError> {
        Self::check_payload(payload)?;

        let context = inbound.into_context();
        debug!(addr = %context.address, len = payload.len(), "Sending response");
        Ok(vec![Action::Transport(TransportCall::ServerModelSend {
            model: ModelKind::VendorServer,
            context,
            opcode: vendor::RESPONSE,
            payload: payload.to_vec(),
        })])
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event handlers
    // ═══════════════════════════════════════════════════════════════════════

    /// Handle a vendor-model callback (fast-prov statuses are routed elsewhere).
    pub fn on_vendor_event(&mut self, event: VendorModelEvent) -> Vec<Action> {
        match event {
            VendorModelEvent::Operation {
                opcode,
                context,
                payload,
            } => self.on_operation(opcode, context, payload),

            VendorModelEvent::SendComplete {
                opcode,
                context,
                result: Ok(()),
            } => {
                debug!(%opcode, addr = %context.address, "Send completed");
                vec![]
            }

            VendorModelEvent::SendComplete {
                opcode,
                context,
                result: Err(error),
            } => {
                error!(%opcode, addr = %context.address, error = %error, "Failed to send message");
                if opcode == vendor::MESSAGE
                    && self.pending.remove(context.address, opcode).is_some()
                {
                    return vec![Action::Notify(Notification::SendFailed {
                        context,
                        opcode,
                        error,
                    })];
                }
                vec![]
            }

            VendorModelEvent::PublishReceived {
                opcode, context, ..
            } => {
                debug!(%opcode, addr = %context.address, "Publish received");
                vec![]
            }

            VendorModelEvent::SendTimeout { opcode, context } => {
                if self.pending.remove(context.address, opcode).is_none() {
                    debug!(%opcode, addr = %context.address, "Timeout for released request");
                    return vec![];
                }
                warn!(%opcode, addr = %context.address, "Message timed out");
                vec![Action::Notify(Notification::Timeout { context, opcode })]
            }
        }
    }

    fn on_operation(
        &mut self,
        opcode: Opcode,
        context: MessageContext,
        payload: Vec<u8>,
    ) -> Vec<Action> {
        let notification = match opcode {
            vendor::MESSAGE => Notification::MessageReceived { context, payload },
            vendor::RESPONSE => {
                if self.pending.remove(context.address, vendor::MESSAGE).is_none() {
                    debug!(addr = %context.address, "Unsolicited response");
                }
                Notification::ResponseReceived { context, payload }
            }
            vendor::BROADCAST => Notification::BroadcastReceived { context, payload },
            _ => {
                warn!(%opcode, addr = %context.address, "Unexpected vendor opcode");
                return vec![];
            }
        };
        vec![Action::Notify(notification)]
    }

    /// A send emitted earlier failed at the transport: release its request.
    pub fn on_call_failed(&mut self, call: &TransportCall) {
        match call {
            TransportCall::ClientModelSend(send) if send.model == ModelKind::VendorClient => {
                if send.ack {
                    self.pending.remove(send.context.address, send.opcode);
                }
                error!(addr = %send.context.address, opcode = %send.opcode, "Failed to send message");
            }
            TransportCall::ServerModelSend { context, .. } => {
                error!(addr = %context.address, "Failed to send response");
            }
            _ => {}
        }
    }

    /// Expire directed messages older than `max_age`, reporting each once.
    pub fn on_sweep(&mut self, max_age: Duration) -> Vec<Action> {
        let mut actions = vec![];
        for request in self.pending.expired(self.now, max_age) {
            self.pending.remove(request.destination, request.opcode);
            warn!(
                addr = %request.destination,
                opcode = %request.opcode,
                "Message response never arrived, expiring"
            );
            actions.push(Action::Notify(Notification::Timeout {
                context: self.outbound(request.destination),
                opcode: request.opcode,
            }));
        }
        actions
    }
}
