//! The application-facing callback contract.

use crate::{ProvisionedNode, TransportError};
use meshroot_types::{InboundContext, MessageContext, Opcode};

/// Callbacks the orchestrator delivers to the application.
///
/// Every callback runs synchronously inside the dispatch of the event that
/// produced it. Payload length is `payload.len()`.
pub trait MeshApplication {
    /// A device finished provisioning and was registered.
    fn on_prov_complete(&mut self, node: &ProvisionedNode);

    /// A node sent us a directed message. Reply through the dispatcher's
    /// `send_response(context, ..)`; the context can only be used once.
    fn on_recv_message(&mut self, context: InboundContext, payload: &[u8]);

    /// A node answered one of our messages.
    fn on_recv_response(&mut self, context: &MessageContext, payload: &[u8]);

    /// A message we sent got no response in time.
    fn on_timeout(&mut self, context: &MessageContext, opcode: Opcode);

    /// A broadcast from another node arrived.
    fn on_broadcast(&mut self, context: &MessageContext, payload: &[u8]);

    /// The transport reported it could not send a message.
    fn on_send_failed(
        &mut self,
        _context: &MessageContext,
        _opcode: Opcode,
        _error: &TransportError,
    ) {
    }
}

impl<A: MeshApplication + ?Sized> MeshApplication for Box<A> {
    fn on_prov_complete(&mut self, node: &ProvisionedNode) {
        (**self).on_prov_complete(node)
    }

    fn on_recv_message(&mut self, context: InboundContext, payload: &[u8]) {
        (**self).on_recv_message(context, payload)
    }

    fn on_recv_response(&mut self, context: &MessageContext, payload: &[u8]) {
        (**self).on_recv_response(context, payload)
    }

    fn on_timeout(&mut self, context: &MessageContext, opcode: Opcode) {
        (**self).on_timeout(context, opcode)
    }

    fn on_broadcast(&mut self, context: &MessageContext, payload: &[u8]) {
        (**self).on_broadcast(context, payload)
    }

    fn on_send_failed(&mut self, context: &MessageContext, opcode: Opcode, error: &TransportError) {
        (**self).on_send_failed(context, opcode, error)
    }
}
