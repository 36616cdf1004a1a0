//! Closure-based application callbacks.

use meshroot_core::{MeshApplication, ProvisionedNode, TransportError};
use meshroot_types::{InboundContext, MessageContext, Opcode};
use thiserror::Error;

/// The application handed over an incomplete set of callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("Missing application callback: {0}")]
    MissingCallback(&'static str),
}

type ProvCompleteFn = Box<dyn FnMut(&ProvisionedNode) + Send>;
type RecvMessageFn = Box<dyn FnMut(InboundContext, &[u8]) + Send>;
type PayloadFn = Box<dyn FnMut(&MessageContext, &[u8]) + Send>;
type TimeoutFn = Box<dyn FnMut(&MessageContext, Opcode) + Send>;
type SendFailedFn = Box<dyn FnMut(&MessageContext, Opcode, &TransportError) + Send>;

/// Builder for a closure-based [`MeshApplication`].
///
/// All five notification callbacks are mandatory; [`HandlerSet::build`]
/// rejects an incomplete set before the orchestrator is started.
///
/// ```ignore
/// let app = HandlerSet::new()
///     .on_prov_complete(|node| println!("{}", node.address))
///     .on_recv_message(|ctx, data| inbox.push((ctx, data.to_vec())))
///     .on_recv_response(|_, _| {})
///     .on_timeout(|_, _| {})
///     .on_broadcast(|_, _| {})
///     .build()?;
/// ```
#[derive(Default)]
pub struct HandlerSet {
    prov_complete: Option<ProvCompleteFn>,
    recv_message: Option<RecvMessageFn>,
    recv_response: Option<PayloadFn>,
    timeout: Option<TimeoutFn>,
    broadcast: Option<PayloadFn>,
    send_failed: Option<SendFailedFn>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_prov_complete(mut self, f: impl FnMut(&ProvisionedNode) + Send + 'static) -> Self {
        self.prov_complete = Some(Box::new(f));
        self
    }

    pub fn on_recv_message(
        mut self,
        f: impl FnMut(InboundContext, &[u8]) + Send + 'static,
    ) -> Self {
        self.recv_message = Some(Box::new(f));
        self
    }

    pub fn on_recv_response(
        mut self,
        f: impl FnMut(&MessageContext, &[u8]) + Send + 'static,
    ) -> Self {
        self.recv_response = Some(Box::new(f));
        self
    }

    pub fn on_timeout(mut self, f: impl FnMut(&MessageContext, Opcode) + Send + 'static) -> Self {
        self.timeout = Some(Box::new(f));
        self
    }

    pub fn on_broadcast(mut self, f: impl FnMut(&MessageContext, &[u8]) + Send + 'static) -> Self {
        self.broadcast = Some(Box::new(f));
        self
    }

    /// Optional.
    pub fn on_send_failed(
        mut self,
        f: impl FnMut(&MessageContext, Opcode, &TransportError) + Send + 'static,
    ) -> Self {
        self.send_failed = Some(Box::new(f));
        self
    }

    /// Check that every mandatory callback is present.
    pub fn build(self) -> Result<Handlers, ContractError> {
        Ok(Handlers {
            prov_complete: self
                .prov_complete
                .ok_or(ContractError::MissingCallback("on_prov_complete"))?,
            recv_message: self
                .recv_message
                .ok_or(ContractError::MissingCallback("on_recv_message"))?,
            recv_response: self
                .recv_response
                .ok_or(ContractError::MissingCallback("on_recv_response"))?,
            timeout: self
                .timeout
                .ok_or(ContractError::MissingCallback("on_timeout"))?,
            broadcast: self
                .broadcast
                .ok_or(ContractError::MissingCallback("on_broadcast"))?,
            send_failed: self.send_failed,
        })
    }
}

/// A complete set of application callbacks.
pub struct Handlers {
    prov_complete: ProvCompleteFn,
    recv_message: RecvMessageFn,
    recv_response: PayloadFn,
    timeout: TimeoutFn,
    broadcast: PayloadFn,
    send_failed: Option<SendFailedFn>,
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("send_failed", &self.send_failed.is_some())
            .finish_non_exhaustive()
    }
}

impl MeshApplication for Handlers {
    fn on_prov_complete(&mut self, node: &ProvisionedNode) {
        (self.prov_complete)(node)
    }

    fn on_recv_message(&mut self, context: InboundContext, payload: &[u8]) {
        (self.recv_message)(context, payload)
    }

    fn on_recv_response(&mut self, context: &MessageContext, payload: &[u8]) {
        (self.recv_response)(context, payload)
    }

    fn on_timeout(&mut self, context: &MessageContext, opcode: Opcode) {
        (self.timeout)(context, opcode)
    }

    fn on_broadcast(&mut self, context: &MessageContext, payload: &[u8]) {
        (self.broadcast)(context, payload)
    }

    fn on_send_failed(&mut self, context: &MessageContext, opcode: Opcode, error: &TransportError) {
        if let Some(f) = self.send_failed.as_mut() {
            f(context, opcode, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn complete() -> HandlerSet {
        HandlerSet::new()
            .on_prov_complete(|_| {})
            .on_recv_message(|_, _| {})
            .on_recv_response(|_, _| {})
            .on_timeout(|_, _| {})
            .on_broadcast(|_, _| {})
    }

    #[test]
    fn test_complete_set_builds() {
        assert!(complete().build().is_ok());
    }

    #[test]
    fn test_missing_callback_rejected() {
        let err = HandlerSet::new()
            .on_prov_complete(|_| {})
            .on_recv_response(|_, _| {})
            .on_timeout(|_, _| {})
            .on_broadcast(|_, _| {})
            .build()
            .unwrap_err();
        assert_eq!(err, ContractError::MissingCallback("on_recv_message"));

        let err = HandlerSet::new().build().unwrap_err();
        assert_eq!(err, ContractError::MissingCallback("on_prov_complete"));
    }

    #[test]
    fn test_handlers_forward_calls() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handlers = complete()
            .on_broadcast(move |ctx, data| sink.lock().unwrap().push((ctx.address, data.to_vec())))
            .build()
            .unwrap();

        let ctx = MessageContext::outbound(
            meshroot_types::NetKeyIndex::PRIMARY,
            meshroot_types::AppKeyIndex(0),
            meshroot_types::Address(0x0007),
            7,
        );
        handlers.on_broadcast(&ctx, b"hello");
        handlers.on_send_failed(
            &ctx,
            meshroot_core::opcodes::vendor::MESSAGE,
            &TransportError::new("client_model_send", -1),
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(meshroot_types::Address(0x0007), b"hello".to_vec())]
        );
    }
}
