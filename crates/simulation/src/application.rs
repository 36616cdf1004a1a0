use meshroot_core::{MeshApplication, ProvisionedNode, TransportError};
use meshroot_types::{InboundContext, MessageContext, Opcode};
use std::collections::VecDeque;

/// Application counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppStats {
    pub provisioned: u64,
    pub messages_received: u64,
    pub responses_received: u64,
    pub timeouts: u64,
    pub broadcasts_received: u64,
    pub send_failures: u64,
}

/// Application driven by the simulation runner.
///
/// Counts callbacks and parks inbound message contexts until the runner
/// answers them.
#[derive(Debug, Default)]
pub struct SimApplication {
    stats: AppStats,
    inbox: VecDeque<InboundContext>,
}

impl SimApplication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &AppStats {
        &self.stats
    }

    /// Inbound messages not answered yet.
    pub fn take_inbox(&mut self) -> Vec<InboundContext> {
        self.inbox.drain(..).collect()
    }
}

impl MeshApplication for SimApplication {
    fn on_prov_complete(&mut self, _node: &ProvisionedNode) {
        self.stats.provisioned += 1;
    }

    fn on_recv_message(&mut self, context: InboundContext, _payload: &[u8]) {
        self.stats.messages_received += 1;
        self.inbox.push_back(context);
    }

    fn on_recv_response(&mut self, _context: &MessageContext, _payload: &[u8]) {
        self.stats.responses_received += 1;
    }

    fn on_timeout(&mut self, _context: &MessageContext, _opcode: Opcode) {
        self.stats.timeouts += 1;
    }

    fn on_broadcast(&mut self, _context: &MessageContext, _payload: &[u8]) {
        self.stats.broadcasts_received += 1;
    }

    fn on_send_failed(&mut self, _context: &MessageContext, _opcode: Opcode, _error: &TransportError) {
        self.stats.send_failures += 1;
    }
}
