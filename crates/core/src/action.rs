//! Actions returned by the orchestrator for the dispatcher to perform.

use crate::{ProvisionedNode, TransportCall, TransportError};
use meshroot_types::{MessageContext, Opcode};
use std::time::Duration;

/// Timers the orchestrator can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Periodic sweep releasing requests whose transport timeout never arrived.
    RequestSweep,
}

/// Application-facing notifications.
///
/// The dispatcher turns each into exactly one call on the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ProvComplete(ProvisionedNode),
    MessageReceived {
        context: MessageContext,
        payload: Vec<u8>,
    },
    ResponseReceived {
        context: MessageContext,
        payload: Vec<u8>,
    },
    Timeout {
        context: MessageContext,
        opcode: Opcode,
    },
    BroadcastReceived {
        context: MessageContext,
        payload: Vec<u8>,
    },
    SendFailed {
        context: MessageContext,
        opcode: Opcode,
        error: TransportError,
    },
}

/// Actions for the dispatcher to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Call into the mesh transport.
    Transport(TransportCall),

    /// Deliver a notification to the application.
    Notify(Notification),

    /// Fire `Event::Timer(id)` after `duration`. Re-arming replaces the previous timer.
    SetTimer { id: TimerId, duration: Duration },
}

impl Action {
    /// The transport call, if this action is one.
    pub fn as_transport(&self) -> Option<&TransportCall> {
        match self {
            Action::Transport(call) => Some(call),
            _ => None,
        }
    }

    /// Get a human-readable name for this action.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Transport(call) => call.type_name(),
            Action::Notify(_) => "notify",
            Action::SetTimer { .. } => "set_timer",
        }
    }
}
