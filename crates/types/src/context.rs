//! Addressing context of access-layer messages.

use crate::{Address, AppKeyIndex, NetKeyIndex};
use serde::{Deserialize, Serialize};

/// Default TTL for messages originated by the provisioner.
pub const DEFAULT_SEND_TTL: u8 = 7;

/// Role the local device sends client messages under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Messages sent by the provisioner itself.
    #[default]
    Provisioner,
    /// Messages sent as an ordinary node.
    Node,
}

/// Addressing context of a sent or received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub net_key_index: NetKeyIndex,
    pub app_key_index: AppKeyIndex,
    /// Destination when sending, source when receiving.
    pub address: Address,
    /// Address the message was received on (unicast or group).
    pub recv_dst: Address,
    pub send_ttl: u8,
}

impl MessageContext {
    /// Context for a message sent to `address`.
    pub fn outbound(
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
        address: Address,
        send_ttl: u8,
    ) -> Self {
        Self {
            net_key_index,
            app_key_index,
            address,
            recv_dst: Address::UNASSIGNED,
            send_ttl,
        }
    }
}

/// Context captured from an inbound directed message.
///
/// Not `Clone`: a reply consumes it, so one inbound request gets at most
/// one reply.
#[derive(Debug, PartialEq, Eq)]
pub struct InboundContext(MessageContext);

impl InboundContext {
    /// Wrap the context of a received message.
    pub fn new(context: MessageContext) -> Self {
        Self(context)
    }

    /// The captured context.
    pub fn context(&self) -> &MessageContext {
        &self.0
    }

    /// Address of the requesting node.
    pub fn source(&self) -> Address {
        self.0.address
    }

    /// Consume the handle, yielding the context to reply on.
    pub fn into_context(self) -> MessageContext {
        self.0
    }
}
