//! Key material held by the provisioner.

use crate::{AppKeyIndex, NetKeyIndex};
use std::fmt;

/// Length of an application key in bytes.
pub const APP_KEY_LEN: usize = 16;

/// Process-wide key material: the key indices every node is configured with
/// and the AppKey bytes distributed to them.
///
/// Set once when the orchestrator is constructed and read-only afterwards.
/// The only mutation is adopting the index the transport reports when the
/// local AppKey is installed.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub net_key_index: NetKeyIndex,
    pub app_key_index: AppKeyIndex,
    pub app_key: [u8; APP_KEY_LEN],
}

impl KeyMaterial {
    /// Create key material.
    pub fn new(
        net_key_index: NetKeyIndex,
        app_key_index: AppKeyIndex,
        app_key: [u8; APP_KEY_LEN],
    ) -> Self {
        Self {
            net_key_index,
            app_key_index,
            app_key,
        }
    }
}

// Key bytes never reach logs.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("net_key_index", &self.net_key_index)
            .field("app_key_index", &self.app_key_index)
            .field("app_key", &"<redacted>")
            .finish()
    }
}
