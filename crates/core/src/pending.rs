//! In-flight request tracking.
//!
//! Sends are fire-and-forget at the transport; their outcome arrives later
//! as an event. A `PendingRequest` correlates that later event with the
//! send by `(destination, opcode)`.

use meshroot_types::{Address, Opcode};
use std::collections::BTreeMap;
use std::time::Duration;

/// One in-flight directed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub destination: Address,
    pub opcode: Opcode,
    /// Time of the most recent (re)send.
    pub issued_at: Duration,
    pub retry_count: u8,
}

/// Pending requests keyed by `(destination, opcode)`.
///
/// At most one request per key exists at any time.
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: BTreeMap<(Address, Opcode), PendingRequest>,
}

impl PendingRequests {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. Returns false if one is already in flight for the key.
    pub fn insert(&mut self, destination: Address, opcode: Opcode, now: Duration) -> bool {
        let key = (destination, opcode);
        if self.requests.contains_key(&key) {
            return false;
        }
        self.requests.insert(
            key,
            PendingRequest {
                destination,
                opcode,
                issued_at: now,
                retry_count: 0,
            },
        );
        true
    }

    /// Get the request in flight for a key.
    pub fn get(&self, destination: Address, opcode: Opcode) -> Option<&PendingRequest> {
        self.requests.get(&(destination, opcode))
    }

    /// Check if a request is in flight for a key.
    pub fn contains(&self, destination: Address, opcode: Opcode) -> bool {
        self.requests.contains_key(&(destination, opcode))
    }

    /// Record a resend: bumps the retry count and restarts the clock.
    ///
    /// Returns the new retry count, or `None` if nothing is in flight.
    pub fn record_retry(&mut self, destination: Address, opcode: Opcode, now: Duration) -> Option<u8> {
        let request = self.requests.get_mut(&(destination, opcode))?;
        request.retry_count = request.retry_count.saturating_add(1);
        request.issued_at = now;
        Some(request.retry_count)
    }

    /// Release a request.
    pub fn remove(&mut self, destination: Address, opcode: Opcode) -> Option<PendingRequest> {
        self.requests.remove(&(destination, opcode))
    }

    /// Requests issued more than `max_age` before `now`, oldest key first.
    pub fn expired(&self, now: Duration, max_age: Duration) -> Vec<PendingRequest> {
        self.requests
            .values()
            .filter(|r| now.saturating_sub(r.issued_at) > max_age)
            .copied()
            .collect()
    }

    /// Iterate over all requests in key order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.requests.values()
    }

    /// Get the number of requests in flight.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
