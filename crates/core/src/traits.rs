//! Core traits for state machines.

use crate::{Action, Event};
use std::time::Duration;

/// A state machine that processes events.
///
/// This is the core abstraction of the orchestrator. Every piece of
/// onboarding and messaging logic is implemented as a state machine that is:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl StateMachine for MeshOrchestrator {
///     fn handle(&mut self, event: Event) -> Vec<Action> {
///         match event {
///             Event::UnprovisionedDeviceSeen(device) => {
///                 self.provisioner.on_device_seen(device)
///             }
///             // ... etc
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method never blocks or awaits
    /// - **Deterministic**: Given the same state and event, always returns the same actions
    /// - **No I/O**: All I/O is performed by the dispatcher via the returned actions
    ///
    /// # Returns
    ///
    /// A list of actions for the dispatcher to execute, in order. Actions may include:
    /// - Calls into the mesh transport
    /// - Notifications for the application
    /// - Timer requests
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the dispatcher before each `handle()` call to provide the
    /// current simulation or wall-clock time.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}
