//! Simulation runner.

use crate::application::{AppStats, SimApplication};
use crate::event_queue::EventKey;
use crate::network::{MeshStats, NetworkConfig, SimulatedMesh};
use meshroot_core::{Event, TimerId, TransportError};
use meshroot_messaging::MessagingError;
use meshroot_node::{Dispatcher, MeshOrchestrator};
use meshroot_provisioner::{ConfigError, ProvisionerConfig};
use meshroot_types::NodeState;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Application traffic generated during a run.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Interval between directed messages to a random ready node.
    pub message_interval: Option<Duration>,
    /// Interval between broadcasts.
    pub broadcast_interval: Option<Duration>,
    /// Interval between node-originated messages to us.
    pub inbound_interval: Option<Duration>,
    /// Payload size of generated messages.
    pub payload_len: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            message_interval: Some(Duration::from_secs(1)),
            broadcast_interval: Some(Duration::from_secs(5)),
            inbound_interval: Some(Duration::from_secs(2)),
            payload_len: 16,
        }
    }
}

impl WorkloadConfig {
    /// No application traffic; onboarding only.
    pub fn idle() -> Self {
        Self {
            message_interval: None,
            broadcast_interval: None,
            inbound_interval: None,
            ..Default::default()
        }
    }

    pub fn with_message_interval(mut self, interval: Option<Duration>) -> Self {
        self.message_interval = interval;
        self
    }

    pub fn with_broadcast_interval(mut self, interval: Option<Duration>) -> Self {
        self.broadcast_interval = interval;
        self
    }

    pub fn with_inbound_interval(mut self, interval: Option<Duration>) -> Self {
        self.inbound_interval = interval;
        self
    }

    pub fn with_payload_len(mut self, len: usize) -> Self {
        self.payload_len = len;
        self
    }
}

/// The simulation could not be set up.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid provisioner config: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup failed: {0}")]
    Startup(#[from] TransportError),
}

/// Results of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub messages_sent: u64,
    /// Sends refused by the orchestrator (unknown node, request in flight, payload size).
    pub messages_refused: u64,
    pub broadcasts_sent: u64,
    pub responses_sent: u64,
    /// Sends the transport rejected.
    pub send_errors: u64,
    pub nodes_registered: usize,
    pub nodes_ready: usize,
    pub nodes_stuck: usize,
    pub quota_remaining: u32,
    pub app: AppStats,
    pub mesh: MeshStats,
}

#[derive(Debug)]
enum Scheduled {
    Deliver(Event),
    Beacon(usize),
    MessageTick,
    BroadcastTick,
    InboundTick,
}

/// Drives a [`Dispatcher`] over a [`SimulatedMesh`] in simulated time.
pub struct SimulationRunner {
    dispatcher: Dispatcher<SimulatedMesh, SimApplication>,
    queue: BTreeMap<EventKey, Scheduled>,
    /// Queue position of each armed timer, so re-arming replaces it.
    timers: HashMap<TimerId, EventKey>,
    sequence: u64,
    now: Duration,
    rng: ChaCha8Rng,
    workload: WorkloadConfig,
    stats: SimulationStats,
}

impl std::fmt::Debug for SimulationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationRunner")
            .field("now", &self.now)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl SimulationRunner {
    /// Build the simulation and bring the provisioner online.
    pub fn new(
        provisioner: ProvisionerConfig,
        network: NetworkConfig,
        workload: WorkloadConfig,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        provisioner.validate()?;
        let beacon_interval = network.beacon_interval;
        let mesh = SimulatedMesh::new(network, seed);
        let dispatcher = Dispatcher::new(
            MeshOrchestrator::new(provisioner),
            mesh,
            SimApplication::new(),
        );

        let mut runner = Self {
            dispatcher,
            queue: BTreeMap::new(),
            timers: HashMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
            workload,
            stats: SimulationStats::default(),
        };

        runner.dispatcher.start()?;
        runner.collect();

        let jitter_ms = (beacon_interval.as_millis() as u64).max(1);
        for index in 0..runner.dispatcher.transport().device_count() {
            let jitter = Duration::from_millis(runner.rng.gen_range(0..jitter_ms));
            runner.schedule(jitter, Scheduled::Beacon(index));
        }
        if let Some(interval) = runner.workload.message_interval {
            runner.schedule(interval, Scheduled::MessageTick);
        }
        if let Some(interval) = runner.workload.broadcast_interval {
            runner.schedule(interval, Scheduled::BroadcastTick);
        }
        if let Some(interval) = runner.workload.inbound_interval {
            runner.schedule(interval, Scheduled::InboundTick);
        }

        Ok(runner)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn dispatcher(&self) -> &Dispatcher<SimulatedMesh, SimApplication> {
        &self.dispatcher
    }

    pub fn orchestrator(&self) -> &MeshOrchestrator {
        self.dispatcher.orchestrator()
    }

    /// Snapshot of the run so far.
    pub fn stats(&self) -> SimulationStats {
        let orchestrator = self.dispatcher.orchestrator();
        let registry = orchestrator.registry();
        SimulationStats {
            nodes_registered: registry.len(),
            nodes_ready: registry.count_in_state(NodeState::Ready),
            nodes_stuck: registry.count_in_state(NodeState::Stuck),
            quota_remaining: orchestrator.provisioner().quota().remaining(),
            app: self.dispatcher.application().stats().clone(),
            mesh: self.dispatcher.transport().stats().clone(),
            ..self.stats.clone()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Running
    // ═══════════════════════════════════════════════════════════════════════

    /// Process the next scheduled item. Returns `false` when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some((key, item)) = self.queue.pop_first() else {
            return false;
        };
        self.now = key.time;
        self.dispatcher.set_time(self.now);
        self.process(item);
        self.answer_inbox();
        self.collect();
        true
    }

    /// Run until simulated time `end`.
    pub fn run_until(&mut self, end: Duration) {
        while let Some((key, _)) = self.queue.first_key_value() {
            if key.time > end {
                break;
            }
            self.step();
        }
        self.now = self.now.max(end);

        let stats = self.stats();
        info!(
            now = ?self.now,
            events = stats.events_processed,
            registered = stats.nodes_registered,
            ready = stats.nodes_ready,
            stuck = stats.nodes_stuck,
            messages = stats.messages_sent,
            responses = stats.app.responses_received,
            timeouts = stats.app.timeouts,
            "Simulation complete"
        );
    }

    fn schedule(&mut self, delay: Duration, item: Scheduled) -> EventKey {
        let key = EventKey::new(self.now + delay, self.sequence);
        self.sequence += 1;
        self.queue.insert(key, item);
        key
    }

    fn dispatch(&mut self, event: Event) {
        self.stats.events_processed += 1;
        self.dispatcher.dispatch(event);
    }

    fn process(&mut self, item: Scheduled) {
        match item {
            Scheduled::Deliver(event) => {
                if let Event::Timer(id) = &event {
                    self.timers.remove(id);
                }
                self.dispatch(event);
            }

            Scheduled::Beacon(index) => {
                let Some(event) = self.dispatcher.transport().beacon(index) else {
                    return;
                };
                self.dispatch(event);
                if self.dispatcher.transport().is_advertising(index) {
                    let interval = self.dispatcher.transport().config().beacon_interval;
                    self.schedule(interval, Scheduled::Beacon(index));
                }
            }

            Scheduled::MessageTick => {
                let ready: Vec<_> = self
                    .orchestrator()
                    .registry()
                    .iter()
                    .filter(|n| n.state() == NodeState::Ready)
                    .map(|n| n.address)
                    .collect();
                if !ready.is_empty() {
                    let destination = ready[self.rng.gen_range(0..ready.len())];
                    let payload = self.payload();
                    match self.dispatcher.send_message(destination, &payload) {
                        Ok(()) => self.stats.messages_sent += 1,
                        Err(MessagingError::Transport(_)) => self.stats.send_errors += 1,
                        Err(err) => {
                            debug!(addr = %destination, error = %err, "Message refused");
                            self.stats.messages_refused += 1;
                        }
                    }
                }
                if let Some(interval) = self.workload.message_interval {
                    self.schedule(interval, Scheduled::MessageTick);
                }
            }

            Scheduled::BroadcastTick => {
                let payload = self.payload();
                match self.dispatcher.send_broadcast(&payload) {
                    Ok(()) => self.stats.broadcasts_sent += 1,
                    Err(MessagingError::Transport(_)) => self.stats.send_errors += 1,
                    Err(_) => self.stats.messages_refused += 1,
                }
                if let Some(interval) = self.workload.broadcast_interval {
                    self.schedule(interval, Scheduled::BroadcastTick);
                }
            }

            Scheduled::InboundTick => {
                let payload = self.payload();
                if let Some(event) = self.dispatcher.transport_mut().inbound_message(&payload) {
                    self.dispatch(event);
                }
                if let Some(interval) = self.workload.inbound_interval {
                    self.schedule(interval, Scheduled::InboundTick);
                }
            }
        }
    }

    fn payload(&mut self) -> Vec<u8> {
        let mut payload = vec![0u8; self.workload.payload_len];
        self.rng.fill(&mut payload[..]);
        payload
    }

    /// Reply to every inbound message the application received.
    fn answer_inbox(&mut self) {
        for inbound in self.dispatcher.application_mut().take_inbox() {
            match self.dispatcher.send_response(inbound, b"ack") {
                Ok(()) => self.stats.responses_sent += 1,
                Err(_) => self.stats.send_errors += 1,
            }
        }
    }

    /// Schedule mesh replies and timers produced by the last dispatch.
    fn collect(&mut self) {
        for (delay, event) in self.dispatcher.transport_mut().take_outbox() {
            self.schedule(delay, Scheduled::Deliver(event));
        }
        for (id, duration) in self.dispatcher.drain_timers() {
            if let Some(previous) = self.timers.remove(&id) {
                self.queue.remove(&previous);
            }
            let key = self.schedule(duration, Scheduled::Deliver(Event::Timer(id)));
            self.timers.insert(id, key);
        }
    }
}
