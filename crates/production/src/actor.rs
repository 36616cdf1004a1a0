//! The orchestrator task and its handle.

use meshroot_core::{Event, MeshApplication, MeshTransport, TimerId, TransportError};
use meshroot_messaging::MessagingError;
use meshroot_node::Dispatcher;
use meshroot_types::{Address, DeviceUuid, InboundContext, NodeState};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Failure reaching or using the orchestrator task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("Orchestrator task has stopped")]
    Closed,

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

/// One registered node, as seen by [`OrchestratorHandle::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub address: Address,
    pub uuid: DeviceUuid,
    pub name: Option<String>,
    pub state: NodeState,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub nodes: Vec<NodeSummary>,
    pub quota_remaining: u32,
    pub pending_requests: usize,
}

type Reply = oneshot::Sender<Result<(), MessagingError>>;

#[derive(Debug)]
enum Command {
    Event(Event),
    SendMessage {
        destination: Address,
        payload: Vec<u8>,
        reply: Reply,
    },
    SendBroadcast {
        payload: Vec<u8>,
        reply: Reply,
    },
    SendResponse {
        inbound: InboundContext,
        payload: Vec<u8>,
        reply: Reply,
    },
    LogNetworkInfo,
    Snapshot {
        reply: oneshot::Sender<NetworkSnapshot>,
    },
    Shutdown,
}

// ═══════════════════════════════════════════════════════════════════════════
// Handle
// ═══════════════════════════════════════════════════════════════════════════

/// Cloneable handle to a running orchestrator task.
///
/// Application callbacks run on the orchestrator task itself. A callback
/// that wants to reply must not block on the handle; it spawns a task (or
/// hands the [`InboundContext`] to one) that awaits [`Self::send_response`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    sender: mpsc::UnboundedSender<Command>,
}

impl OrchestratorHandle {
    /// Queue a transport event. Never blocks, so it may be called from
    /// transport callback threads.
    pub fn submit(&self, event: Event) -> Result<(), HandleError> {
        self.post(Command::Event(event))
    }

    /// Send a directed message and wait until it has been handed to the
    /// transport.
    pub async fn send_message(
        &self,
        destination: Address,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), HandleError> {
        let payload = payload.into();
        self.request(|reply| Command::SendMessage {
            destination,
            payload,
            reply,
        })
        .await
    }

    pub async fn send_broadcast(&self, payload: impl Into<Vec<u8>>) -> Result<(), HandleError> {
        let payload = payload.into();
        self.request(|reply| Command::SendBroadcast { payload, reply })
            .await
    }

    /// Answer an inbound message on its captured context.
    pub async fn send_response(
        &self,
        inbound: InboundContext,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), HandleError> {
        let payload = payload.into();
        self.request(|reply| Command::SendResponse {
            inbound,
            payload,
            reply,
        })
        .await
    }

    pub fn log_network_info(&self) -> Result<(), HandleError> {
        self.post(Command::LogNetworkInfo)
    }

    pub async fn snapshot(&self) -> Result<NetworkSnapshot, HandleError> {
        let (reply, response) = oneshot::channel();
        self.post(Command::Snapshot { reply })?;
        response.await.map_err(|_| HandleError::Closed)
    }

    /// Stop the orchestrator task after the commands already queued.
    pub fn shutdown(&self) -> Result<(), HandleError> {
        self.post(Command::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn post(&self, command: Command) -> Result<(), HandleError> {
        self.sender.send(command).map_err(|_| HandleError::Closed)
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<(), HandleError> {
        let (reply, response) = oneshot::channel();
        self.post(command(reply))?;
        Ok(response.await.map_err(|_| HandleError::Closed)??)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Task
// ═══════════════════════════════════════════════════════════════════════════

/// Start `dispatcher` and move it into its own tokio task.
///
/// The provisioner is brought online before the task is spawned, so a
/// transport that refuses startup is reported here. Must be called from
/// within a tokio runtime.
pub fn spawn_orchestrator<T, A>(
    mut dispatcher: Dispatcher<T, A>,
) -> Result<(OrchestratorHandle, JoinHandle<()>), TransportError>
where
    T: MeshTransport + Send + 'static,
    A: MeshApplication + Send + 'static,
{
    dispatcher.set_time(Duration::ZERO);
    dispatcher.start()?;

    let (sender, commands) = mpsc::unbounded_channel();
    let mut task = OrchestratorTask {
        dispatcher,
        commands,
        timer_sender: sender.downgrade(),
        timers: BTreeMap::new(),
        started: Instant::now(),
    };
    task.schedule_timers();

    info!("Orchestrator started");
    let join = tokio::spawn(task.run());
    Ok((OrchestratorHandle { sender }, join))
}

struct OrchestratorTask<T, A> {
    dispatcher: Dispatcher<T, A>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Weak so that dropping every handle stops the task.
    timer_sender: mpsc::WeakUnboundedSender<Command>,
    timers: BTreeMap<TimerId, JoinHandle<()>>,
    started: Instant,
}

impl<T, A> OrchestratorTask<T, A>
where
    T: MeshTransport + Send + 'static,
    A: MeshApplication + Send + 'static,
{
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.dispatcher.set_time(self.started.elapsed());
            match command {
                Command::Event(event) => {
                    trace!(event = event.type_name(), "Dispatching event");
                    self.dispatcher.dispatch(event);
                }
                Command::SendMessage {
                    destination,
                    payload,
                    reply,
                } => {
                    let result = self.dispatcher.send_message(destination, &payload);
                    let _ = reply.send(result);
                }
                Command::SendBroadcast { payload, reply } => {
                    let result = self.dispatcher.send_broadcast(&payload);
                    let _ = reply.send(result);
                }
                Command::SendResponse {
                    inbound,
                    payload,
                    reply,
                } => {
                    let result = self.dispatcher.send_response(inbound, &payload);
                    let _ = reply.send(result);
                }
                Command::LogNetworkInfo => self.dispatcher.log_network_info(),
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                Command::Shutdown => break,
            }
            self.schedule_timers();
        }

        for timer in std::mem::take(&mut self.timers).into_values() {
            timer.abort();
        }
        info!("Orchestrator stopped");
    }

    /// Turn pending timer requests into sleeping tasks, replacing any
    /// earlier timer with the same id.
    fn schedule_timers(&mut self) {
        for (id, duration) in self.dispatcher.drain_timers() {
            let sender = self.timer_sender.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                match sender.upgrade() {
                    Some(sender) => {
                        let _ = sender.send(Command::Event(Event::Timer(id)));
                    }
                    None => debug!(?id, "Timer fired after shutdown"),
                }
            });
            if let Some(previous) = self.timers.insert(id, timer) {
                previous.abort();
            }
        }
    }

    fn snapshot(&self) -> NetworkSnapshot {
        let orchestrator = self.dispatcher.orchestrator();
        let nodes = orchestrator
            .registry()
            .iter()
            .map(|node| NodeSummary {
                address: node.address,
                uuid: node.uuid,
                name: node.name.clone(),
                state: node.state(),
            })
            .collect();
        NetworkSnapshot {
            nodes,
            quota_remaining: orchestrator.provisioner().quota().remaining(),
            pending_requests: orchestrator.messaging().pending().len(),
        }
    }
}

impl<T, A> Drop for OrchestratorTask<T, A> {
    fn drop(&mut self) {
        if !self.timers.is_empty() {
            warn!(count = self.timers.len(), "Dropping orchestrator with armed timers");
            for timer in self.timers.values() {
                timer.abort();
            }
        }
    }
}
