//! Task-per-node execution.
//!
//! Every node runs on its own tokio task, driven by a [`NodeRunner`]: a loop
//! that asks the node's input stream handler for firings, invokes the
//! calculator, flushes its emissions downstream, and otherwise awaits the
//! next packet or closure on any input channel. Because each node is a
//! single task, its hooks can never overlap with themselves and calculator
//! state needs no locking.
//!
//! The [`Scheduler`] owns the task set and the pieces shared across tasks:
//! the cancellation token, the stop flag, and the graph's external input
//! channels (which a cooperative stop must close).

use crate::calculator::{Calculator, CalculatorContext, ProcessOutcome};
use crate::error::GraphError;
use crate::handler::{FiringPlan, FiringSet, InputStreamHandler};
use crate::packet::Packet;
use crate::port::PacketType;
use crate::side_packet::SidePacketSet;
use crate::stream::{InputPortBuffer, OutputChannel, OutputStreamSet};
use futures::future::select_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// One boundary stream: its sending channel plus the payload type resolved
/// from the ports consuming it.
#[derive(Debug)]
struct ExternalChannel {
    packet_type: PacketType,
    channel: tokio::sync::Mutex<OutputChannel>,
}

/// The graph's boundary input streams, shared with callers feeding packets
/// from outside the scheduler.
///
/// Each stream sits behind its own async mutex so concurrent feeders
/// serialize per stream, not globally.
#[derive(Debug)]
pub(crate) struct ExternalInputs {
    channels: HashMap<String, ExternalChannel>,
    open: AtomicUsize,
}

impl ExternalInputs {
    pub(crate) fn new(channels: HashMap<String, (OutputChannel, PacketType)>) -> Self {
        let open = AtomicUsize::new(channels.len());
        Self {
            channels: channels
                .into_iter()
                .map(|(name, (channel, packet_type))| {
                    (
                        name,
                        ExternalChannel {
                            packet_type,
                            channel: tokio::sync::Mutex::new(channel),
                        },
                    )
                })
                .collect(),
            open,
        }
    }

    /// Validates and delivers one packet into a graph input stream, waiting
    /// for downstream capacity.
    pub(crate) async fn add_packet(&self, name: &str, packet: Packet) -> Result<(), GraphError> {
        let entry = self
            .channels
            .get(name)
            .ok_or_else(|| GraphError::wiring(format!("no graph input stream '{}'", name)))?;
        if !entry.packet_type.accepts(&packet) {
            return Err(GraphError::TypeMismatch {
                expected: entry.packet_type.name().to_string(),
                actual: packet.type_name().to_string(),
            });
        }
        let mut channel = entry.channel.lock().await;
        channel.check_emit(packet.timestamp())?;
        channel.send(packet).await;
        Ok(())
    }

    /// Attaches an extra consumer cursor to a boundary stream. Build-time
    /// only: fails if the channel is contended.
    pub(crate) fn subscribe(
        &self,
        name: &str,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Packet>, GraphError> {
        let entry = self
            .channels
            .get(name)
            .ok_or_else(|| GraphError::wiring(format!("no graph input stream '{}'", name)))?;
        let mut channel = entry
            .channel
            .try_lock()
            .map_err(|_| {
                GraphError::wiring(format!("graph input stream '{}' is already live", name))
            })?;
        Ok(channel.subscribe(capacity))
    }

    /// Closes one graph input stream. Idempotent.
    pub(crate) async fn close(&self, name: &str) -> Result<(), GraphError> {
        let entry = self
            .channels
            .get(name)
            .ok_or_else(|| GraphError::wiring(format!("no graph input stream '{}'", name)))?;
        let mut channel = entry.channel.lock().await;
        if !channel.is_closed() {
            channel.close();
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Closes every graph input stream that is still open.
    pub(crate) async fn close_all(&self) {
        for entry in self.channels.values() {
            let mut channel = entry.channel.lock().await;
            if !channel.is_closed() {
                channel.close();
                self.open.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Returns true while at least one boundary stream accepts packets.
    pub(crate) fn any_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) > 0
    }
}

/// State shared by every node task and the graph handle.
#[derive(Debug)]
pub(crate) struct SchedulerShared {
    pub(crate) cancel: CancellationToken,
    stop_requested: AtomicBool,
    pub(crate) inputs: Arc<ExternalInputs>,
}

impl SchedulerShared {
    /// Handles a cooperative stop: closes the boundary streams exactly once
    /// so the graph drains and terminates.
    pub(crate) async fn request_stop(&self) {
        if !self.stop_requested.swap(true, Ordering::SeqCst) {
            info!("stop requested; closing graph input streams");
            self.inputs.close_all().await;
        }
    }
}

/// The running state of one node: its calculator, readiness policy, input
/// buffers, and output streams.
pub(crate) struct NodeRunner {
    name: String,
    calculator: Box<dyn Calculator>,
    handler: Box<dyn InputStreamHandler>,
    buffers: Vec<InputPortBuffer>,
    receivers: Vec<Option<mpsc::Receiver<Packet>>>,
    outputs: OutputStreamSet,
    side_packets: SidePacketSet,
    shared: Arc<SchedulerShared>,
}

impl NodeRunner {
    pub(crate) fn new(
        name: String,
        calculator: Box<dyn Calculator>,
        handler: Box<dyn InputStreamHandler>,
        inputs: Vec<(InputPortBuffer, mpsc::Receiver<Packet>)>,
        outputs: OutputStreamSet,
        side_packets: SidePacketSet,
        shared: Arc<SchedulerShared>,
    ) -> Self {
        let mut buffers = Vec::with_capacity(inputs.len());
        let mut receivers = Vec::with_capacity(inputs.len());
        for (buffer, receiver) in inputs {
            buffers.push(buffer);
            receivers.push(Some(receiver));
        }
        Self {
            name,
            calculator,
            handler,
            buffers,
            receivers,
            outputs,
            side_packets,
            shared,
        }
    }

    async fn run(mut self) -> Result<(), GraphError> {
        {
            let firing = FiringSet::empty();
            let mut cx =
                CalculatorContext::new(&self.name, &firing, &self.side_packets, &mut self.outputs);
            self.calculator.open(&mut cx).await?;
        }
        self.outputs.flush().await;

        // Source nodes have no inputs: they emit everything from `open` and are
        // done.
        if self.buffers.is_empty() {
            debug!(node = %self.name, "source node finished after open");
            return Ok(());
        }

        loop {
            // Fire as long as the handler keeps planning firings over the
            // buffered packets.
            loop {
                match self.handler.plan(&mut self.buffers) {
                    FiringPlan::Fire(firing) => {
                        trace!(node = %self.name, timestamp = %firing.timestamp, "firing");
                        let outcome = {
                            let mut cx = CalculatorContext::new(
                                &self.name,
                                &firing,
                                &self.side_packets,
                                &mut self.outputs,
                            );
                            self.calculator.process(&mut cx).await?
                        };
                        self.outputs.flush().await;
                        if outcome == ProcessOutcome::Stop {
                            debug!(node = %self.name, "calculator requested graph stop");
                            return Err(GraphError::StopRequested);
                        }
                    }
                    FiringPlan::Wait => break,
                    FiringPlan::Exhausted => {
                        debug!(node = %self.name, "all inputs exhausted");
                        return Ok(());
                    }
                }
            }

            // Await the next packet or closure on any input still worth reading.
            // Ports at the handler's poll limit are left unread so the bounded
            // channel pushes back on the producer.
            let poll_limit = self.handler.poll_limit();
            let pending: Vec<_> = self
                .receivers
                .iter_mut()
                .zip(self.buffers.iter())
                .enumerate()
                .filter_map(|(index, (receiver, buffer))| {
                    if buffer.len() >= poll_limit {
                        return None;
                    }
                    let receiver = receiver.as_mut()?;
                    Some(Box::pin(async move { (index, receiver.recv().await) }))
                })
                .collect();
            if pending.is_empty() {
                warn!(node = %self.name, "waiting with no readable inputs; shutting node down");
                return Ok(());
            }

            let (index, received) = tokio::select! {
                () = self.shared.cancel.cancelled() => {
                    debug!(node = %self.name, "cancelled");
                    return Ok(());
                }
                (event, _, _) = select_all(pending) => event,
            };
            match received {
                Some(packet) => self.buffers[index].push(packet)?,
                None => {
                    trace!(
                        node = %self.name,
                        stream = self.buffers[index].stream_name(),
                        "input stream closed"
                    );
                    self.receivers[index] = None;
                    self.buffers[index].mark_closed();
                }
            }
        }
    }
}

/// Owns the node tasks of one graph run.
#[derive(Debug)]
pub(crate) struct Scheduler {
    shared: Arc<SchedulerShared>,
    join_set: Mutex<JoinSet<Result<(), GraphError>>>,
    // Once joined, the run's result is cached here so every waiter, including
    // late or concurrent ones, observes the same outcome.
    outcome: tokio::sync::Mutex<Option<Result<(), GraphError>>>,
}

impl Scheduler {
    pub(crate) fn new(inputs: Arc<ExternalInputs>) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                cancel: CancellationToken::new(),
                stop_requested: AtomicBool::new(false),
                inputs,
            }),
            join_set: Mutex::new(JoinSet::new()),
            outcome: tokio::sync::Mutex::new(None),
        }
    }

    pub(crate) fn shared(&self) -> Arc<SchedulerShared> {
        Arc::clone(&self.shared)
    }

    /// Spawns one node task. A stop request from the node closes the boundary
    /// streams; any other failure cancels the whole graph.
    pub(crate) fn spawn(&self, runner: NodeRunner) {
        let shared = Arc::clone(&self.shared);
        let mut join_set = self
            .join_set
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        join_set.spawn(async move {
            let node = runner.name.clone();
            match runner.run().await {
                Ok(()) => {
                    debug!(node = %node, "node task finished");
                    Ok(())
                }
                Err(error) if error.is_stop_request() => {
                    shared.request_stop().await;
                    Err(error)
                }
                Err(error) => {
                    error!(node = %node, %error, "node failed; cancelling graph");
                    shared.cancel.cancel();
                    shared.inputs.close_all().await;
                    Err(error)
                }
            }
        });
    }

    /// Joins every node task and reports the run's outcome: the first real
    /// error, with cooperative stop requests counting as success. Safe to
    /// call from any number of waiters; all of them see the same result.
    pub(crate) async fn wait(&self) -> Result<(), GraphError> {
        let mut outcome = self.outcome.lock().await;
        if let Some(result) = outcome.as_ref() {
            return result.clone();
        }
        let mut join_set = {
            let mut guard = self
                .join_set
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        let mut first_error: Option<GraphError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) if error.is_stop_request() => {}
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(join_error) if join_error.is_panic() => {
                    if first_error.is_none() {
                        first_error = Some(GraphError::calculator(
                            "scheduler",
                            format!("node task panicked: {}", join_error),
                        ));
                    }
                }
                Err(_) => {}
            }
        }
        // Whatever ended the run, the boundary must be terminal afterwards.
        self.shared.inputs.close_all().await;
        let result = match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        };
        *outcome = Some(result.clone());
        result
    }
}
