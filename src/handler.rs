//! Input stream handlers: readiness policies for multi-input nodes.
//!
//! A handler decides, from the buffered state of all of a node's input
//! streams, when the node may fire and which packet window from each stream
//! to bind for that firing. The engine ships the two required policies:
//!
//! - [`DefaultStreamHandler`] synchronizes by equal timestamp. A node fires
//!   only when every open input in a tag group holds a packet at the group's
//!   minimum unconsumed timestamp; closed-and-drained streams are
//!   permanently absent and never block. Timestamps a lagging stream has
//!   demonstrably skipped are dropped so the group can advance.
//! - [`FixedSizeStreamHandler`] buffers until every input holds a
//!   configured minimum, then drains in batches. Trades latency for
//!   throughput and gives producers real backpressure.
//!
//! Handlers are pure synchronous logic over [`InputPortBuffer`] slices; the
//! node runner owns the channels and wakeups.

use crate::config::NodeConfig;
use crate::error::GraphError;
use crate::packet::Packet;
use crate::port::PortKey;
use crate::stream::{DEFAULT_CHANNEL_CAPACITY, InputPortBuffer};
use crate::timestamp::Timestamp;
use tracing::debug;

/// Config name of the default input stream handler.
pub const DEFAULT_HANDLER_NAME: &str = "DefaultInputStreamHandler";
/// Config name of the fixed-size input stream handler.
pub const FIXED_SIZE_HANDLER_NAME: &str = "FixedSizeInputStreamHandler";

/// The inputs bound for one firing of a node.
///
/// `windows` is ordered like the node's input ports, restricted to the tag
/// group being fired; an empty window reports permanent absence from a
/// closed stream.
#[derive(Debug)]
pub struct FiringSet {
    /// The firing timestamp: the synchronized timestamp under the default
    /// policy, the upper bound of the delivered window under the fixed-size
    /// policy.
    pub timestamp: Timestamp,
    /// Per-port packet windows for this firing.
    pub windows: Vec<(PortKey, Vec<Packet>)>,
}

impl FiringSet {
    /// An empty firing set, used for the `open` hook.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            timestamp: Timestamp::UNSET,
            windows: Vec::new(),
        }
    }

    /// The window bound to `key` for this firing; empty if the port is not
    /// part of the firing or its stream is permanently absent.
    #[must_use]
    pub fn window(&self, key: &PortKey) -> &[Packet] {
        self
            .windows
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, window)| window.as_slice())
            .unwrap_or(&[])
    }

    /// Total number of packets across all windows.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.windows.iter().map(|(_, window)| window.len()).sum()
    }
}

/// Outcome of asking a handler whether its node may fire.
#[derive(Debug)]
pub enum FiringPlan {
    /// The node is ready; fire with the bound windows.
    Fire(FiringSet),
    /// Not enough data yet; wait for more packets or a closure.
    Wait,
    /// Every input is closed and drained; the node will never fire again.
    Exhausted,
}

/// Policy deciding when a node has enough buffered input to fire.
///
/// Implementations mutate the buffers (consuming or discarding packets) when
/// they produce a [`FiringPlan::Fire`]. The runner calls
/// [`plan`](InputStreamHandler::plan) repeatedly until it reports
/// [`FiringPlan::Wait`] or [`FiringPlan::Exhausted`].
pub trait InputStreamHandler: Send {
    /// Capacity of the mpsc channel behind each of this node's input ports.
    fn channel_capacity(&self) -> usize {
        DEFAULT_CHANNEL_CAPACITY
    }

    /// The runner stops reading an input's channel once this many packets are
    /// buffered, so bounded channels block the producer.
    fn poll_limit(&self) -> usize {
        usize::MAX
    }

    /// Decides whether the node may fire next and binds the packet windows.
    fn plan(&mut self, inputs: &mut [InputPortBuffer]) -> FiringPlan;
}

/// Fire as soon as every open required input holds a packet at the group's
/// minimum unconsumed timestamp.
///
/// Synchronization is computed per tag group independently: a node with two
/// unrelated tag groups fires each group at its own pace. One `plan` call
/// fires at most one group.
#[derive(Debug, Default)]
pub struct DefaultStreamHandler;

impl DefaultStreamHandler {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl InputStreamHandler for DefaultStreamHandler {
    fn plan(&mut self, inputs: &mut [InputPortBuffer]) -> FiringPlan {
        if inputs.is_empty() {
            return FiringPlan::Exhausted;
        }

        // Tag groups in declaration order.
        let mut tags: Vec<String> = Vec::new();
        for input in inputs.iter() {
            if !tags.iter().any(|tag| tag == &input.key().tag) {
                tags.push(input.key().tag.clone());
            }
        }

        let mut any_waiting = false;
        for tag in &tags {
            let group: Vec<usize> = (0..inputs.len())
                .filter(|&i| &inputs[i].key().tag == tag)
                .collect();
            loop {
                // An open stream with nothing buffered could still produce any
                // timestamp; the group must wait for it.
                if group
                    .iter()
                    .any(|&i| !inputs[i].is_closed() && inputs[i].is_empty())
                {
                    any_waiting = true;
                    break;
                }
                let participants: Vec<usize> = group
                    .iter()
                    .copied()
                    .filter(|&i| !inputs[i].is_empty())
                    .collect();
                if participants.is_empty() {
                    // All closed and drained; this group is spent.
                    break;
                }
                let Some(candidate) = participants
                    .iter()
                    .filter_map(|&i| inputs[i].head_timestamp())
                    .min()
                else {
                    break;
                };
                let matched = participants
                    .iter()
                    .all(|&i| inputs[i].head_timestamp() == Some(candidate));
                if matched {
                    let mut windows = Vec::with_capacity(group.len());
                    for &i in &group {
                        let mut window = Vec::new();
                        if inputs[i].head_timestamp() == Some(candidate) {
                            if let Some(packet) = inputs[i].pop() {
                                window.push(packet);
                            }
                        }
                        windows.push((inputs[i].key().clone(), window));
                    }
                    return FiringPlan::Fire(FiringSet {
                        timestamp: candidate,
                        windows,
                    });
                }
                // Some stream's head has already passed `candidate`: no packet at
                // that timestamp can ever arrive there, so the stragglers at
                // `candidate` are unmatchable. Drop them and rescan.
                for &i in &participants {
                    if inputs[i].head_timestamp() == Some(candidate) {
                        if inputs[i].pop().is_some() {
                            debug!(
                                stream = inputs[i].stream_name(),
                                timestamp = %candidate,
                                "dropping packet at skipped timestamp"
                            );
                        }
                    }
                }
            }
        }

        if any_waiting {
            FiringPlan::Wait
        } else {
            FiringPlan::Exhausted
        }
    }
}

/// Buffer until every input holds a configured minimum, then drain batches.
///
/// A node becomes ready once every non-closed input buffers at least
/// `trigger_queue_size` packets; a firing then drains up to
/// `target_queue_size` per stream. With `fixed_min_size`, every stream
/// contributes the same count, keeping the streams in lockstep. Inputs that
/// close before reaching the trigger deliver their remainder once, then the
/// handler reports exhaustion.
#[derive(Debug)]
pub struct FixedSizeStreamHandler {
    trigger_queue_size: usize,
    target_queue_size: usize,
    fixed_min_size: bool,
    last_fired: Timestamp,
}

impl FixedSizeStreamHandler {
    /// Creates a fixed-size policy. Sizes below 1 are clamped to 1.
    #[must_use]
    pub fn new(trigger_queue_size: usize, target_queue_size: usize, fixed_min_size: bool) -> Self {
        Self {
            trigger_queue_size: trigger_queue_size.max(1),
            target_queue_size: target_queue_size.max(1),
            fixed_min_size,
            last_fired: Timestamp::UNSET,
        }
    }

    /// The configured trigger size.
    #[must_use]
    pub fn trigger_queue_size(&self) -> usize {
        self.trigger_queue_size
    }

    /// The configured drain size.
    #[must_use]
    pub fn target_queue_size(&self) -> usize {
        self.target_queue_size
    }
}

impl InputStreamHandler for FixedSizeStreamHandler {
    fn channel_capacity(&self) -> usize {
        self.target_queue_size
    }

    fn poll_limit(&self) -> usize {
        self.trigger_queue_size
    }

    fn plan(&mut self, inputs: &mut [InputPortBuffer]) -> FiringPlan {
        if inputs.is_empty() || inputs.iter().all(InputPortBuffer::is_exhausted) {
            return FiringPlan::Exhausted;
        }
        let ready = inputs
            .iter()
            .all(|input| input.is_closed() || input.len() >= self.trigger_queue_size);
        if !ready {
            return FiringPlan::Wait;
        }

        // With fixed_min_size every live stream drains the same count.
        let common_take = if self.fixed_min_size {
            inputs
                .iter()
                .filter(|input| !input.is_exhausted())
                .map(|input| input.len().min(self.target_queue_size))
                .min()
                .unwrap_or(0)
        } else {
            0
        };

        let mut windows = Vec::with_capacity(inputs.len());
        let mut max_timestamp = Timestamp::UNSET;
        for input in inputs.iter_mut() {
            let take = if self.fixed_min_size {
                common_take.min(input.len())
            } else {
                input.len().min(self.target_queue_size)
            };
            let mut window = Vec::with_capacity(take);
            for _ in 0..take {
                if let Some(packet) = input.pop() {
                    max_timestamp = max_timestamp.max(packet.timestamp());
                    window.push(packet);
                }
            }
            windows.push((input.key().clone(), window));
        }

        // The firing timestamp is the window's upper bound, kept strictly
        // increasing across firings even when a high-timestamped stream has
        // already closed.
        let timestamp = if max_timestamp > self.last_fired {
            max_timestamp
        } else {
            self.last_fired.successor()
        };
        self.last_fired = timestamp;
        FiringPlan::Fire(FiringSet { timestamp, windows })
    }
}

/// Builds the handler a node config asks for.
///
/// # Errors
///
/// Returns [`GraphError::Wiring`] for an unknown handler name or for
/// fixed-size options given without the fixed-size handler.
pub(crate) fn handler_for_node(
    config: &NodeConfig,
) -> Result<Box<dyn InputStreamHandler>, GraphError> {
    match config.input_stream_handler.as_deref() {
        None | Some(DEFAULT_HANDLER_NAME) => {
            if config.trigger_queue_size.is_some()
                || config.target_queue_size.is_some()
                || config.fixed_min_size.is_some()
            {
                return Err(GraphError::wiring(format!(
                    "queue size options on calculator '{}' require input_stream_handler \"{}\"",
                    config.calculator, FIXED_SIZE_HANDLER_NAME
                )));
            }
            Ok(Box::new(DefaultStreamHandler::new()))
        }
        Some(FIXED_SIZE_HANDLER_NAME) => {
            let (trigger, target) = match (config.trigger_queue_size, config.target_queue_size) {
                (None, None) => (1, 1),
                (Some(trigger), None) => (trigger, trigger),
                (None, Some(target)) => (target, target),
                (Some(trigger), Some(target)) => (trigger, target),
            };
            Ok(Box::new(FixedSizeStreamHandler::new(
                trigger,
                target,
                config.fixed_min_size.unwrap_or(false),
            )))
        }
        Some(other) => Err(GraphError::wiring(format!(
            "unknown input stream handler '{}'",
            other
        ))),
    }
}
