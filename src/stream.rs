//! Stream transport: ordered packet delivery from output ports to input
//! ports.
//!
//! Streams are carried over bounded `tokio::sync::mpsc` channels. Channels
//! provide the backpressure and wakeups internally, but calculators never
//! see them; they only observe bound input windows and an emit interface.
//!
//! One [`OutputChannel`] is the sending half of a named stream: exactly one
//! producer, any number of consumer cursors (fan-out clones the packet's
//! `Arc` payload per cursor). The channel enforces the stream invariant at
//! the source: timestamps strictly increase, and a closed stream never
//! accepts another packet.
//!
//! On the consuming side, each input port owns an [`InputPortBuffer`]: the
//! packets received but not yet bound to a firing, plus the terminal closed
//! flag. Input stream handlers plan firings over these buffers.

use crate::error::GraphError;
use crate::packet::Packet;
use crate::port::{PacketType, PortKey};
use crate::timestamp::Timestamp;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::trace;

/// Channel capacity for consumers that do not request explicit backpressure
/// (the default input stream handler drains its channels eagerly, so this
/// bound is rarely reached).
pub(crate) const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sending half of a named stream: one producer, fan-out to every
/// subscribed consumer cursor.
#[derive(Debug)]
pub(crate) struct OutputChannel {
    name: String,
    senders: Vec<mpsc::Sender<Packet>>,
    last_timestamp: Timestamp,
    closed: bool,
}

impl OutputChannel {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            senders: Vec::new(),
            last_timestamp: Timestamp::UNSET,
            closed: false,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Registers a new consumer cursor and returns its receiving end.
    pub(crate) fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<Packet> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.senders.push(sender);
        receiver
    }

    /// Validates an emission at `timestamp` and advances the stream cursor.
    ///
    /// Split from [`send`](OutputChannel::send) so misuse is reported
    /// synchronously to the caller before any consumer observes the packet.
    pub(crate) fn check_emit(&mut self, timestamp: Timestamp) -> Result<(), GraphError> {
        if self.closed {
            return Err(GraphError::ClosedStream(self.name.clone()));
        }
        if !timestamp.is_stream_valid() || timestamp <= self.last_timestamp {
            return Err(GraphError::OrderingViolation {
                stream: self.name.clone(),
                timestamp,
                last: self.last_timestamp,
            });
        }
        self.last_timestamp = timestamp;
        Ok(())
    }

    /// Delivers a packet to every consumer cursor, waiting for capacity.
    ///
    /// A cursor whose receiving side is gone (its node already closed) is
    /// skipped; that is drainage, not an error.
    pub(crate) async fn send(&self, packet: Packet) {
        trace!(stream = %self.name, timestamp = %packet.timestamp(), "delivering packet");
        for sender in &self.senders {
            if sender.send(packet.clone()).await.is_err() {
                trace!(stream = %self.name, "consumer cursor gone, dropping delivery");
            }
        }
    }

    /// Marks the stream terminal and hangs up every consumer cursor.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.senders.clear();
    }
}

/// One output port of a node: its key, resolved type, and stream.
#[derive(Debug)]
struct OutputPort {
    key: PortKey,
    packet_type: PacketType,
    channel: OutputChannel,
}

/// The set of output ports owned by one node.
///
/// Emissions are validated (type and timestamp order) and buffered
/// synchronously; the node runner flushes them to consumers after the firing
/// returns, which is where producers block for downstream capacity.
#[derive(Debug)]
pub struct OutputStreamSet {
    ports: Vec<OutputPort>,
    pending: Vec<(usize, Packet)>,
}

impl OutputStreamSet {
    pub(crate) fn new() -> Self {
        Self {
            ports: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub(crate) fn add_port(
        &mut self,
        key: PortKey,
        packet_type: PacketType,
        channel: OutputChannel,
    ) {
        self.ports.push(OutputPort {
            key,
            packet_type,
            channel,
        });
    }

    /// Iterates over the output port keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &PortKey> {
        self.ports.iter().map(|port| &port.key)
    }

    /// Returns true if `key` names one of this node's output ports.
    #[must_use]
    pub fn contains(&self, key: &PortKey) -> bool {
        self.ports.iter().any(|port| &port.key == key)
    }

    /// Returns the stream name wired to an output port.
    #[must_use]
    pub fn stream_name(&self, key: &PortKey) -> Option<&str> {
        self
            .ports
            .iter()
            .find(|port| &port.key == key)
            .map(|port| port.channel.name())
    }

    /// Queues a packet for emission on the port named by `key`.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Wiring`] if `key` is not one of the node's output ports.
    /// - [`GraphError::TypeMismatch`] if the payload does not satisfy the
    ///   port's resolved type.
    /// - [`GraphError::OrderingViolation`] if the timestamp is not strictly
    ///   greater than the last one emitted on this port.
    /// - [`GraphError::ClosedStream`] if the port's stream has been closed.
    pub fn emit(&mut self, key: &PortKey, packet: Packet) -> Result<(), GraphError> {
        let index = self
            .ports
            .iter()
            .position(|port| &port.key == key)
            .ok_or_else(|| GraphError::wiring(format!("node has no output port {}", key)))?;
        let port = &mut self.ports[index];
        if !port.packet_type.accepts(&packet) {
            return Err(GraphError::TypeMismatch {
                expected: port.packet_type.name().to_string(),
                actual: packet.type_name().to_string(),
            });
        }
        port.channel.check_emit(packet.timestamp())?;
        self.pending.push((index, packet));
        Ok(())
    }

    /// Convenience for emitting a plain value at `timestamp`.
    ///
    /// # Errors
    ///
    /// Same as [`emit`](OutputStreamSet::emit).
    pub fn emit_value<T: Send + Sync + 'static>(
        &mut self,
        key: &PortKey,
        value: T,
        timestamp: Timestamp,
    ) -> Result<(), GraphError> {
        self.emit(key, Packet::new(value, timestamp))
    }

    /// Closes one output port's stream. Terminal: any later emission on it
    /// fails with [`GraphError::ClosedStream`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Wiring`] if `key` is not one of the node's
    /// output ports.
    pub fn close(&mut self, key: &PortKey) -> Result<(), GraphError> {
        let port = self
            .ports
            .iter_mut()
            .find(|port| &port.key == key)
            .ok_or_else(|| GraphError::wiring(format!("node has no output port {}", key)))?;
        port.channel.close();
        Ok(())
    }

    /// Delivers all queued emissions, in order, waiting for downstream
    /// capacity. This is the producer-side suspension point.
    pub(crate) async fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for (index, packet) in pending {
            self.ports[index].channel.send(packet).await;
        }
    }

    /// Subscribes an extra cursor (a poller) to the port named by `key`.
    pub(crate) fn subscribe(
        &mut self,
        key: &PortKey,
        capacity: usize,
    ) -> Option<mpsc::Receiver<Packet>> {
        self
            .ports
            .iter_mut()
            .find(|port| &port.key == key)
            .map(|port| port.channel.subscribe(capacity))
    }
}

/// Buffered state of one input port: packets received but not yet bound to
/// a firing, plus the terminal closed flag.
///
/// Input stream handlers plan firings over slices of these buffers.
#[derive(Debug)]
pub struct InputPortBuffer {
    key: PortKey,
    stream_name: String,
    buffer: VecDeque<Packet>,
    closed: bool,
    last_timestamp: Timestamp,
}

impl InputPortBuffer {
    pub(crate) fn new(key: PortKey, stream_name: impl Into<String>) -> Self {
        Self {
            key,
            stream_name: stream_name.into(),
            buffer: VecDeque::new(),
            closed: false,
            last_timestamp: Timestamp::UNSET,
        }
    }

    /// The port this buffer belongs to.
    #[must_use]
    pub fn key(&self) -> &PortKey {
        &self.key
    }

    /// Name of the stream feeding this port.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Number of buffered packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no packets are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns true once the feeding stream has closed. Terminal.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and fully drained: this port will never deliver again.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.closed && self.buffer.is_empty()
    }

    /// Timestamp of the oldest buffered packet, if any.
    #[must_use]
    pub fn head_timestamp(&self) -> Option<Timestamp> {
        self.buffer.front().map(Packet::timestamp)
    }

    /// Removes and returns the oldest buffered packet.
    pub fn pop(&mut self) -> Option<Packet> {
        self.buffer.pop_front()
    }

    /// Appends a received packet, enforcing the per-cursor monotonicity
    /// invariant.
    pub(crate) fn push(&mut self, packet: Packet) -> Result<(), GraphError> {
        let timestamp = packet.timestamp();
        if timestamp <= self.last_timestamp {
            return Err(GraphError::OrderingViolation {
                stream: self.stream_name.clone(),
                timestamp,
                last: self.last_timestamp,
            });
        }
        self.last_timestamp = timestamp;
        self.buffer.push_back(packet);
        Ok(())
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}

/// Blocking pull cursor over a named stream.
///
/// `next` suspends until a packet arrives and returns `None` once the
/// stream is closed and drained, the `(Packet, ok)` polling contract.
#[derive(Debug)]
pub struct OutputStreamPoller {
    stream_name: String,
    receiver: mpsc::Receiver<Packet>,
}

impl OutputStreamPoller {
    pub(crate) fn new(stream_name: impl Into<String>, receiver: mpsc::Receiver<Packet>) -> Self {
        Self {
            stream_name: stream_name.into(),
            receiver,
        }
    }

    /// Name of the polled stream.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Waits for the next packet; `None` means closed and drained.
    pub async fn next(&mut self) -> Option<Packet> {
        self.receiver.recv().await
    }

    /// Converts the poller into an async [`Stream`](tokio_stream::Stream) of
    /// packets.
    #[must_use]
    pub fn into_stream(self) -> tokio_stream::wrappers::ReceiverStream<Packet> {
        tokio_stream::wrappers::ReceiverStream::new(self.receiver)
    }
}
