//! Graph assembly and the run lifecycle.
//!
//! [`CalculatorGraph`] turns a [`GraphConfig`] plus a
//! [`CalculatorRegistry`] into a running network of node tasks:
//!
//! 1. [`initialize`](CalculatorGraph::initialize): instantiate calculators,
//!    collect and validate their contracts, resolve stream names to edges,
//!    check payload types structurally, and reject cycles. All wiring errors
//!    surface here, before anything runs.
//! 2. [`add_output_stream_poller`](CalculatorGraph::add_output_stream_poller)
//!    attaches pull cursors to declared graph outputs.
//! 3. [`start_run`](CalculatorGraph::start_run): bind side packets and
//!    spawn one task per node.
//! 4. Feed packets with [`add_packet`](CalculatorGraph::add_packet), close
//!    the boundary with
//!    [`close_all_input_streams`](CalculatorGraph::close_all_input_streams),
//!    and join the run with
//!    [`wait_until_done`](CalculatorGraph::wait_until_done).
//!
//! Closure propagates transitively: once every input of a node is closed and
//! drained it fires its remaining windows, its own outputs close, and so on
//! until the graph terminates.

use crate::calculator::{Calculator, CalculatorContract};
use crate::config::{GraphConfig, SidePacketBinding};
use crate::error::GraphError;
use crate::handler::{InputStreamHandler, handler_for_node};
use crate::packet::Packet;
use crate::port::{PacketType, PortKey};
use crate::registry::CalculatorRegistry;
use crate::scheduler::{ExternalInputs, NodeRunner, Scheduler};
use crate::side_packet::SidePacketSet;
use crate::stream::{
    DEFAULT_CHANNEL_CAPACITY, InputPortBuffer, OutputChannel, OutputStreamPoller, OutputStreamSet,
};
use crate::timestamp::Timestamp;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Lifecycle of a graph.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GraphState {
    /// Created, not yet initialized.
    Idle,
    /// Topology validated and wired; not yet running.
    Built,
    /// Node tasks are live and the boundary accepts packets.
    Running,
    /// Node tasks are live but every boundary stream has closed.
    Draining,
    /// The run has terminated; terminal.
    Done,
}

/// Where a named stream originates.
enum StreamSource {
    /// Fed from outside the graph.
    External,
    /// Produced by a node's output port.
    Node { seed: usize, key: PortKey },
}

/// A node wired and validated but not yet spawned.
struct NodeSeed {
    name: String,
    calculator: Box<dyn Calculator>,
    contract: CalculatorContract,
    handler: Box<dyn InputStreamHandler>,
    inputs: Vec<(InputPortBuffer, mpsc::Receiver<Packet>)>,
    outputs: OutputStreamSet,
    side_bindings: Vec<SidePacketBinding>,
}

/// A dataflow graph of calculator nodes connected by named streams.
///
/// The handle is `Send + Sync`: once running it can sit behind an `Arc` and
/// take [`add_packet`](CalculatorGraph::add_packet) calls from any number of
/// concurrent producer tasks.
pub struct CalculatorGraph {
    state: Mutex<GraphState>,
    scheduler: Option<Scheduler>,
    inputs: Option<Arc<ExternalInputs>>,
    // Seeds hold `Box<dyn Calculator>`, which is only `Send`; the mutex keeps
    // the whole handle `Sync`.
    staged: Mutex<Vec<NodeSeed>>,
    stream_index: HashMap<String, StreamSource>,
    output_streams: Vec<String>,
}

impl Default for CalculatorGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculatorGraph {
    /// Creates an empty, uninitialized graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GraphState::Idle),
            scheduler: None,
            inputs: None,
            staged: Mutex::new(Vec::new()),
            stream_index: HashMap::new(),
            output_streams: Vec::new(),
        }
    }

    /// The graph's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GraphState {
        let state = *self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state == GraphState::Running
            && let Some(inputs) = &self.inputs
            && !inputs.any_open()
        {
            return GraphState::Draining;
        }
        state
    }

    fn set_state(&self, state: GraphState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Builds and validates the graph topology.
    ///
    /// # Errors
    ///
    /// - [`GraphError::AlreadyInitialized`] on a second call.
    /// - [`GraphError::Wiring`] for unknown calculators, duplicate stream
    ///   producers, streams with no producer, payload type conflicts, missing
    ///   graph outputs, or cycles.
    /// - [`GraphError::Contract`] when a calculator rejects its configuration
    ///   or leaves ports untyped.
    pub fn initialize(
        &mut self,
        config: GraphConfig,
        registry: &CalculatorRegistry,
    ) -> Result<(), GraphError> {
        if self.state() != GraphState::Idle {
            return Err(GraphError::AlreadyInitialized);
        }

        // Instantiate calculators and collect contracts.
        let mut names: Vec<String> = Vec::with_capacity(config.nodes.len());
        let mut parts: Vec<(Box<dyn Calculator>, CalculatorContract, Box<dyn InputStreamHandler>)> =
            Vec::with_capacity(config.nodes.len());
        for (index, node) in config.nodes.iter().enumerate() {
            let name = node
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_{}", node.calculator, index));
            if names.contains(&name) {
                return Err(GraphError::wiring(format!("duplicate node name '{}'", name)));
            }
            let calculator = registry.create(&node.calculator)?;
            let mut contract = CalculatorContract::new(
                &name,
                node.input_streams.iter().map(|b| b.key.clone()).collect(),
                node.output_streams.iter().map(|b| b.key.clone()).collect(),
                node.input_side_packets.iter().map(|b| b.tag.clone()).collect(),
            )?;
            calculator.contract(&mut contract)?;
            contract.validate()?;
            let handler = handler_for_node(node)?;
            names.push(name);
            parts.push((calculator, contract, handler));
        }

        // Resolve stream names: exactly one producer per stream.
        let mut stream_index: HashMap<String, StreamSource> = HashMap::new();
        for name in &config.input_streams {
            if stream_index.contains_key(name) {
                return Err(GraphError::wiring(format!(
                    "duplicate graph input stream '{}'",
                    name
                )));
            }
            stream_index.insert(name.clone(), StreamSource::External);
        }
        for (seed, node) in config.nodes.iter().enumerate() {
            for binding in &node.output_streams {
                if stream_index.contains_key(&binding.stream) {
                    return Err(GraphError::wiring(format!(
                        "stream '{}' has more than one producer",
                        binding.stream
                    )));
                }
                stream_index.insert(
                    binding.stream.clone(),
                    StreamSource::Node {
                        seed,
                        key: binding.key.clone(),
                    },
                );
            }
        }

        // Every consumed stream needs a producer; payload types must agree
        // structurally across each edge. Boundary streams adopt the type their
        // consumers demand.
        let mut external_types: HashMap<String, PacketType> = config
            .input_streams
            .iter()
            .map(|name| (name.clone(), PacketType::Any))
            .collect();
        for (consumer, node) in config.nodes.iter().enumerate() {
            for binding in &node.input_streams {
                let source = stream_index.get(&binding.stream).ok_or_else(|| {
                    GraphError::wiring(format!(
                        "node '{}' consumes stream '{}' which nothing produces",
                        names[consumer], binding.stream
                    ))
                })?;
                let consumer_type = parts[consumer]
                    .1
                    .inputs()
                    .get_type(&binding.key)
                    .unwrap_or(PacketType::Any);
                match source {
                    StreamSource::External => {
                        let resolved = external_types
                            .get_mut(&binding.stream)
                            .unwrap_or_else(|| {
                                unreachable!("external stream indexed without a type slot")
                            });
                        if !resolved.compatible_with(&consumer_type) {
                            return Err(GraphError::wiring(format!(
                                "graph input stream '{}' is consumed as both {} and {}",
                                binding.stream,
                                resolved.name(),
                                consumer_type.name()
                            )));
                        }
                        if matches!(resolved, PacketType::Any) {
                            *resolved = consumer_type;
                        }
                    }
                    StreamSource::Node { seed, key } => {
                        let producer_type = parts[*seed]
                            .1
                            .outputs()
                            .get_type(key)
                            .unwrap_or(PacketType::Any);
                        if !producer_type.compatible_with(&consumer_type) {
                            return Err(GraphError::wiring(format!(
                                "stream '{}' carries {} from node '{}' but node '{}' expects {}",
                                binding.stream,
                                producer_type.name(),
                                names[*seed],
                                names[consumer],
                                consumer_type.name()
                            )));
                        }
                    }
                }
            }
        }

        // Declared graph outputs must exist.
        for name in &config.output_streams {
            if !stream_index.contains_key(name) {
                return Err(GraphError::wiring(format!(
                    "graph output stream '{}' is produced by no node",
                    name
                )));
            }
        }

        check_acyclic(&config, &names, &stream_index)?;

        // Wire the channels: one sending half per stream, one bounded cursor
        // per consuming port, sized by the consumer's readiness policy.
        let mut channels: HashMap<String, OutputChannel> = stream_index
            .keys()
            .map(|name| (name.clone(), OutputChannel::new(name.clone())))
            .collect();
        let mut node_inputs: Vec<Vec<(InputPortBuffer, mpsc::Receiver<Packet>)>> =
            (0..config.nodes.len()).map(|_| Vec::new()).collect();
        for (consumer, node) in config.nodes.iter().enumerate() {
            let capacity = parts[consumer].2.channel_capacity();
            for binding in &node.input_streams {
                let channel = channels
                    .get_mut(&binding.stream)
                    .unwrap_or_else(|| {
                        unreachable!("consumed stream '{}' has no channel", binding.stream)
                    });
                let receiver = channel.subscribe(capacity);
                node_inputs[consumer].push((
                    InputPortBuffer::new(binding.key.clone(), binding.stream.clone()),
                    receiver,
                ));
            }
        }

        // Hand each producing node its channels, and the boundary the rest.
        let mut seeds: Vec<NodeSeed> = Vec::with_capacity(config.nodes.len());
        for ((node, (calculator, contract, handler)), inputs) in
            config.nodes.iter().zip(parts).zip(node_inputs)
        {
            let mut outputs = OutputStreamSet::new();
            for binding in &node.output_streams {
                let channel = channels
                    .remove(&binding.stream)
                    .unwrap_or_else(|| {
                        unreachable!("produced stream '{}' has no channel", binding.stream)
                    });
                let packet_type = contract
                    .outputs()
                    .get_type(&binding.key)
                    .unwrap_or(PacketType::Any);
                outputs.add_port(binding.key.clone(), packet_type, channel);
            }
            seeds.push(NodeSeed {
                name: names[seeds.len()].clone(),
                calculator,
                contract,
                handler,
                inputs,
                outputs,
                side_bindings: node.input_side_packets.clone(),
            });
        }
        let external: HashMap<String, (OutputChannel, PacketType)> = config
            .input_streams
            .iter()
            .map(|name| {
                let channel = channels
                    .remove(name)
                    .unwrap_or_else(|| {
                        unreachable!("graph input stream '{}' has no channel", name)
                    });
                let packet_type = external_types.remove(name).unwrap_or(PacketType::Any);
                (name.clone(), (channel, packet_type))
            })
            .collect();

        let inputs = Arc::new(ExternalInputs::new(external));
        self.scheduler = Some(Scheduler::new(Arc::clone(&inputs)));
        self.inputs = Some(inputs);
        self.staged = Mutex::new(seeds);
        self.stream_index = stream_index;
        self.output_streams = config.output_streams;
        self.set_state(GraphState::Built);
        debug!(nodes = names.len(), "graph initialized");
        Ok(())
    }

    /// Attaches a pull cursor to a declared graph output stream. Must happen
    /// after [`initialize`](CalculatorGraph::initialize) and before
    /// [`start_run`](CalculatorGraph::start_run).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Wiring`] if the graph is not in the built state
    /// or the stream is not a declared graph output.
    pub fn add_output_stream_poller(
        &mut self,
        name: &str,
    ) -> Result<OutputStreamPoller, GraphError> {
        if self.state() != GraphState::Built {
            return Err(GraphError::wiring(
                "pollers attach after initialize and before start_run",
            ));
        }
        if !self.output_streams.iter().any(|stream| stream == name) {
            return Err(GraphError::wiring(format!(
                "stream '{}' is not a declared graph output",
                name
            )));
        }
        let receiver = match self.stream_index.get(name) {
            Some(StreamSource::Node { seed, key }) => {
                let key = key.clone();
                let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
                staged[*seed]
                    .outputs
                    .subscribe(&key, DEFAULT_CHANNEL_CAPACITY)
                    .ok_or_else(|| {
                        GraphError::wiring(format!("stream '{}' lost its producer port", name))
                    })?
            }
            Some(StreamSource::External) => match &self.inputs {
                Some(inputs) => inputs.subscribe(name, DEFAULT_CHANNEL_CAPACITY)?,
                None => return Err(GraphError::wiring("graph has no boundary channels")),
            },
            None => {
                return Err(GraphError::wiring(format!("unknown stream '{}'", name)));
            }
        };
        Ok(OutputStreamPoller::new(name, receiver))
    }

    /// Binds side packets and spawns one task per node.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Wiring`] if the graph is not in the built state.
    /// - [`GraphError::Contract`] if a required side packet is missing or has
    ///   the wrong payload type.
    pub fn start_run(&mut self, side_packets: SidePacketSet) -> Result<(), GraphError> {
        if self.state() != GraphState::Built {
            return Err(GraphError::wiring("graph must be initialized before starting"));
        }
        let scheduler = self
            .scheduler
            .as_ref()
            .ok_or_else(|| GraphError::wiring("graph has no scheduler"))?;

        let seeds = std::mem::take(
            &mut *self.staged.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut runners = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let node_side_packets = bind_side_packets(&seed, &side_packets)?;
            runners.push(NodeRunner::new(
                seed.name,
                seed.calculator,
                seed.handler,
                seed.inputs,
                seed.outputs,
                node_side_packets,
                scheduler.shared(),
            ));
        }
        for runner in runners {
            scheduler.spawn(runner);
        }
        self.set_state(GraphState::Running);
        info!("graph run started");
        Ok(())
    }

    /// Feeds one packet into a graph input stream, waiting for downstream
    /// capacity.
    ///
    /// # Errors
    ///
    /// - [`GraphError::Wiring`] if the graph is not running or the stream is
    ///   not a graph input.
    /// - [`GraphError::TypeMismatch`] if the payload does not match what the
    ///   consuming ports expect.
    /// - [`GraphError::OrderingViolation`] if the timestamp does not strictly
    ///   increase.
    /// - [`GraphError::ClosedStream`] after the stream (or the run) has
    ///   closed.
    pub async fn add_packet(&self, name: &str, packet: Packet) -> Result<(), GraphError> {
        match self.state() {
            GraphState::Running | GraphState::Draining => {}
            GraphState::Done => return Err(GraphError::ClosedStream(name.to_string())),
            _ => return Err(GraphError::wiring("graph is not running")),
        }
        match &self.inputs {
            Some(inputs) => inputs.add_packet(name, packet).await,
            None => Err(GraphError::wiring("graph has no boundary channels")),
        }
    }

    /// Convenience for feeding a plain value at `timestamp`.
    ///
    /// # Errors
    ///
    /// Same as [`add_packet`](CalculatorGraph::add_packet).
    pub async fn add_packet_value<T: Send + Sync + 'static>(
        &self,
        name: &str,
        value: T,
        timestamp: Timestamp,
    ) -> Result<(), GraphError> {
        self.add_packet(name, Packet::new(value, timestamp)).await
    }

    /// Closes one graph input stream. Idempotent; terminal for the stream.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Wiring`] if the graph is not running or the
    /// stream is not a graph input.
    pub async fn close_input_stream(&self, name: &str) -> Result<(), GraphError> {
        match self.state() {
            GraphState::Running | GraphState::Draining | GraphState::Done => {}
            _ => return Err(GraphError::wiring("graph is not running")),
        }
        match &self.inputs {
            Some(inputs) => inputs.close(name).await,
            None => Err(GraphError::wiring("graph has no boundary channels")),
        }
    }

    /// Closes every graph input stream, letting the graph drain to
    /// completion.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Wiring`] if the graph is not running.
    pub async fn close_all_input_streams(&self) -> Result<(), GraphError> {
        match self.state() {
            GraphState::Running | GraphState::Draining | GraphState::Done => {}
            _ => return Err(GraphError::wiring("graph is not running")),
        }
        match &self.inputs {
            Some(inputs) => {
                inputs.close_all().await;
                Ok(())
            }
            None => Err(GraphError::wiring("graph has no boundary channels")),
        }
    }

    /// Joins every node task and reports the run's outcome. A cooperative
    /// stop counts as success; otherwise the first node error is returned.
    ///
    /// # Errors
    ///
    /// The first [`GraphError`] any node task produced.
    pub async fn wait_until_done(&self) -> Result<(), GraphError> {
        // A Done graph still consults the scheduler so every waiter, however
        // late, sees the run's recorded outcome.
        match self.state() {
            GraphState::Running | GraphState::Draining | GraphState::Done => {}
            _ => return Err(GraphError::wiring("graph is not running")),
        }
        let scheduler = self
            .scheduler
            .as_ref()
            .ok_or_else(|| GraphError::wiring("graph has no scheduler"))?;
        let result = scheduler.wait().await;
        self.set_state(GraphState::Done);
        debug!(ok = result.is_ok(), "graph run finished");
        result
    }
}

/// Builds the per-node side packet view from the run-level set.
fn bind_side_packets(
    seed: &NodeSeed,
    side_packets: &SidePacketSet,
) -> Result<SidePacketSet, GraphError> {
    let mut bound = SidePacketSet::new();
    for binding in &seed.side_bindings {
        let required = seed.contract.side_packet_type(&binding.tag);
        match side_packets.get(&binding.name) {
            Some(packet) => {
                if let Some(packet_type) = required
                    && !packet_type.accepts(packet)
                {
                    return Err(GraphError::contract(
                        &seed.name,
                        format!(
                            "side packet '{}' has payload {} but slot '{}' expects {}",
                            binding.name,
                            packet.type_name(),
                            binding.tag,
                            packet_type.name()
                        ),
                    ));
                }
                bound.bind(&binding.tag, packet.clone())?;
            }
            None if required.is_some() => {
                return Err(GraphError::contract(
                    &seed.name,
                    format!("required side packet '{}' was not provided", binding.name),
                ));
            }
            None => {}
        }
    }
    Ok(bound)
}

/// Kahn's algorithm over the node-to-node edges. Boundary streams do not
/// form edges, so only internal cycles are rejected.
fn check_acyclic(
    config: &GraphConfig,
    names: &[String],
    stream_index: &HashMap<String, StreamSource>,
) -> Result<(), GraphError> {
    let node_count = config.nodes.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    let mut in_degree: Vec<usize> = vec![0; node_count];
    for (consumer, node) in config.nodes.iter().enumerate() {
        for binding in &node.input_streams {
            if let Some(StreamSource::Node { seed, .. }) = stream_index.get(&binding.stream) {
                adjacency[*seed].push(consumer);
                in_degree[consumer] += 1;
            }
        }
    }
    let mut queue: Vec<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0;
    while let Some(node) = queue.pop() {
        visited += 1;
        for &next in &adjacency[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push(next);
            }
        }
    }
    if visited < node_count {
        let stuck = (0..node_count)
            .find(|&i| in_degree[i] > 0)
            .map_or_else(|| "unknown".to_string(), |i| names[i].clone());
        return Err(GraphError::wiring(format!(
            "graph contains a cycle involving node '{}'",
            stuck
        )));
    }
    Ok(())
}
