//! # PacketFlow
//!
//! A minimal async dataflow engine: timestamped packets flowing through a
//! graph of calculator nodes.
//!
//! A graph is declared as plain configuration (nodes, named streams, side
//! packets) and executed on Tokio with one task per node. Streams carry
//! strictly increasing timestamps; per-node readiness policies decide when a
//! node has enough buffered input to fire; bounded channels give producers
//! real backpressure without calculators ever seeing a channel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use packetflow::{CalculatorGraph, CalculatorRegistry, GraphConfig, SidePacketSet, Timestamp};
//!
//! # async fn run() -> Result<(), packetflow::GraphError> {
//! let config: GraphConfig = r#"
//!   input_stream: "value"
//!   output_stream: "relayed"
//!   node {
//!     calculator: "PassThroughCalculator"
//!     input_stream: "value"
//!     output_stream: "relayed"
//!   }
//! "#
//! .parse()?;
//!
//! let registry = CalculatorRegistry::with_builtin();
//! let mut graph = CalculatorGraph::new();
//! graph.initialize(config, &registry)?;
//! let mut poller = graph.add_output_stream_poller("relayed")?;
//! graph.start_run(SidePacketSet::new())?;
//!
//! graph.add_packet_value("value", 42i64, Timestamp::new(0)).await?;
//! graph.close_all_input_streams().await?;
//! while let Some(packet) = poller.next().await {
//!   println!("{} -> {}", packet.timestamp(), packet.get::<i64>()?);
//! }
//! graph.wait_until_done().await
//! # }
//! ```

// Documentation enforcement - treat missing docs as errors
#![deny(missing_docs)]

/// The calculator trait, its contract, and the per-firing context.
pub mod calculator;
/// Built-in calculators.
pub mod calculators;
/// Declarative graph configuration and its text format.
pub mod config;
/// The error taxonomy of graph building and execution.
pub mod error;
/// Graph assembly and the run lifecycle.
pub mod graph;
/// Readiness policies for multi-input nodes.
pub mod handler;
/// The packet: an immutable, timestamped, dynamically typed value.
pub mod packet;
/// Port identity and payload typing.
pub mod port;
/// Calculator name resolution.
pub mod registry;
/// Run-scoped constant side packets.
pub mod side_packet;
/// Stream transport, input buffers, and output pollers.
pub mod stream;
/// Logical timestamps for stream ordering.
pub mod timestamp;

mod scheduler;

pub use calculator::{Calculator, CalculatorContext, CalculatorContract, ProcessOutcome};
pub use calculators::{CounterCalculator, PassThroughCalculator, RateCalculator};
pub use config::{GraphConfig, NodeConfig, SidePacketBinding, StreamBinding};
pub use error::GraphError;
pub use graph::{CalculatorGraph, GraphState};
pub use handler::{
    DefaultStreamHandler, FiringPlan, FiringSet, FixedSizeStreamHandler, InputStreamHandler,
};
pub use packet::Packet;
pub use port::{PacketType, PortDirection, PortKey, PortTable};
pub use registry::CalculatorRegistry;
pub use side_packet::SidePacketSet;
pub use stream::{InputPortBuffer, OutputStreamPoller, OutputStreamSet};
pub use timestamp::Timestamp;

#[cfg(test)]
mod calculator_test;
#[cfg(test)]
mod handler_test;
#[cfg(test)]
mod packet_test;
#[cfg(test)]
mod port_test;
#[cfg(test)]
mod stream_test;
#[cfg(test)]
mod timestamp_test;
