//! The calculator trait and its build-time/run-time companions.
//!
//! A calculator is a unit of computation with three lifecycle hooks:
//!
//! 1. [`contract`](Calculator::contract) runs at build time. The contract arrives
//!    pre-populated with the port keys and side packet slots from the node's
//!    config bindings; the hook assigns a payload type to every port (or
//!    rejects the shape). Every port must be typed or graph initialization
//!    fails.
//! 2. [`open`](Calculator::open) runs exactly once per run, before any firing.
//!    Side packets are visible; the hook may emit initial packets.
//! 3. [`process`](Calculator::process) runs once per firing, with the packet
//!    windows the node's input stream handler bound. Never invoked
//!    concurrently with itself, so private state needs no locking.
//!
//! Timestamp propagation is the calculator's responsibility: emitting at
//! [`input_timestamp`](CalculatorContext::input_timestamp) passes the input
//! timestamp through unchanged.

use crate::error::GraphError;
use crate::handler::FiringSet;
use crate::packet::Packet;
use crate::port::{PacketType, PortDirection, PortKey, PortTable};
use crate::side_packet::SidePacketSet;
use crate::stream::OutputStreamSet;
use crate::timestamp::Timestamp;
use async_trait::async_trait;

/// What a firing asks the scheduler to do next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessOutcome {
    /// Keep running; await the next readiness signal.
    Continue,
    /// Request graph-wide termination: external inputs are closed and the
    /// graph drains to completion. Cooperative, not a failure.
    Stop,
}

/// A unit of computation owning a declared port contract and private state.
///
/// Implementations are driven by the graph scheduler; a single calculator's
/// hooks never run concurrently with each other.
#[async_trait]
pub trait Calculator: Send {
    /// Declares payload types for the ports and side packet slots the node's
    /// config bindings created, and rejects unsupported shapes.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Contract`] to refuse the configuration; this
    /// fails the whole graph build.
    fn contract(&self, contract: &mut CalculatorContract) -> Result<(), GraphError>;

    /// One-time setup before the first firing. Side packets are bound; the
    /// hook may emit packets with no timestamp dependency.
    ///
    /// # Errors
    ///
    /// Any error fails the graph run.
    async fn open(&mut self, cx: &mut CalculatorContext<'_>) -> Result<(), GraphError> {
        let _ = cx;
        Ok(())
    }

    /// One firing: consume the bound windows, optionally emit outputs.
    ///
    /// # Errors
    ///
    /// Any error fails the graph run.
    async fn process(
        &mut self,
        cx: &mut CalculatorContext<'_>,
    ) -> Result<ProcessOutcome, GraphError> ;
}

/// A node's declared port contract, fixed for the node's lifetime once
/// validated.
#[derive(Debug)]
pub struct CalculatorContract {
    node_name: String,
    inputs: PortTable,
    outputs: PortTable,
    side_packets: Vec<(String, Option<PacketType>)>,
}

impl CalculatorContract {
    /// Builds a contract pre-populated with the port keys and side packet
    /// slots from a node's config bindings.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Contract`] on duplicate keys, duplicate side
    /// packet slots, or a tag group whose indices are not contiguous from 0.
    pub(crate) fn new(
        node_name: impl Into<String>,
        input_keys: Vec<PortKey>,
        output_keys: Vec<PortKey>,
        side_packet_slots: Vec<String>,
    ) -> Result<Self, GraphError> {
        let node_name = node_name.into();
        let mut inputs = PortTable::new(PortDirection::Input);
        for key in input_keys {
            if !inputs.add_key(key.clone()) {
                return Err(GraphError::contract(
                    &node_name,
                    format!("duplicate input port {}", key),
                ));
            }
        }
        let mut outputs = PortTable::new(PortDirection::Output);
        for key in output_keys {
            if !outputs.add_key(key.clone()) {
                return Err(GraphError::contract(
                    &node_name,
                    format!("duplicate output port {}", key),
                ));
            }
        }
        let mut side_packets: Vec<(String, Option<PacketType>)> = Vec::new();
        for slot in side_packet_slots {
            if side_packets.iter().any(|(name, _)| name == &slot) {
                return Err(GraphError::contract(
                    &node_name,
                    format!("duplicate side packet slot '{}'", slot),
                ));
            }
            side_packets.push((slot, None));
        }
        let contract = Self {
            node_name,
            inputs,
            outputs,
            side_packets,
        };
        contract.check_contiguous(&contract.inputs)?;
        contract.check_contiguous(&contract.outputs)?;
        Ok(contract)
    }

    fn check_contiguous(&self, table: &PortTable) -> Result<(), GraphError> {
        let mut tags: Vec<&str> = table.keys().map(|key| key.tag.as_str()).collect();
        tags.sort_unstable();
        tags.dedup();
        for tag in tags {
            let group = table.tag_group(tag);
            for (expected, key) in group.iter().enumerate() {
                if key.index != expected {
                    return Err(GraphError::contract(
                        &self.node_name,
                        format!(
                            "{} tag group '{}' has non-contiguous indices (missing index {})",
                            table.direction(),
                            tag,
                            expected
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Name of the node this contract belongs to.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// The input port table.
    #[must_use]
    pub fn inputs(&self) -> &PortTable {
        &self.inputs
    }

    /// The output port table.
    #[must_use]
    pub fn outputs(&self) -> &PortTable {
        &self.outputs
    }

    /// Input port keys in declaration order (cloned for iteration while
    /// mutating the contract).
    #[must_use]
    pub fn input_keys(&self) -> Vec<PortKey> {
        self.inputs.keys().cloned().collect()
    }

    /// Output port keys in declaration order.
    #[must_use]
    pub fn output_keys(&self) -> Vec<PortKey> {
        self.outputs.keys().cloned().collect()
    }

    /// Assigns a payload type to one input port.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Contract`] if the config bindings declared no
    /// such port.
    pub fn set_input_type(
        &mut self,
        key: &PortKey,
        packet_type: PacketType,
    ) -> Result<(), GraphError> {
        if !self.inputs.set_type(key, packet_type) {
            return Err(GraphError::contract(
                &self.node_name,
                format!("no input port {} in the config bindings", key),
            ));
        }
        Ok(())
    }

    /// Assigns a payload type to one output port.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Contract`] if the config bindings declared no
    /// such port.
    pub fn set_output_type(
        &mut self,
        key: &PortKey,
        packet_type: PacketType,
    ) -> Result<(), GraphError> {
        if !self.outputs.set_type(key, packet_type) {
            return Err(GraphError::contract(
                &self.node_name,
                format!("no output port {} in the config bindings", key),
            ));
        }
        Ok(())
    }

    /// Assigns the same type to every input port.
    pub fn set_all_input_types(&mut self, packet_type: PacketType) {
        self.inputs.set_all_types(packet_type);
    }

    /// Assigns the same type to every output port.
    pub fn set_all_output_types(&mut self, packet_type: PacketType) {
        self.outputs.set_all_types(packet_type);
    }

    /// Side packet slot names from the config bindings.
    pub fn side_packet_slots(&self) -> impl Iterator<Item = &str> {
        self.side_packets.iter().map(|(name, _)| name.as_str())
    }

    /// Declared type of a side packet slot, if the contract hook typed it.
    #[must_use]
    pub fn side_packet_type(&self, slot: &str) -> Option<PacketType> {
        self
            .side_packets
            .iter()
            .find(|(name, _)| name == slot)
            .and_then(|(_, packet_type)| *packet_type)
    }

    /// Declares that the slot must be bound with the given type.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Contract`] if the config bindings declared no
    /// such slot: the calculator requires a side packet the topology never
    /// provides.
    pub fn require_side_packet(
        &mut self,
        slot: &str,
        packet_type: PacketType,
    ) -> Result<(), GraphError> {
        match self.side_packets.iter_mut().find(|(name, _)| name == slot) {
            Some((_, slot_type)) => {
                *slot_type = Some(packet_type);
                Ok(())
            }
            None => Err(GraphError::contract(
                &self.node_name,
                format!("required side packet '{}' is not bound in the config", slot),
            )),
        }
    }

    /// Final validation after the contract hook ran: every port must carry a
    /// type, and a tag group must be homogeneous.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Contract`] describing the first violation.
    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        for (table, direction) in [(&self.inputs, "input"), (&self.outputs, "output")] {
            if let Some(key) = table.untyped_keys().first() {
                return Err(GraphError::contract(
                    &self.node_name,
                    format!("{} port {} was left untyped by the contract", direction, key),
                ));
            }
            let mut tags: Vec<&str> = table.keys().map(|k| k.tag.as_str()).collect();
            tags.sort_unstable();
            tags.dedup();
            for tag in tags {
                let group = table.tag_group(tag);
                if group.len() < 2 {
                    continue;
                }
                let first = group.first().and_then(|key| table.get_type(key));
                for key in &group {
                    if table.get_type(key) != first {
                        return Err(GraphError::contract(
                            &self.node_name,
                            format!("{} tag group '{}' mixes payload types", direction, tag),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-hook view of a node's inputs, outputs, and side packets.
///
/// For `open` the firing set is empty and the timestamp is
/// [`Timestamp::UNSET`]; for `process` it carries the windows the input
/// stream handler bound.
pub struct CalculatorContext<'a> {
    node_name: &'a str,
    firing: &'a FiringSet,
    side_packets: &'a SidePacketSet,
    outputs: &'a mut OutputStreamSet,
}

impl<'a> CalculatorContext<'a> {
    pub(crate) fn new(
        node_name: &'a str,
        firing: &'a FiringSet,
        side_packets: &'a SidePacketSet,
        outputs: &'a mut OutputStreamSet,
    ) -> Self {
        Self {
            node_name,
            firing,
            side_packets,
            outputs,
        }
    }

    /// Name of the node being fired.
    #[must_use]
    pub fn node_name(&self) -> &str {
        self.node_name
    }

    /// The current processing timestamp.
    #[must_use]
    pub fn input_timestamp(&self) -> Timestamp {
        self.firing.timestamp
    }

    /// The full firing set bound by the input stream handler.
    #[must_use]
    pub fn inputs(&self) -> &FiringSet {
        self.firing
    }

    /// The window bound to one input port; empty when the port's stream is
    /// permanently absent from this firing.
    #[must_use]
    pub fn input(&self, key: &PortKey) -> &[Packet] {
        self.firing.window(key)
    }

    /// The single bound packet of one input port, under policies that bind at
    /// most one packet per firing.
    #[must_use]
    pub fn input_packet(&self, key: &PortKey) -> Option<&Packet> {
        self.firing.window(key).first()
    }

    /// Looks up a side packet declared by this node's contract.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Contract`] if the slot was never bound; the
    /// calculator is reading a side packet it did not declare.
    pub fn side_packet(&self, slot: &str) -> Result<&Packet, GraphError> {
        self.side_packets.get(slot).ok_or_else(|| {
            GraphError::contract(
                self.node_name,
                format!("side packet '{}' is not bound for this node", slot),
            )
        })
    }

    /// The node's output ports.
    #[must_use]
    pub fn outputs(&mut self) -> &mut OutputStreamSet {
        self.outputs
    }

    /// Output port keys in declaration order.
    #[must_use]
    pub fn output_keys(&self) -> Vec<PortKey> {
        self.outputs.keys().cloned().collect()
    }

    /// Emits a packet on the output port named by `key`.
    ///
    /// # Errors
    ///
    /// See [`OutputStreamSet::emit`].
    pub fn emit(&mut self, key: &PortKey, packet: Packet) -> Result<(), GraphError> {
        self.outputs.emit(key, packet)
    }

    /// Emits a plain value at `timestamp` on the output port named by `key`.
    ///
    /// # Errors
    ///
    /// See [`OutputStreamSet::emit`].
    pub fn emit_value<T: Send + Sync + 'static>(
        &mut self,
        key: &PortKey,
        value: T,
        timestamp: Timestamp,
    ) -> Result<(), GraphError> {
        self.outputs.emit_value(key, value, timestamp)
    }
}
