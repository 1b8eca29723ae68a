//! Relays packets from each input port to the same-keyed output port.

use crate::calculator::{Calculator, CalculatorContext, CalculatorContract, ProcessOutcome};
use crate::error::GraphError;
use crate::packet::Packet;
use crate::port::{PacketType, PortKey};
use async_trait::async_trait;

/// Forwards every input packet, unchanged, to the output port with the same
/// key. Useful for renaming streams and for fan-out points.
#[derive(Debug, Default)]
pub struct PassThroughCalculator;

impl PassThroughCalculator {
    /// Creates a pass-through calculator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Calculator for PassThroughCalculator {
    fn contract(&self, contract: &mut CalculatorContract) -> Result<(), GraphError> {
        let inputs = contract.input_keys();
        let outputs = contract.output_keys();
        if inputs.len() != outputs.len()
            || inputs.iter().any(|key| !outputs.contains(key))
        {
            return Err(GraphError::contract(
                contract.node_name(),
                "input and output ports must pair up by key",
            ));
        }
        contract.set_all_input_types(PacketType::any());
        contract.set_all_output_types(PacketType::any());
        Ok(())
    }

    async fn process(
        &mut self,
        cx: &mut CalculatorContext<'_>,
    ) -> Result<ProcessOutcome, GraphError> {
        let mut relayed: Vec<(PortKey, Packet)> = Vec::new();
        for key in cx.output_keys() {
            for packet in cx.input(&key) {
                relayed.push((key.clone(), packet.clone()));
            }
        }
        for (key, packet) in relayed {
            cx.emit(&key, packet)?;
        }
        Ok(ProcessOutcome::Continue)
    }
}
