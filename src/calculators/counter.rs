//! Counts packets across firings.

use crate::calculator::{Calculator, CalculatorContext, CalculatorContract, ProcessOutcome};
use crate::error::GraphError;
use crate::port::PacketType;
use async_trait::async_trait;

/// Emits a running `u64` count of every packet seen so far, at each firing's
/// timestamp. Accepts any number of inputs of any payload type.
#[derive(Debug, Default)]
pub struct CounterCalculator {
    count: u64,
}

impl CounterCalculator {
    /// Creates a counter calculator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Calculator for CounterCalculator {
    fn contract(&self, contract: &mut CalculatorContract) -> Result<(), GraphError> {
        if contract.inputs().is_empty() {
            return Err(GraphError::contract(
                contract.node_name(),
                "at least one input port is required",
            ));
        }
        contract.set_all_input_types(PacketType::any());
        let outputs = contract.output_keys();
        let [output] = outputs.as_slice() else {
            return Err(GraphError::contract(
                contract.node_name(),
                "exactly one output port is required",
            ));
        };
        contract.set_output_type(output, PacketType::of::<u64>())?;
        Ok(())
    }

    async fn process(
        &mut self,
        cx: &mut CalculatorContext<'_>,
    ) -> Result<ProcessOutcome, GraphError> {
        self.count += cx.inputs().packet_count() as u64;
        let output = cx
            .output_keys()
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::contract(cx.node_name(), "output port vanished"))?;
        let count = self.count;
        let timestamp = cx.input_timestamp();
        cx.emit_value(&output, count, timestamp)?;
        Ok(ProcessOutcome::Continue)
    }
}
