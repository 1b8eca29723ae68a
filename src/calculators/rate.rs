//! Computes a rate from pairs of tick counters.

use crate::calculator::{Calculator, CalculatorContext, CalculatorContract, ProcessOutcome};
use crate::error::GraphError;
use crate::port::{PacketType, PortKey};
use async_trait::async_trait;
use tracing::warn;

/// Slot tag of the frequency side packet.
pub const FREQUENCY_TAG: &str = "FREQUENCY";

/// Turns two synchronized tick counters into a rate.
///
/// Consumes `TICK:0` (interval start) and `TICK:1` (interval end), both
/// `i64` counter values, and a required `FREQUENCY` side packet (`f64`, the
/// counter's ticks per unit). Emits `frequency / (t1 - t0)` as `f64` on its
/// single output. A firing where either tick is absent, or where the
/// interval is not positive, emits nothing.
#[derive(Debug, Default)]
pub struct RateCalculator {
    frequency: f64,
}

impl RateCalculator {
    /// Creates a rate calculator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Calculator for RateCalculator {
    fn contract(&self, contract: &mut CalculatorContract) -> Result<(), GraphError> {
        let expected = [PortKey::new("TICK", 0), PortKey::new("TICK", 1)];
        let inputs = contract.input_keys();
        if inputs != expected {
            return Err(GraphError::contract(
                contract.node_name(),
                "exactly the input ports TICK:0 and TICK:1 are required",
            ));
        }
        for key in &expected {
            contract.set_input_type(key, PacketType::of::<i64>())?;
        }
        let outputs = contract.output_keys();
        let [output] = outputs.as_slice() else {
            return Err(GraphError::contract(
                contract.node_name(),
                "exactly one output port is required",
            ));
        };
        contract.set_output_type(output, PacketType::of::<f64>())?;
        contract.require_side_packet(FREQUENCY_TAG, PacketType::of::<f64>())?;
        Ok(())
    }

    async fn open(&mut self, cx: &mut CalculatorContext<'_>) -> Result<(), GraphError> {
        self.frequency = *cx.side_packet(FREQUENCY_TAG)?.get::<f64>()?;
        Ok(())
    }

    async fn process(
        &mut self,
        cx: &mut CalculatorContext<'_>,
    ) -> Result<ProcessOutcome, GraphError> {
        let start = cx.input_packet(&PortKey::new("TICK", 0));
        let end = cx.input_packet(&PortKey::new("TICK", 1));
        let (Some(start), Some(end)) = (start, end) else {
            return Ok(ProcessOutcome::Continue);
        };
        let start = *start.get::<i64>()?;
        let end = *end.get::<i64>()?;
        let delta = end - start;
        if delta <= 0 {
            warn!(
                node = cx.node_name(),
                start, end, "non-positive tick interval, skipping"
            );
            return Ok(ProcessOutcome::Continue);
        }
        let rate = self.frequency / delta as f64;
        let output = cx
            .output_keys()
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::contract(cx.node_name(), "output port vanished"))?;
        let timestamp = cx.input_timestamp();
        cx.emit_value(&output, rate, timestamp)?;
        Ok(ProcessOutcome::Continue)
    }
}
