//! Built-in calculators registered by
//! [`CalculatorRegistry::with_builtin`](crate::registry::CalculatorRegistry::with_builtin).

mod counter;
mod pass_through;
mod rate;

pub use counter::CounterCalculator;
pub use pass_through::PassThroughCalculator;
pub use rate::RateCalculator;
