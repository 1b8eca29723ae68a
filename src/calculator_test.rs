//! # Contract Test Suite
//!
//! Covers contract construction from config bindings, the validation pass,
//! and the contract hooks of the built-in calculators.

use crate::calculator::{Calculator, CalculatorContract};
use crate::calculators::{PassThroughCalculator, RateCalculator};
use crate::error::GraphError;
use crate::port::{PacketType, PortKey};

fn contract(
    inputs: Vec<PortKey>,
    outputs: Vec<PortKey>,
    side_packets: Vec<&str>,
) -> Result<CalculatorContract, GraphError> {
    CalculatorContract::new(
        "node",
        inputs,
        outputs,
        side_packets.into_iter().map(str::to_string).collect(),
    )
}

#[test]
fn test_rejects_duplicate_ports() {
    let error = contract(
        vec![PortKey::tag("IN"), PortKey::tag("IN")],
        vec![],
        vec![],
    )
    .unwrap_err();
    assert!(matches!(error, GraphError::Contract { .. }));
}

#[test]
fn test_rejects_non_contiguous_tag_groups() {
    let error = contract(vec![PortKey::new("TICK", 1)], vec![], vec![]).unwrap_err();
    assert!(error.to_string().contains("non-contiguous"));
}

#[test]
fn test_validation_requires_every_port_typed() {
    let mut contract = contract(vec![PortKey::index(0)], vec![PortKey::index(0)], vec![]).unwrap();
    assert!(contract.validate().is_err());

    contract
        .set_input_type(&PortKey::index(0), PacketType::any())
        .unwrap();
    assert!(contract.validate().is_err());

    contract
        .set_output_type(&PortKey::index(0), PacketType::of::<i64>())
        .unwrap();
    contract.validate().unwrap();
}

#[test]
fn test_validation_requires_homogeneous_tag_groups() {
    let mut contract = contract(
        vec![PortKey::new("TICK", 0), PortKey::new("TICK", 1)],
        vec![],
        vec![],
    )
    .unwrap();
    contract
        .set_input_type(&PortKey::new("TICK", 0), PacketType::of::<i64>())
        .unwrap();
    contract
        .set_input_type(&PortKey::new("TICK", 1), PacketType::of::<f64>())
        .unwrap();
    let error = contract.validate().unwrap_err();
    assert!(error.to_string().contains("mixes payload types"));
}

#[test]
fn test_typing_unknown_ports_is_rejected() {
    let mut contract = contract(vec![PortKey::index(0)], vec![], vec![]).unwrap();
    assert!(
        contract
            .set_input_type(&PortKey::tag("NOPE"), PacketType::any())
            .is_err()
    );
}

#[test]
fn test_required_side_packets_must_be_bound_in_config() {
    let mut with_slot = contract(vec![], vec![], vec!["FREQUENCY"]).unwrap();
    with_slot
        .require_side_packet("FREQUENCY", PacketType::of::<f64>())
        .unwrap();
    assert_eq!(
        with_slot.side_packet_type("FREQUENCY"),
        Some(PacketType::of::<f64>())
    );

    let mut without_slot = contract(vec![], vec![], vec![]).unwrap();
    assert!(
        without_slot
            .require_side_packet("FREQUENCY", PacketType::of::<f64>())
            .is_err()
    );
}

#[test]
fn test_pass_through_requires_paired_ports() {
    let calculator = PassThroughCalculator::new();
    let mut asymmetric = contract(
        vec![PortKey::index(0), PortKey::index(1)],
        vec![PortKey::index(0)],
        vec![],
    )
    .unwrap();
    assert!(calculator.contract(&mut asymmetric).is_err());

    let mut paired = contract(vec![PortKey::index(0)], vec![PortKey::index(0)], vec![]).unwrap();
    calculator.contract(&mut paired).unwrap();
    paired.validate().unwrap();
}

#[test]
fn test_rate_requires_two_ticks_and_a_frequency() {
    let calculator = RateCalculator::new();
    let mut wrong_inputs = contract(
        vec![PortKey::new("TICK", 0)],
        vec![PortKey::tag("RATE")],
        vec!["FREQUENCY"],
    )
    .unwrap();
    assert!(calculator.contract(&mut wrong_inputs).is_err());

    let mut missing_side = contract(
        vec![PortKey::new("TICK", 0), PortKey::new("TICK", 1)],
        vec![PortKey::tag("RATE")],
        vec![],
    )
    .unwrap();
    assert!(calculator.contract(&mut missing_side).is_err());

    let mut good = contract(
        vec![PortKey::new("TICK", 0), PortKey::new("TICK", 1)],
        vec![PortKey::tag("RATE")],
        vec!["FREQUENCY"],
    )
    .unwrap();
    calculator.contract(&mut good).unwrap();
    good.validate().unwrap();
    assert_eq!(
        good.inputs().get_type(&PortKey::new("TICK", 0)),
        Some(PacketType::of::<i64>())
    );
    assert_eq!(
        good.outputs().get_type(&PortKey::tag("RATE")),
        Some(PacketType::of::<f64>())
    );
}
