//! # Input Stream Handler Test Suite
//!
//! Drives the readiness policies directly over input buffers:
//!
//! - **Default policy**: timestamp synchronization, skipped-timestamp
//!   drops, permanent absence from closed streams.
//! - **Fixed-size policy**: trigger/target batching, lockstep draining,
//!   early closure, and the strictly increasing firing timestamp.

use crate::config::NodeConfig;
use crate::handler::{
    DefaultStreamHandler, FIXED_SIZE_HANDLER_NAME, FiringPlan, FixedSizeStreamHandler,
    InputStreamHandler, handler_for_node,
};
use crate::packet::Packet;
use crate::port::PortKey;
use crate::stream::InputPortBuffer;
use crate::timestamp::Timestamp;

fn buffer(tag: &str, index: usize, stream: &str) -> InputPortBuffer {
    InputPortBuffer::new(PortKey::new(tag, index), stream)
}

fn push(buffer: &mut InputPortBuffer, value: i64, ts: i64) {
    buffer
        .push(Packet::new(value, Timestamp::new(ts)))
        .expect("timestamps in tests increase");
}

fn expect_fire(plan: FiringPlan) -> crate::handler::FiringSet {
    match plan {
        FiringPlan::Fire(firing) => firing,
        other => panic!("expected a firing, got {:?}", other),
    }
}

// ============================================================================
// Default policy
// ============================================================================

#[test]
fn test_default_waits_for_an_empty_open_stream() {
    let mut handler = DefaultStreamHandler::new();
    let mut inputs = vec![buffer("IN", 0, "a"), buffer("IN", 1, "b")];
    push(&mut inputs[0], 1, 0);
    assert!(matches!(handler.plan(&mut inputs), FiringPlan::Wait));
}

#[test]
fn test_default_fires_matched_timestamps() {
    let mut handler = DefaultStreamHandler::new();
    let mut inputs = vec![buffer("IN", 0, "a"), buffer("IN", 1, "b")];
    push(&mut inputs[0], 10, 0);
    push(&mut inputs[1], 20, 0);

    let firing = expect_fire(handler.plan(&mut inputs));
    assert_eq!(firing.timestamp, Timestamp::new(0));
    assert_eq!(firing.window(&PortKey::new("IN", 0)).len(), 1);
    assert_eq!(firing.window(&PortKey::new("IN", 1)).len(), 1);
    assert!(inputs.iter().all(InputPortBuffer::is_empty));
}

#[test]
fn test_default_drops_skipped_timestamps() {
    // Stream a carries t0, t1, t2; stream b carries t0, t2. Once b's head is
    // past t1, nothing can ever match a's t1 packet: only t0 and t2 fire.
    let mut handler = DefaultStreamHandler::new();
    let mut inputs = vec![buffer("IN", 0, "a"), buffer("IN", 1, "b")];
    for ts in [0, 1, 2] {
        push(&mut inputs[0], ts, ts);
    }
    for ts in [0, 2] {
        push(&mut inputs[1], ts, ts);
    }

    let first = expect_fire(handler.plan(&mut inputs));
    assert_eq!(first.timestamp, Timestamp::new(0));

    let second = expect_fire(handler.plan(&mut inputs));
    assert_eq!(second.timestamp, Timestamp::new(2));
    assert_eq!(second.packet_count(), 2);

    assert!(matches!(handler.plan(&mut inputs), FiringPlan::Wait));
    assert!(inputs.iter().all(InputPortBuffer::is_empty));
}

#[test]
fn test_default_treats_closed_streams_as_absent() {
    let mut handler = DefaultStreamHandler::new();
    let mut inputs = vec![buffer("IN", 0, "a"), buffer("IN", 1, "b")];
    push(&mut inputs[0], 5, 3);
    inputs[1].mark_closed();

    let firing = expect_fire(handler.plan(&mut inputs));
    assert_eq!(firing.timestamp, Timestamp::new(3));
    assert_eq!(firing.window(&PortKey::new("IN", 0)).len(), 1);
    // The closed stream still appears in the firing, with an empty window.
    assert!(firing.window(&PortKey::new("IN", 1)).is_empty());
    assert_eq!(firing.windows.len(), 2);
}

#[test]
fn test_default_reports_exhaustion() {
    let mut handler = DefaultStreamHandler::new();
    let mut inputs = vec![buffer("IN", 0, "a"), buffer("IN", 1, "b")];
    inputs[0].mark_closed();
    inputs[1].mark_closed();
    assert!(matches!(handler.plan(&mut inputs), FiringPlan::Exhausted));
}

#[test]
fn test_default_synchronizes_tag_groups_independently() {
    let mut handler = DefaultStreamHandler::new();
    let mut inputs = vec![buffer("LEFT", 0, "a"), buffer("RIGHT", 0, "b")];
    push(&mut inputs[0], 1, 7);
    // RIGHT is empty but LEFT's group does not wait for it.
    let firing = expect_fire(handler.plan(&mut inputs));
    assert_eq!(firing.timestamp, Timestamp::new(7));
    assert_eq!(firing.windows.len(), 1);
    assert!(matches!(handler.plan(&mut inputs), FiringPlan::Wait));
}

// ============================================================================
// Fixed-size policy
// ============================================================================

#[test]
fn test_fixed_size_waits_for_the_trigger() {
    let mut handler = FixedSizeStreamHandler::new(2, 2, false);
    let mut inputs = vec![buffer("", 0, "a")];
    push(&mut inputs[0], 1, 0);
    assert!(matches!(handler.plan(&mut inputs), FiringPlan::Wait));

    push(&mut inputs[0], 2, 1);
    let firing = expect_fire(handler.plan(&mut inputs));
    assert_eq!(firing.window(&PortKey::index(0)).len(), 2);
    assert_eq!(firing.timestamp, Timestamp::new(1));
}

#[test]
fn test_fixed_size_drains_at_most_the_target() {
    let mut handler = FixedSizeStreamHandler::new(1, 2, false);
    let mut inputs = vec![buffer("", 0, "a")];
    for ts in 0..5 {
        push(&mut inputs[0], ts, ts);
    }
    let firing = expect_fire(handler.plan(&mut inputs));
    assert_eq!(firing.window(&PortKey::index(0)).len(), 2);
    assert_eq!(inputs[0].len(), 3);
}

#[test]
fn test_fixed_size_lockstep_draining() {
    let mut handler = FixedSizeStreamHandler::new(2, 3, true);
    let mut inputs = vec![buffer("", 0, "a"), buffer("", 1, "b")];
    for ts in 0..4 {
        push(&mut inputs[0], ts, ts);
    }
    for ts in 0..2 {
        push(&mut inputs[1], ts, ts);
    }
    let firing = expect_fire(handler.plan(&mut inputs));
    // Both live streams contribute the same count: min(4, 3) vs min(2, 3).
    assert_eq!(firing.window(&PortKey::index(0)).len(), 2);
    assert_eq!(firing.window(&PortKey::index(1)).len(), 2);
}

#[test]
fn test_fixed_size_delivers_the_remainder_of_a_closed_stream() {
    let mut handler = FixedSizeStreamHandler::new(3, 3, false);
    let mut inputs = vec![buffer("", 0, "a")];
    push(&mut inputs[0], 1, 0);
    assert!(matches!(handler.plan(&mut inputs), FiringPlan::Wait));

    inputs[0].mark_closed();
    let firing = expect_fire(handler.plan(&mut inputs));
    assert_eq!(firing.window(&PortKey::index(0)).len(), 1);
    assert!(matches!(handler.plan(&mut inputs), FiringPlan::Exhausted));
}

#[test]
fn test_fixed_size_firing_timestamps_strictly_increase() {
    let mut handler = FixedSizeStreamHandler::new(1, 1, false);
    let mut inputs = vec![buffer("", 0, "a"), buffer("", 1, "b")];
    push(&mut inputs[0], 1, 5);
    push(&mut inputs[1], 2, 1);

    let first = expect_fire(handler.plan(&mut inputs));
    assert_eq!(first.timestamp, Timestamp::new(5));

    inputs[0].mark_closed();
    push(&mut inputs[1], 3, 2);
    let second = expect_fire(handler.plan(&mut inputs));
    // The window's own maximum (2) has already been passed, so the firing
    // timestamp is bumped past the previous one.
    assert_eq!(second.timestamp, Timestamp::new(6));
}

#[test]
fn test_fixed_size_sizes_drive_channel_and_polling() {
    let handler = FixedSizeStreamHandler::new(4, 2, false);
    assert_eq!(handler.poll_limit(), 4);
    assert_eq!(handler.channel_capacity(), 2);
}

// ============================================================================
// Config factory
// ============================================================================

#[test]
fn test_factory_defaults_to_the_sync_policy() {
    let config = NodeConfig::new("X");
    let handler = handler_for_node(&config).unwrap();
    assert_eq!(handler.poll_limit(), usize::MAX);
}

#[test]
fn test_factory_rejects_queue_options_without_the_fixed_size_policy() {
    let mut config = NodeConfig::new("X");
    config.trigger_queue_size = Some(2);
    assert!(handler_for_node(&config).is_err());
}

#[test]
fn test_factory_fills_in_missing_sizes() {
    let mut config = NodeConfig::new("X");
    config.input_stream_handler = Some(FIXED_SIZE_HANDLER_NAME.to_string());
    config.trigger_queue_size = Some(3);
    let handler = handler_for_node(&config).unwrap();
    assert_eq!(handler.poll_limit(), 3);
    assert_eq!(handler.channel_capacity(), 3);
}

#[test]
fn test_factory_rejects_unknown_handlers() {
    let mut config = NodeConfig::new("X");
    config.input_stream_handler = Some("MadeUpHandler".to_string());
    assert!(handler_for_node(&config).is_err());
}
