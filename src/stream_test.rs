//! # Stream Transport Test Suite
//!
//! Covers the ordering invariant at the source, closed-stream behavior,
//! fan-out delivery, and input buffer monotonicity.

use crate::error::GraphError;
use crate::packet::Packet;
use crate::port::{PacketType, PortKey};
use crate::stream::{InputPortBuffer, OutputChannel, OutputStreamSet};
use crate::timestamp::Timestamp;

fn packet(value: i64, ts: i64) -> Packet {
    Packet::new(value, Timestamp::new(ts))
}

#[test]
fn test_channel_requires_strictly_increasing_timestamps() {
    let mut channel = OutputChannel::new("s");
    channel.check_emit(Timestamp::new(5)).unwrap();
    assert!(matches!(
        channel.check_emit(Timestamp::new(5)),
        Err(GraphError::OrderingViolation { .. })
    ));
    assert!(matches!(
        channel.check_emit(Timestamp::new(4)),
        Err(GraphError::OrderingViolation { .. })
    ));
    channel.check_emit(Timestamp::new(6)).unwrap();
}

#[test]
fn test_channel_rejects_sentinel_timestamps() {
    let mut channel = OutputChannel::new("s");
    assert!(channel.check_emit(Timestamp::UNSET).is_err());
    assert!(channel.check_emit(Timestamp::DONE).is_err());
}

#[test]
fn test_closed_channel_rejects_emissions() {
    let mut channel = OutputChannel::new("s");
    channel.close();
    assert!(matches!(
        channel.check_emit(Timestamp::new(0)),
        Err(GraphError::ClosedStream(name)) if name == "s"
    ));
}

#[tokio::test]
async fn test_fan_out_delivers_to_every_cursor() {
    let mut channel = OutputChannel::new("s");
    let mut first = channel.subscribe(4);
    let mut second = channel.subscribe(4);
    channel.check_emit(Timestamp::new(1)).unwrap();
    channel.send(packet(42, 1)).await;

    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();
    assert_eq!(*a.get::<i64>().unwrap(), 42);
    // Fan-out clones the handle, not the payload.
    assert!(std::ptr::eq(
        a.get::<i64>().unwrap(),
        b.get::<i64>().unwrap()
    ));
}

#[tokio::test]
async fn test_close_hangs_up_cursors() {
    let mut channel = OutputChannel::new("s");
    let mut cursor = channel.subscribe(4);
    channel.check_emit(Timestamp::new(1)).unwrap();
    channel.send(packet(1, 1)).await;
    channel.close();

    assert!(cursor.recv().await.is_some());
    assert!(cursor.recv().await.is_none());
}

#[tokio::test]
async fn test_output_set_validates_before_buffering() {
    let mut outputs = OutputStreamSet::new();
    outputs.add_port(
        PortKey::tag("OUT"),
        PacketType::of::<i64>(),
        OutputChannel::new("s"),
    );

    assert!(matches!(
        outputs.emit(&PortKey::tag("MISSING"), packet(1, 0)),
        Err(GraphError::Wiring(_))
    ));
    assert!(matches!(
        outputs.emit(&PortKey::tag("OUT"), Packet::new(1.5f64, Timestamp::new(0))),
        Err(GraphError::TypeMismatch { .. })
    ));

    outputs.emit(&PortKey::tag("OUT"), packet(1, 0)).unwrap();
    assert!(matches!(
        outputs.emit(&PortKey::tag("OUT"), packet(2, 0)),
        Err(GraphError::OrderingViolation { .. })
    ));
}

#[tokio::test]
async fn test_output_set_flushes_in_emission_order() {
    let mut outputs = OutputStreamSet::new();
    let mut channel = OutputChannel::new("s");
    let mut cursor = channel.subscribe(4);
    outputs.add_port(PortKey::tag("OUT"), PacketType::any(), channel);

    outputs.emit(&PortKey::tag("OUT"), packet(1, 0)).unwrap();
    outputs.emit(&PortKey::tag("OUT"), packet(2, 1)).unwrap();
    outputs.flush().await;

    assert_eq!(*cursor.recv().await.unwrap().get::<i64>().unwrap(), 1);
    assert_eq!(*cursor.recv().await.unwrap().get::<i64>().unwrap(), 2);
}

#[test]
fn test_input_buffer_enforces_monotonicity() {
    let mut buffer = InputPortBuffer::new(PortKey::index(0), "s");
    buffer.push(packet(1, 3)).unwrap();
    assert!(matches!(
        buffer.push(packet(2, 3)),
        Err(GraphError::OrderingViolation { .. })
    ));
    buffer.push(packet(3, 4)).unwrap();
    assert_eq!(buffer.len(), 2);
    assert_eq!(buffer.head_timestamp(), Some(Timestamp::new(3)));
}

#[test]
fn test_input_buffer_exhaustion() {
    let mut buffer = InputPortBuffer::new(PortKey::index(0), "s");
    buffer.push(packet(1, 0)).unwrap();
    buffer.mark_closed();
    assert!(buffer.is_closed());
    assert!(!buffer.is_exhausted());
    buffer.pop().unwrap();
    assert!(buffer.is_exhausted());
}
