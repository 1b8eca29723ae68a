//! # Packet Test Suite
//!
//! Covers typed access, the timestamp rebind helper, and cheap cloning.

use crate::error::GraphError;
use crate::packet::Packet;
use crate::timestamp::Timestamp;

#[test]
fn test_typed_access() {
    let packet = Packet::new(42i64, Timestamp::new(3));
    assert_eq!(packet.timestamp(), Timestamp::new(3));
    assert!(packet.is::<i64>());
    assert!(!packet.is::<String>());
    assert_eq!(*packet.get::<i64>().unwrap(), 42);
}

#[test]
fn test_wrong_type_is_reported() {
    let packet = Packet::new("hello".to_string(), Timestamp::new(0));
    let error = packet.get::<i64>().unwrap_err();
    assert!(matches!(error, GraphError::TypeMismatch { .. }));
}

#[test]
fn test_from_value_has_no_timestamp() {
    let packet = Packet::from_value(1.5f64);
    assert!(packet.timestamp().is_unset());
}

#[test]
fn test_at_rebinds_only_the_timestamp() {
    let packet = Packet::new(7u32, Timestamp::new(1));
    let moved = packet.at(Timestamp::new(9));
    assert_eq!(moved.timestamp(), Timestamp::new(9));
    assert_eq!(*moved.get::<u32>().unwrap(), 7);
}

#[test]
fn test_clone_shares_the_payload() {
    let packet = Packet::new(vec![1, 2, 3], Timestamp::new(0));
    let clone = packet.clone();
    let a: &Vec<i32> = packet.get().unwrap();
    let b: &Vec<i32> = clone.get().unwrap();
    assert!(std::ptr::eq(a, b));
}
