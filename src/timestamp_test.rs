//! # Timestamp Test Suite
//!
//! Covers ordering, the sentinel values, and display formatting.

use crate::timestamp::Timestamp;

#[test]
fn test_ordering_follows_values() {
    assert!(Timestamp::new(1) < Timestamp::new(2));
    assert!(Timestamp::new(-5) < Timestamp::new(0));
    assert_eq!(Timestamp::new(7), Timestamp::new(7));
}

#[test]
fn test_sentinels_bracket_every_stream_timestamp() {
    let ts = Timestamp::new(0);
    assert!(Timestamp::UNSET < ts);
    assert!(ts < Timestamp::DONE);
    assert!(Timestamp::UNSET.is_unset());
    assert!(Timestamp::DONE.is_done());
    assert!(!Timestamp::UNSET.is_stream_valid());
    assert!(!Timestamp::DONE.is_stream_valid());
    assert!(ts.is_stream_valid());
}

#[test]
fn test_default_is_unset() {
    assert!(Timestamp::default().is_unset());
}

#[test]
fn test_successor_increments() {
    assert_eq!(Timestamp::new(41).successor(), Timestamp::new(42));
}

#[test]
fn test_from_i64() {
    let ts: Timestamp = 9i64.into();
    assert_eq!(ts.value(), 9);
}

#[test]
fn test_display() {
    assert_eq!(Timestamp::new(12).to_string(), "12");
    assert_eq!(Timestamp::UNSET.to_string(), "unset");
    assert_eq!(Timestamp::DONE.to_string(), "done");
}
