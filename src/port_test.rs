//! # Port Test Suite
//!
//! Covers port keys, payload type compatibility, and the port table.

use crate::packet::Packet;
use crate::port::{PacketType, PortDirection, PortKey, PortTable};
use crate::timestamp::Timestamp;

#[test]
fn test_port_key_forms() {
    let tagged = PortKey::tag("TICK");
    assert_eq!(tagged.tag, "TICK");
    assert_eq!(tagged.index, 0);
    assert!(tagged.is_tagged());

    let positional = PortKey::index(2);
    assert!(!positional.is_tagged());
    assert_eq!(positional.to_string(), ":2");
    assert_eq!(PortKey::new("TICK", 1).to_string(), "TICK:1");
}

#[test]
fn test_packet_type_compatibility() {
    let int = PacketType::of::<i64>();
    let float = PacketType::of::<f64>();
    assert!(int.compatible_with(&int));
    assert!(!int.compatible_with(&float));
    assert!(PacketType::any().compatible_with(&int));
    assert!(float.compatible_with(&PacketType::any()));
}

#[test]
fn test_packet_type_accepts_payloads() {
    let packet = Packet::new(1i64, Timestamp::new(0));
    assert!(PacketType::of::<i64>().accepts(&packet));
    assert!(!PacketType::of::<f64>().accepts(&packet));
    assert!(PacketType::any().accepts(&packet));
}

#[test]
fn test_table_rejects_duplicate_keys() {
    let mut table = PortTable::new(PortDirection::Input);
    assert!(table.add_key(PortKey::tag("TICK")));
    assert!(!table.add_key(PortKey::tag("TICK")));
    assert_eq!(table.len(), 1);
}

#[test]
fn test_tag_group_is_index_ordered() {
    let mut table = PortTable::new(PortDirection::Input);
    table.add_key(PortKey::new("TICK", 1));
    table.add_key(PortKey::new("TICK", 0));
    table.add_key(PortKey::new("OTHER", 0));
    let group = table.tag_group("TICK");
    assert_eq!(group.len(), 2);
    assert_eq!(group[0].index, 0);
    assert_eq!(group[1].index, 1);
}

#[test]
fn test_types_are_assigned_per_key() {
    let mut table = PortTable::new(PortDirection::Output);
    table.add_key(PortKey::index(0));
    table.add_key(PortKey::index(1));
    assert_eq!(table.untyped_keys().len(), 2);

    assert!(table.set_type(&PortKey::index(0), PacketType::of::<i64>()));
    assert!(!table.set_type(&PortKey::index(9), PacketType::of::<i64>()));
    assert_eq!(table.untyped_keys().len(), 1);

    table.set_all_types(PacketType::any());
    assert!(table.untyped_keys().is_empty());
    assert_eq!(table.get_type(&PortKey::index(0)), Some(PacketType::any()));
}
