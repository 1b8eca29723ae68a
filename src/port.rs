//! Port identity and payload typing.
//!
//! A port is a named endpoint on a node, identified by its `(tag, index)`
//! pair: `TICK:0` and `TICK:1` are two indices of the homogeneous `TICK`
//! group, while a bare binding gets the empty tag and a positional index.
//! Ports are fixed once the graph is built; there is no dynamic port
//! creation at run time.
//!
//! [`PacketType`] is the declared payload type of a port: either a concrete
//! Rust type or the [`PacketType::Any`] wildcard, resolved structurally at
//! wiring time rather than checked ad hoc inside calculator bodies.

use crate::packet::Packet;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;

/// Identity of a port: its tag (possibly empty) and integer index.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PortKey {
    /// Tag naming the port group; empty for bare positional ports.
    pub tag: String,
    /// Index within the tag group.
    pub index: usize,
}

impl PortKey {
    /// Creates a key from a tag and an index.
    #[must_use]
    pub fn new(tag: impl Into<String>, index: usize) -> Self {
        Self {
            tag: tag.into(),
            index,
        }
    }

    /// Creates a tagged key with index 0.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::new(tag, 0)
    }

    /// Creates an untagged, purely positional key.
    #[must_use]
    pub fn index(index: usize) -> Self {
        Self::new("", index)
    }

    /// Returns true if the key carries a non-empty tag.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        !self.tag.is_empty()
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.index)
    }
}

/// Whether a port consumes or produces packets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortDirection {
    /// The port consumes packets from a stream.
    Input,
    /// The port produces packets onto a stream.
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Declared payload type of a port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketType {
    /// Wildcard: the port accepts any payload; the concrete type is resolved
    /// by the peer port at wiring time.
    Any,
    /// A concrete payload type.
    Typed {
        /// Type identity used for structural compatibility checks.
        id: TypeId,
        /// Rust type name, for diagnostics.
        name: &'static str,
    },
}

impl PacketType {
    /// The declared type for payloads of type `T`.
    #[must_use]
    pub fn of<T: Any>() -> Self {
        PacketType::Typed {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The wildcard type.
    #[must_use]
    pub fn any() -> Self {
        PacketType::Any
    }

    /// Human-readable name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PacketType::Any => "any",
            PacketType::Typed { name, .. } => name,
        }
    }

    /// Structural compatibility: the wildcard matches everything, concrete
    /// types must be identical.
    #[must_use]
    pub fn compatible_with(&self, other: &PacketType) -> bool {
        match (self, other) {
            (PacketType::Any, _) | (_, PacketType::Any) => true,
            (PacketType::Typed { id: a, .. }, PacketType::Typed { id: b, .. }) => a == b,
        }
    }

    /// Returns true if a packet's concrete payload satisfies this type.
    #[must_use]
    pub fn accepts(&self, packet: &Packet) -> bool {
        match self {
            PacketType::Any => true,
            PacketType::Typed { id, .. } => packet.type_id() == *id,
        }
    }
}

/// Ordered table of ports on one side (input or output) of a node.
///
/// Keys are fixed when the table is built from the node's config bindings;
/// the calculator's contract hook assigns a [`PacketType`] to each.
#[derive(Clone, Debug)]
pub struct PortTable {
    direction: PortDirection,
    slots: Vec<(PortKey, Option<PacketType>)>,
}

impl PortTable {
    /// Creates an empty table for the given direction.
    #[must_use]
    pub fn new(direction: PortDirection) -> Self {
        Self {
            direction,
            slots: Vec::new(),
        }
    }

    /// The side of the node this table describes.
    #[must_use]
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Number of ports in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the table has no ports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true if `key` names a port in this table.
    #[must_use]
    pub fn contains(&self, key: &PortKey) -> bool {
        self.slots.iter().any(|(k, _)| k == key)
    }

    /// Iterates over the port keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &PortKey> {
        self.slots.iter().map(|(k, _)| k)
    }

    /// Returns the keys of one tag group, in index order.
    #[must_use]
    pub fn tag_group(&self, tag: &str) -> Vec<&PortKey> {
        let mut keys: Vec<&PortKey> = self
            .slots
            .iter()
            .map(|(k, _)| k)
            .filter(|k| k.tag == tag)
            .collect();
        keys.sort();
        keys
    }

    /// Returns the declared type of `key`, if the port exists and has been
    /// typed.
    #[must_use]
    pub fn get_type(&self, key: &PortKey) -> Option<PacketType> {
        self
            .slots
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, ty)| *ty)
    }

    /// Appends a key with no type yet. Returns false if the key is already
    /// present.
    pub(crate) fn add_key(&mut self, key: PortKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.slots.push((key, None));
        true
    }

    /// Assigns a type to `key`. Returns false if the port does not exist.
    pub(crate) fn set_type(&mut self, key: &PortKey, packet_type: PacketType) -> bool {
        match self.slots.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => {
                *slot = Some(packet_type);
                true
            }
            None => false,
        }
    }

    /// Assigns the same type to every port in the table.
    pub(crate) fn set_all_types(&mut self, packet_type: PacketType) {
        for (_, slot) in &mut self.slots {
            *slot = Some(packet_type);
        }
    }

    /// Keys whose type the contract hook has not assigned.
    #[must_use]
    pub(crate) fn untyped_keys(&self) -> Vec<&PortKey> {
        self
            .slots
            .iter()
            .filter(|(_, ty)| ty.is_none())
            .map(|(k, _)| k)
            .collect()
    }
}
