//! Run-scoped constant values bound once before execution starts.
//!
//! A side packet is a timestamp-less [`Packet`] bound to a named slot before
//! the first firing of any node that depends on it, and read-only for the
//! whole run. Because binding happens before the scheduler starts, reads
//! need no synchronization.

use crate::error::GraphError;
use crate::packet::Packet;
use std::any::Any;
use std::collections::HashMap;

/// Write-once map of named side packets for one graph run.
#[derive(Clone, Debug, Default)]
pub struct SidePacketSet {
    packets: HashMap<String, Packet>,
}

impl SidePacketSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `packet` to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Wiring`] if the slot is already bound; side
    /// packets are bound exactly once.
    pub fn bind(&mut self, name: impl Into<String>, packet: Packet) -> Result<(), GraphError> {
        let name = name.into();
        if self.packets.contains_key(&name) {
            return Err(GraphError::wiring(format!(
                "side packet '{}' is already bound",
                name
            )));
        }
        self.packets.insert(name, packet);
        Ok(())
    }

    /// Convenience for binding a plain value.
    ///
    /// # Errors
    ///
    /// Same as [`bind`](SidePacketSet::bind).
    pub fn bind_value<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Result<(), GraphError> {
        self.bind(name, Packet::from_value(value))
    }

    /// Looks up a bound side packet.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Packet> {
        self.packets.get(name)
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.packets.contains_key(name)
    }

    /// Number of bound side packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Iterates over the bound slot names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packets.keys().map(String::as_str)
    }
}
