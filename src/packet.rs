//! The immutable unit of data flowing through a graph.
//!
//! A [`Packet`] pairs a type-erased payload with the [`Timestamp`] it belongs
//! to. Payloads are held behind `Arc<dyn Any + Send + Sync>`, so cloning a
//! packet for fan-out is an atomic refcount bump, never a copy of the value.
//! Packets are immutable after creation: a producer builds one, the stream
//! transfers it, and every consumer gets read-only access.
//!
//! Typed access goes through [`Packet::get`], which downcasts structurally
//! and reports a [`GraphError::TypeMismatch`] instead of panicking.

use crate::error::GraphError;
use crate::timestamp::Timestamp;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An immutable, type-tagged payload associated with exactly one timestamp.
#[derive(Clone)]
pub struct Packet {
    timestamp: Timestamp,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl Packet {
    /// Creates a packet carrying `value` at `timestamp`.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    /// Creates a timestamp-less packet ([`Timestamp::UNSET`]), the form used
    /// for side packets.
    #[must_use]
    pub fn from_value<T: Any + Send + Sync>(value: T) -> Self {
        Self::new(value, Timestamp::UNSET)
    }

    /// Returns the timestamp this packet belongs to.
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the Rust type name of the payload, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the [`TypeId`] of the concrete payload type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.value.as_ref().type_id()
    }

    /// Returns a copy of this packet rebound to `timestamp`. The payload is
    /// shared, not cloned.
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns true if the payload is of type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.as_ref().is::<T>()
    }

    /// Read-only typed access to the payload.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::TypeMismatch`] if the payload is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<&T, GraphError> {
        self
            .value
            .as_ref()
            .downcast_ref::<T>()
            .ok_or_else(|| GraphError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                actual: self.type_name.to_string(),
            })
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("timestamp", &self.timestamp)
            .field("type", &self.type_name)
            .finish()
    }
}
