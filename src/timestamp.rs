//! Logical timestamps labeling every packet in a stream.
//!
//! A [`Timestamp`] is an integer ordinal, not wall-clock time: a sequence
//! number, frame index, or tick round. Within one stream, timestamps are
//! strictly increasing; the engine rejects regressions with
//! [`GraphError::OrderingViolation`](crate::error::GraphError::OrderingViolation).
//!
//! Two sentinels bracket the valid range:
//!
//! - [`Timestamp::UNSET`]: before any data. Side packets and the `open`
//!   hook carry this value.
//! - [`Timestamp::DONE`]: the stream is closed; no further packets follow.
//!
//! Packets themselves may only carry values strictly between the two
//! sentinels (see [`Timestamp::is_stream_valid`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered logical time attached to every packet.
///
/// Implements [`Ord`] so it can serve as a totally ordered stream position.
/// The default value is [`Timestamp::UNSET`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Sentinel for "before any data": side packets, the `open` hook, and the
    /// initial cursor position of every stream.
    pub const UNSET: Timestamp = Timestamp(i64::MIN);

    /// Sentinel for "stream closed": no packet at or after this value exists.
    pub const DONE: Timestamp = Timestamp(i64::MAX);

    /// Creates a timestamp from a raw ordinal.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw ordinal value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns true if this is the [`UNSET`](Timestamp::UNSET) sentinel.
    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.0 == i64::MIN
    }

    /// Returns true if this is the [`DONE`](Timestamp::DONE) sentinel.
    #[must_use]
    pub const fn is_done(self) -> bool {
        self.0 == i64::MAX
    }

    /// Returns true if a packet may carry this timestamp: strictly between
    /// [`UNSET`](Timestamp::UNSET) and [`DONE`](Timestamp::DONE).
    #[must_use]
    pub const fn is_stream_valid(self) -> bool {
        self.0 > i64::MIN && self.0 < i64::MAX
    }

    /// Returns the smallest timestamp strictly after this one, saturating at
    /// [`DONE`](Timestamp::DONE).
    #[must_use]
    pub const fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::UNSET
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Timestamp::new(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unset() {
            write!(f, "unset")
        } else if self.is_done() {
            write!(f, "done")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
