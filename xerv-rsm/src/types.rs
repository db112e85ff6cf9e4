//! Identifier and entry types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(u64);

impl ClientId {
    /// Sentinel returned by register/unregister when nothing changed.
    pub const NOOP: ClientId = ClientId(0);

    /// Create a new client ID.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this is the no-op sentinel.
    pub const fn is_noop(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for ClientId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client_{}", self.0)
    }
}

/// Per-client sequence number identifying one logical command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesId(u64);

impl SeriesId {
    /// Series ID used by commands that do not take part in deduplication.
    pub const NOOP: SeriesId = SeriesId(0);
    /// Series ID carried by client registration commands.
    pub const REGISTER: SeriesId = SeriesId(u64::MAX - 1);
    /// Series ID carried by client unregistration commands.
    pub const UNREGISTER: SeriesId = SeriesId(u64::MAX);

    /// Create a new series ID.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this series ID is reserved for session bookkeeping.
    pub const fn is_reserved(&self) -> bool {
        self.0 == Self::NOOP.0 || self.0 == Self::REGISTER.0 || self.0 == Self::UNREGISTER.0
    }
}

impl From<u64> for SeriesId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committed log entry handed to a state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Raft log index of the entry.
    pub index: u64,
    /// Command payload.
    pub cmd: Vec<u8>,
    /// Result set by the state machine once applied.
    pub result: u64,
}

impl Entry {
    /// Create an entry that has not been applied yet.
    pub fn new(index: u64, cmd: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            cmd: cmd.into(),
            result: 0,
        }
    }
}
