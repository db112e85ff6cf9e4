//! Contracts implemented by application state machines.

use super::files::{SnapshotFile, SnapshotFileCollection};
use crate::error::RsmResult;
use crate::stop::StopSignal;
use crate::types::Entry;
use std::any::Any;
use std::io::{Read, Write};

/// Opaque point-in-time view captured by
/// [`ConcurrentStateMachine::prepare_snapshot`].
pub type SnapshotContext = Box<dyn Any + Send + Sync>;

/// A state machine that applies one command at a time and cannot be
/// snapshotted while updates are in flight.
pub trait StateMachine: Send {
    /// Apply a committed command and return its result.
    fn update(&mut self, cmd: &[u8]) -> u64;

    /// Answer a read-only query.
    fn lookup(&self, query: &[u8]) -> Vec<u8>;

    /// Write the full state to `writer`. External files the state refers to
    /// are registered with `files`.
    fn save_snapshot(
        &self,
        writer: &mut dyn Write,
        files: &mut dyn SnapshotFileCollection,
        stop: &StopSignal,
    ) -> RsmResult<()>;

    /// Replace the state with the one read from `reader`.
    fn recover_from_snapshot(
        &mut self,
        reader: &mut dyn Read,
        files: &[SnapshotFile],
        stop: &StopSignal,
    ) -> RsmResult<()>;

    /// Hash of the current state, compared across replicas.
    fn get_hash(&self) -> u64;

    /// Release underlying resources.
    fn close(&mut self);
}

/// A state machine that can capture a point-in-time context and write a
/// snapshot from it while updates keep being applied.
///
/// Every method takes `&self`; the implementation owns its synchronization
/// between `update`, `lookup` and `save_snapshot`.
pub trait ConcurrentStateMachine: Send + Sync {
    /// Apply a batch of committed entries, returning them with results set.
    /// The returned batch must have the same length and order.
    fn update(&self, entries: Vec<Entry>) -> Vec<Entry>;

    /// Answer a read-only query.
    fn lookup(&self, query: &[u8]) -> RsmResult<Vec<u8>>;

    /// Capture the context a later [`save_snapshot`] writes from.
    ///
    /// [`save_snapshot`]: ConcurrentStateMachine::save_snapshot
    fn prepare_snapshot(&self) -> RsmResult<SnapshotContext>;

    /// Write the state captured in `ctx` to `writer`.
    fn save_snapshot(
        &self,
        ctx: SnapshotContext,
        writer: &mut dyn Write,
        files: &mut dyn SnapshotFileCollection,
        stop: &StopSignal,
    ) -> RsmResult<()>;

    /// Replace the state with the one read from `reader`.
    fn recover_from_snapshot(
        &self,
        reader: &mut dyn Read,
        files: &[SnapshotFile],
        stop: &StopSignal,
    ) -> RsmResult<()>;

    /// Hash of the current state, compared across replicas.
    fn get_hash(&self) -> u64;

    /// Release underlying resources.
    fn close(&self);
}
