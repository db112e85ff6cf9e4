//! One calling convention over both kinds of application state machine.

use super::files::{SnapshotFile, SnapshotFileCollection};
use super::traits::{ConcurrentStateMachine, SnapshotContext, StateMachine};
use crate::error::RsmResult;
use crate::stop::StopSignal;
use crate::types::Entry;
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// Adapter for a [`StateMachine`].
///
/// All calls are serialized through one mutex, so lookups and snapshot
/// saves never overlap an update.
pub struct SequentialAdapter {
    sm: Mutex<Box<dyn StateMachine>>,
    closed: AtomicBool,
}

/// Adapter for a [`ConcurrentStateMachine`].
pub struct ConcurrentAdapter {
    sm: Box<dyn ConcurrentStateMachine>,
    closed: AtomicBool,
}

/// An application state machine together with its snapshot capability.
pub enum StateMachineAdapter {
    /// Applies one entry per update, no concurrent snapshots.
    Sequential(SequentialAdapter),
    /// Applies batches and supports prepare-then-save snapshots.
    Concurrent(ConcurrentAdapter),
}

impl StateMachineAdapter {
    /// Wrap a sequential state machine.
    pub fn sequential(sm: impl StateMachine + 'static) -> Self {
        StateMachineAdapter::Sequential(SequentialAdapter {
            sm: Mutex::new(Box::new(sm)),
            closed: AtomicBool::new(false),
        })
    }

    /// Wrap a concurrent-capable state machine.
    pub fn concurrent(sm: impl ConcurrentStateMachine + 'static) -> Self {
        StateMachineAdapter::Concurrent(ConcurrentAdapter {
            sm: Box::new(sm),
            closed: AtomicBool::new(false),
        })
    }

    /// Whether snapshots may be prepared and saved while updates continue.
    pub fn concurrent_snapshot(&self) -> bool {
        matches!(self, StateMachineAdapter::Concurrent(_))
    }

    /// Apply committed entries, returning them with results attached.
    ///
    /// A sequential state machine accepts exactly one entry per call.
    pub fn update(&self, mut entries: Vec<Entry>) -> Vec<Entry> {
        match self {
            StateMachineAdapter::Sequential(a) => {
                if entries.len() != 1 {
                    fatal!(
                        "sequential state machine got {} entries, want 1",
                        entries.len()
                    );
                }
                let entry = &mut entries[0];
                entry.result = a.sm.lock().update(&entry.cmd);
                entries
            }
            StateMachineAdapter::Concurrent(a) => a.sm.update(entries),
        }
    }

    /// Answer a read-only query.
    pub fn lookup(&self, query: &[u8]) -> RsmResult<Vec<u8>> {
        match self {
            StateMachineAdapter::Sequential(a) => Ok(a.sm.lock().lookup(query)),
            StateMachineAdapter::Concurrent(a) => a.sm.lookup(query),
        }
    }

    /// Capture a point-in-time snapshot context.
    ///
    /// Only concurrent-capable state machines support this; callers must
    /// check [`concurrent_snapshot`](Self::concurrent_snapshot) first.
    pub fn prepare_snapshot(&self) -> RsmResult<SnapshotContext> {
        match self {
            StateMachineAdapter::Sequential(_) => {
                fatal!("prepare_snapshot called on a sequential state machine")
            }
            StateMachineAdapter::Concurrent(a) => a.sm.prepare_snapshot(),
        }
    }

    /// Write the application section of a snapshot.
    ///
    /// Sequential state machines take no context; concurrent ones require
    /// the context returned by [`prepare_snapshot`](Self::prepare_snapshot).
    /// Returns the number of bytes written.
    pub fn save_snapshot(
        &self,
        ctx: Option<SnapshotContext>,
        writer: &mut dyn Write,
        files: &mut dyn SnapshotFileCollection,
        stop: &StopSignal,
    ) -> RsmResult<u64> {
        let mut counter = CountingWriter::new(writer);
        match self {
            StateMachineAdapter::Sequential(a) => {
                if ctx.is_some() {
                    fatal!("sequential state machine got a snapshot context");
                }
                a.sm.lock().save_snapshot(&mut counter, files, stop)?;
            }
            StateMachineAdapter::Concurrent(a) => {
                let Some(ctx) = ctx else {
                    fatal!("concurrent state machine saved without a prepared context");
                };
                a.sm.save_snapshot(ctx, &mut counter, files, stop)?;
            }
        }
        Ok(counter.written)
    }

    /// Restore the application state from a snapshot.
    pub fn recover_from_snapshot(
        &self,
        reader: &mut dyn Read,
        files: &[SnapshotFile],
        stop: &StopSignal,
    ) -> RsmResult<()> {
        match self {
            StateMachineAdapter::Sequential(a) => {
                a.sm.lock().recover_from_snapshot(reader, files, stop)
            }
            StateMachineAdapter::Concurrent(a) => a.sm.recover_from_snapshot(reader, files, stop),
        }
    }

    /// Hash of the application state.
    pub fn get_hash(&self) -> u64 {
        match self {
            StateMachineAdapter::Sequential(a) => a.sm.lock().get_hash(),
            StateMachineAdapter::Concurrent(a) => a.sm.get_hash(),
        }
    }

    /// Release the underlying state machine. Only the first call reaches it.
    pub fn close(&self) {
        match self {
            StateMachineAdapter::Sequential(a) => {
                if !a.closed.swap(true, Ordering::AcqRel) {
                    a.sm.lock().close();
                }
            }
            StateMachineAdapter::Concurrent(a) => {
                if !a.closed.swap(true, Ordering::AcqRel) {
                    a.sm.close();
                }
            }
        }
    }
}

impl std::fmt::Debug for StateMachineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateMachineAdapter::Sequential(_) => f.write_str("StateMachineAdapter::Sequential"),
            StateMachineAdapter::Concurrent(_) => f.write_str("StateMachineAdapter::Concurrent"),
        }
    }
}

struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    written: u64,
}

impl<'a> CountingWriter<'a> {
    fn new(inner: &'a mut dyn Write) -> Self {
        Self { inner, written: 0 }
    }
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
