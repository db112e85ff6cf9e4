//! Managed state machine.
//!
//! Wraps a user state machine with client sessions, lifecycle tracking and
//! the snapshot protocol. One instance belongs to one raft group and is
//! shared by the node host and the step, commit and snapshot workers.
//!
//! # Snapshot protocol
//!
//! Saving writes the session section, then the application section, then
//! fills in the header. Recovery verifies the payload against the header
//! first, then reads the sections back in the same order.

use crate::config::RsmConfig;
use crate::error::{RsmError, RsmResult};
use crate::offload::{Component, OffloadedStatus};
use crate::session::{Session, SessionManager};
use crate::snapshot::{SNAPSHOT_HEADER_SIZE, SnapshotReader, SnapshotWriter};
use crate::statemachine::{
    SnapshotContext, SnapshotFile, SnapshotFileCollection, StateMachineAdapter,
};
use crate::stop::StopSignal;
use crate::types::{Entry, SeriesId};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::io::{self, Read, Seek, Write};
use std::path::Path;

/// A user state machine managed on behalf of a raft group.
pub struct ManagedStateMachine {
    cluster_id: u64,
    node_id: u64,
    sm: StateMachineAdapter,
    sessions: Mutex<SessionManager>,
    status: RwLock<OffloadedStatus>,
    stopper: StopSignal,
}

impl ManagedStateMachine {
    /// Create a managed state machine for the given replica.
    pub fn new(
        cluster_id: u64,
        node_id: u64,
        sm: StateMachineAdapter,
        config: &RsmConfig,
        stopper: StopSignal,
    ) -> Self {
        Self {
            cluster_id,
            node_id,
            sm,
            sessions: Mutex::new(SessionManager::with_config(config)),
            status: RwLock::new(OffloadedStatus::new()),
            stopper,
        }
    }

    /// Raft group this instance belongs to.
    pub fn cluster_id(&self) -> u64 {
        self.cluster_id
    }

    /// Replica this instance belongs to.
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Record that `component` released its reference.
    ///
    /// Once every component has released it, the user state machine is
    /// closed and the instance becomes destroyed.
    pub fn offloaded(&self, component: Component) {
        let mut status = self.status.write();
        status.set_offloaded(component);
        if status.ready_to_destroy() && !status.destroyed() {
            self.sm.close();
            status.set_destroyed();
            tracing::info!(
                cluster_id = self.cluster_id,
                node_id = self.node_id,
                %component,
                "Managed state machine destroyed"
            );
        }
    }

    /// Record that `component` acquired a reference.
    ///
    /// # Panics
    ///
    /// Panics for the node host, or once the node host has offloaded.
    pub fn loaded(&self, component: Component) {
        self.status.write().set_loaded(component);
    }

    /// Whether the user state machine has been closed.
    pub fn is_destroyed(&self) -> bool {
        self.status.read().destroyed()
    }

    /// Copy of the current load/offload flags.
    pub fn offloaded_status(&self) -> OffloadedStatus {
        self.status.read().clone()
    }

    /// Whether snapshots can be taken while updates continue.
    pub fn concurrent_snapshot(&self) -> bool {
        self.sm.concurrent_snapshot()
    }

    /// Lock the session manager.
    ///
    /// Sessions handed to [`update`](Self::update) are borrowed from this
    /// guard.
    pub fn sessions(&self) -> MutexGuard<'_, SessionManager> {
        self.sessions.lock()
    }

    /// Apply one command.
    ///
    /// With a session, the caller must have checked
    /// [`Session::update_required`] first; the result is recorded in the
    /// session under `series_id`.
    ///
    /// # Panics
    ///
    /// Panics if the session already holds a result for `series_id`.
    pub fn update(
        &self,
        session: Option<&mut Session>,
        series_id: SeriesId,
        index: u64,
        term: u64,
        data: &[u8],
    ) -> u64 {
        if let Some(session) = session.as_deref() {
            session.must_not_have_response(series_id);
        }

        let applied = self.sm.update(vec![Entry::new(index, data)]);
        if applied.len() != 1 {
            fatal!("unexpected result length {}, want 1", applied.len());
        }
        let result = applied[0].result;
        tracing::trace!(index, term, %series_id, result, "Applied entry");

        if let Some(session) = session {
            session.add_response(series_id, result);
        }
        result
    }

    /// Apply a batch of entries without session bookkeeping.
    ///
    /// # Panics
    ///
    /// Panics if the state machine returns a batch of a different length.
    pub fn batched_update(&self, entries: Vec<Entry>) -> Vec<Entry> {
        let expected = entries.len();
        let applied = self.sm.update(entries);
        if applied.len() != expected {
            fatal!(
                "unexpected result length {}, want {}",
                applied.len(),
                expected
            );
        }
        applied
    }

    /// Answer a read-only query.
    ///
    /// Fails with [`RsmError::ClusterClosed`] once the instance has been
    /// destroyed.
    pub fn lookup(&self, query: &[u8]) -> RsmResult<Vec<u8>> {
        let status = self.status.read();
        if status.destroyed() {
            return Err(RsmError::ClusterClosed);
        }
        self.sm.lookup(query)
    }

    /// Hash of the application state.
    pub fn get_hash(&self) -> u64 {
        self.sm.get_hash()
    }

    /// Hash of the retained session state.
    pub fn get_session_hash(&self) -> u64 {
        self.sessions.lock().get_session_hash()
    }

    /// Raise the acknowledgement mark of `session`.
    pub fn update_responded_to(&self, session: &mut Session, series_id: SeriesId) {
        SessionManager::update_responded_to(session, series_id);
    }

    /// Serialize all sessions into `writer`.
    pub fn save_sessions<W: Write>(&self, writer: &mut W) -> RsmResult<u64> {
        self.sessions.lock().save_sessions(writer)
    }

    /// Serialize all sessions into a buffer, for use as the session section
    /// of a later [`save_snapshot`](Self::save_snapshot).
    pub fn get_session_snapshot(&self) -> RsmResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.save_sessions(&mut buf)?;
        Ok(buf)
    }

    /// Capture a point-in-time context for a concurrent snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the state machine does not support concurrent snapshots.
    pub fn prepare_snapshot(&self) -> RsmResult<SnapshotContext> {
        if !self.concurrent_snapshot() {
            fatal!(
                "state machine of cluster {} node {} is not concurrent-capable",
                self.cluster_id,
                self.node_id
            );
        }
        self.sm.prepare_snapshot()
    }

    /// Write a complete snapshot.
    ///
    /// `sessions` is the session section captured alongside `ctx` (see
    /// [`get_session_snapshot`](Self::get_session_snapshot)). Returns the
    /// total snapshot size including the header region.
    pub fn save_snapshot<W: Write + Seek>(
        &self,
        ctx: Option<SnapshotContext>,
        writer: &mut SnapshotWriter<W>,
        sessions: &[u8],
        files: &mut dyn SnapshotFileCollection,
    ) -> RsmResult<u64> {
        self.write_snapshot(ctx, writer, sessions, files)
            .map_err(|e| self.stopped_or(e))
    }

    fn write_snapshot<W: Write + Seek>(
        &self,
        ctx: Option<SnapshotContext>,
        writer: &mut SnapshotWriter<W>,
        sessions: &[u8],
        files: &mut dyn SnapshotFileCollection,
    ) -> RsmResult<u64> {
        write_section(writer, sessions)?;
        let session_size = sessions.len() as u64;

        let data_size = self.sm.save_snapshot(ctx, writer, files, &self.stopper)?;
        writer.save_header(session_size, data_size)?;

        let total = session_size + data_size + SNAPSHOT_HEADER_SIZE;
        tracing::info!(
            cluster_id = self.cluster_id,
            node_id = self.node_id,
            session_size,
            data_size,
            total,
            "Snapshot saved"
        );
        Ok(total)
    }

    /// Restore sessions and application state from the snapshot at `path`.
    pub fn recover_from_snapshot(
        &self,
        path: impl AsRef<Path>,
        files: &[SnapshotFile],
    ) -> RsmResult<()> {
        let mut reader = SnapshotReader::open(path, self.stopper.clone())?;
        self.recover_from_reader(&mut reader, files)
    }

    /// Restore sessions and application state from `reader`.
    ///
    /// The payload is checked against the header before anything is
    /// applied, so a corrupt snapshot leaves both the sessions and the
    /// application state untouched. Sessions are only replaced once the
    /// application state has been recovered.
    pub fn recover_from_reader<R: Read + Seek>(
        &self,
        reader: &mut SnapshotReader<R>,
        files: &[SnapshotFile],
    ) -> RsmResult<()> {
        self.read_snapshot(reader, files)
            .map_err(|e| self.stopped_or(e))
    }

    fn read_snapshot<R: Read + Seek>(
        &self,
        reader: &mut SnapshotReader<R>,
        files: &[SnapshotFile],
    ) -> RsmResult<()> {
        let header = reader.get_header()?;
        reader.validate_header(&header)?;
        reader.verify_payload(&header)?;

        let capacity = self.sessions.lock().capacity();
        let mut restored = SessionManager::new(capacity);
        restored.load_sessions(&mut reader.by_ref().take(header.session_size))?;
        if reader.payload_read() != header.session_size {
            return Err(RsmError::SnapshotPayload {
                cause: format!(
                    "session section is {} bytes, header says {}",
                    reader.payload_read(),
                    header.session_size
                ),
            });
        }

        let mut data = reader.by_ref().take(header.data_size);
        if let Err(e) = self.sm.recover_from_snapshot(&mut data, files, &self.stopper) {
            if !self.stopper.is_stopped() {
                tracing::error!(
                    cluster_id = self.cluster_id,
                    node_id = self.node_id,
                    error = %e,
                    "State machine failed to recover from snapshot"
                );
            }
            return Err(e);
        }

        reader.validate_payload(&header)?;

        let session_count = restored.len();
        *self.sessions.lock() = restored;

        tracing::info!(
            cluster_id = self.cluster_id,
            node_id = self.node_id,
            session_size = header.session_size,
            data_size = header.data_size,
            session_count,
            "Recovered from snapshot"
        );
        Ok(())
    }

    fn stopped_or(&self, err: RsmError) -> RsmError {
        if self.stopper.is_stopped() {
            RsmError::Stopped
        } else {
            err
        }
    }
}

impl std::fmt::Debug for ManagedStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedStateMachine")
            .field("cluster_id", &self.cluster_id)
            .field("node_id", &self.node_id)
            .field("sm", &self.sm)
            .field("status", &*self.status.read())
            .finish()
    }
}

/// Write `data` in full, reporting how far a stalled sink got.
fn write_section<W: Write>(writer: &mut W, data: &[u8]) -> RsmResult<()> {
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => {
                return Err(RsmError::ShortWrite {
                    expected: data.len(),
                    written,
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
