//! Reference state machines for tests.
//!
//! Both machines store string pairs set by `key=value` commands. The result
//! of an update is the number of updates applied so far, so repeated
//! application of the same command is observable.

use crate::error::{RsmError, RsmResult};
use crate::statemachine::{
    ConcurrentStateMachine, SnapshotContext, SnapshotFile, SnapshotFileCollection, StateMachine,
};
use crate::stop::StopSignal;
use crate::types::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between a test and the state machine it drives.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    updates: AtomicU64,
    lookups: AtomicU64,
    closes: AtomicU64,
}

impl Probe {
    /// Commands applied.
    pub fn updates(&self) -> u64 {
        self.inner.updates.load(Ordering::SeqCst)
    }

    /// Lookups served.
    pub fn lookups(&self) -> u64 {
        self.inner.lookups.load(Ordering::SeqCst)
    }

    /// Times the state machine was closed.
    pub fn closes(&self) -> u64 {
        self.inner.closes.load(Ordering::SeqCst)
    }

    fn record_update(&self) {
        self.inner.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn record_lookup(&self) {
        self.inner.lookups.fetch_add(1, Ordering::SeqCst);
    }

    fn record_close(&self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct KvState {
    applied: u64,
    data: BTreeMap<String, String>,
}

impl KvState {
    fn apply(&mut self, cmd: &[u8]) -> u64 {
        let cmd = String::from_utf8_lossy(cmd);
        if let Some((key, value)) = cmd.split_once('=') {
            self.data.insert(key.to_string(), value.to_string());
        }
        self.applied += 1;
        self.applied
    }

    fn get(&self, query: &[u8]) -> Vec<u8> {
        let key = String::from_utf8_lossy(query);
        self.data
            .get(&*key)
            .map(|v| v.as_bytes().to_vec())
            .unwrap_or_default()
    }

    fn hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.applied.to_le_bytes());
        for (key, value) in &self.data {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    fn save(&self, writer: &mut dyn Write, stop: &StopSignal) -> RsmResult<()> {
        stop.check()?;
        serde_json::to_writer(&mut *writer, self).map_err(RsmError::state_machine)?;
        writer.flush()?;
        Ok(())
    }

    fn load(reader: &mut dyn Read, stop: &StopSignal) -> RsmResult<Self> {
        stop.check()?;
        serde_json::from_reader(reader).map_err(RsmError::state_machine)
    }
}

/// Sequential key-value state machine.
#[derive(Debug, Default)]
pub struct KvStateMachine {
    state: KvState,
    probe: Probe,
}

impl KvStateMachine {
    /// Create a machine reporting to `probe`.
    pub fn with_probe(probe: Probe) -> Self {
        Self {
            state: KvState::default(),
            probe,
        }
    }
}

impl StateMachine for KvStateMachine {
    fn update(&mut self, cmd: &[u8]) -> u64 {
        self.probe.record_update();
        self.state.apply(cmd)
    }

    fn lookup(&self, query: &[u8]) -> Vec<u8> {
        self.probe.record_lookup();
        self.state.get(query)
    }

    fn save_snapshot(
        &self,
        writer: &mut dyn Write,
        _files: &mut dyn SnapshotFileCollection,
        stop: &StopSignal,
    ) -> RsmResult<()> {
        self.state.save(writer, stop)
    }

    fn recover_from_snapshot(
        &mut self,
        reader: &mut dyn Read,
        _files: &[SnapshotFile],
        stop: &StopSignal,
    ) -> RsmResult<()> {
        self.state = KvState::load(reader, stop)?;
        Ok(())
    }

    fn get_hash(&self) -> u64 {
        self.state.hash()
    }

    fn close(&mut self) {
        self.probe.record_close();
    }
}

/// Key-value state machine supporting snapshots concurrent with updates.
///
/// `prepare_snapshot` clones the current state; the clone is what a later
/// save writes, whatever updates land in between.
#[derive(Debug, Default)]
pub struct ConcurrentKvStateMachine {
    state: RwLock<KvState>,
    probe: Probe,
}

impl ConcurrentKvStateMachine {
    /// Create a machine reporting to `probe`.
    pub fn with_probe(probe: Probe) -> Self {
        Self {
            state: RwLock::new(KvState::default()),
            probe,
        }
    }
}

impl ConcurrentStateMachine for ConcurrentKvStateMachine {
    fn update(&self, mut entries: Vec<Entry>) -> Vec<Entry> {
        let mut state = self.state.write();
        for entry in &mut entries {
            self.probe.record_update();
            entry.result = state.apply(&entry.cmd);
        }
        entries
    }

    fn lookup(&self, query: &[u8]) -> RsmResult<Vec<u8>> {
        self.probe.record_lookup();
        Ok(self.state.read().get(query))
    }

    fn prepare_snapshot(&self) -> RsmResult<SnapshotContext> {
        Ok(Box::new(self.state.read().clone()))
    }

    fn save_snapshot(
        &self,
        ctx: SnapshotContext,
        writer: &mut dyn Write,
        _files: &mut dyn SnapshotFileCollection,
        stop: &StopSignal,
    ) -> RsmResult<()> {
        let state = ctx
            .downcast::<KvState>()
            .map_err(|_| RsmError::state_machine("unexpected snapshot context"))?;
        state.save(writer, stop)
    }

    fn recover_from_snapshot(
        &self,
        reader: &mut dyn Read,
        _files: &[SnapshotFile],
        stop: &StopSignal,
    ) -> RsmResult<()> {
        let recovered = KvState::load(reader, stop)?;
        *self.state.write() = recovered;
        Ok(())
    }

    fn get_hash(&self) -> u64 {
        self.state.read().hash()
    }

    fn close(&self) {
        self.probe.record_close();
    }
}
