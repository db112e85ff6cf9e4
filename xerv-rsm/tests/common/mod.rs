//! Common test utilities for xerv-rsm tests.

use std::path::PathBuf;
use std::sync::Once;
use tempfile::TempDir;
use xerv_rsm::testing::{ConcurrentKvStateMachine, KvStateMachine, Probe};
use xerv_rsm::{
    ClientId, FileCollection, ManagedStateMachine, RsmConfig, SeriesId, StateMachineAdapter,
    SnapshotWriter, StopSignal,
};

static TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per test binary.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Managed sequential key-value machine reporting to `probe`.
#[allow(dead_code)]
pub fn sequential_rsm(probe: &Probe, stop: StopSignal) -> ManagedStateMachine {
    ManagedStateMachine::new(
        1,
        1,
        StateMachineAdapter::sequential(KvStateMachine::with_probe(probe.clone())),
        &RsmConfig::default(),
        stop,
    )
}

/// Managed concurrent key-value machine reporting to `probe`.
#[allow(dead_code)]
pub fn concurrent_rsm(probe: &Probe, stop: StopSignal) -> ManagedStateMachine {
    ManagedStateMachine::new(
        1,
        2,
        StateMachineAdapter::concurrent(ConcurrentKvStateMachine::with_probe(probe.clone())),
        &RsmConfig::default(),
        stop,
    )
}

/// Register `client` and apply `cmd` under `series_id`, honoring dedup.
///
/// Returns the result and whether the command reached the state machine.
#[allow(dead_code)]
pub fn apply(
    rsm: &ManagedStateMachine,
    client: ClientId,
    series_id: SeriesId,
    index: u64,
    cmd: &[u8],
) -> (u64, bool) {
    let mut sessions = rsm.sessions();
    if sessions.client_registered(client).is_none() {
        sessions.register_client_id(client);
    }
    let Some(session) = sessions.client_registered(client) else {
        panic!("{client} not registered");
    };
    let (result, _, must_apply) = session.update_required(series_id).into_parts();
    if !must_apply {
        return (result, false);
    }
    (rsm.update(Some(session), series_id, index, 1, cmd), true)
}

/// Temp directory holding snapshot files for one test.
#[allow(dead_code)]
pub struct SnapshotDir {
    dir: TempDir,
}

#[allow(dead_code)]
impl SnapshotDir {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Path of the snapshot file named `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Save a complete snapshot of `rsm` to `name`, returning its path and
    /// reported size.
    pub fn save(&self, rsm: &ManagedStateMachine, name: &str) -> (PathBuf, u64) {
        let ctx = if rsm.concurrent_snapshot() {
            Some(rsm.prepare_snapshot().expect("prepare"))
        } else {
            None
        };
        let sessions = rsm.get_session_snapshot().expect("session snapshot");
        let mut writer =
            SnapshotWriter::create(self.path(name), StopSignal::new()).expect("create writer");
        let size = rsm
            .save_snapshot(ctx, &mut writer, &sessions, &mut FileCollection::new())
            .expect("save snapshot");
        let path = writer.commit().expect("commit snapshot");
        (path, size)
    }
}
