//! Replicated state machine support for XERV.
//!
//! This crate sits between the consensus engine's commit pipeline and a
//! user-supplied application state machine. It provides:
//!
//! - A uniform calling convention over sequential and concurrent-capable
//!   state machines ([`StateMachineAdapter`])
//! - Exactly-once application of client commands via session tracking
//!   ([`SessionManager`])
//! - Coordinated teardown of an instance shared by several workers
//!   ([`OffloadedStatus`])
//! - The on-disk snapshot format: session section, application section and
//!   an integrity header ([`SnapshotWriter`], [`SnapshotReader`])
//!
//! # Architecture
//!
//! ```text
//!   commit worker ──► ManagedStateMachine ──► StateMachineAdapter ──► user SM
//!                        │        │
//!                        │        └──► SessionManager (LRU of Sessions)
//!                        │
//!   node host ───────────┤
//!   step worker ─────────┤  load / offload  ──► OffloadedStatus
//!   snapshot worker ─────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use xerv_rsm::{ManagedStateMachine, RsmConfig, StateMachineAdapter, StopSignal};
//!
//! let adapter = StateMachineAdapter::sequential(MyStateMachine::default());
//! let msm = ManagedStateMachine::new(1, 1, adapter, &RsmConfig::default(), StopSignal::new());
//!
//! let client = msm.sessions().register_client_id(7.into());
//! let result = {
//!     let mut sessions = msm.sessions();
//!     let session = sessions.client_registered(7.into()).expect("registered");
//!     msm.update(Some(session), 1.into(), 10, 2, b"set x 1")
//! };
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Log an invariant violation and abort.
///
/// Used for contract breaches that would let replicas diverge if tolerated.
macro_rules! fatal {
    ($($arg:tt)+) => {{
        let message = format!($($arg)+);
        tracing::error!(%message, "state machine invariant violated");
        panic!("{}", message);
    }};
}

pub mod config;
pub mod error;
pub mod managed;
pub mod offload;
pub mod session;
pub mod snapshot;
pub mod statemachine;
pub mod stop;
pub mod testing;
pub mod types;

pub use config::{LRU_MAX_SESSION_COUNT, RsmConfig};
pub use error::{RsmError, RsmResult};
pub use managed::ManagedStateMachine;
pub use offload::{Component, OffloadedStatus};
pub use session::{Session, SessionManager};
pub use snapshot::{SNAPSHOT_HEADER_SIZE, SnapshotHeader, SnapshotReader, SnapshotWriter};
pub use statemachine::{
    ConcurrentStateMachine, FileCollection, SnapshotContext, SnapshotFile,
    SnapshotFileCollection, StateMachine, StateMachineAdapter,
};
pub use stop::StopSignal;
pub use types::{ClientId, Entry, SeriesId};
