//! Application state machine contracts and the adapter over them.
//!
//! ## Module Structure
//!
//! - `traits`: `StateMachine` and `ConcurrentStateMachine`
//! - `adapter`: `StateMachineAdapter`, the single call surface
//! - `files`: External files shipped alongside a snapshot

mod adapter;
mod files;
mod traits;

pub use adapter::{ConcurrentAdapter, SequentialAdapter, StateMachineAdapter};
pub use files::{FileCollection, SnapshotFile, SnapshotFileCollection};
pub use traits::{ConcurrentStateMachine, SnapshotContext, StateMachine};
