//! Reference tracking across the components sharing a managed state machine.
//!
//! Four components hold references to a managed state machine: the node
//! host that owns it and the step, commit and snapshot workers that borrow
//! it. Each reports when it loads and offloads the instance. Once every
//! component has offloaded, the instance is ready to be destroyed.
//!
//! ```text
//!   Active ──(all four offloaded)──► Ready ──(destroy)──► Destroyed
//! ```

use crate::error::RsmError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A component that can load or offload a managed state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// The node host owning the instance.
    NodeHost,
    /// The worker stepping raft nodes.
    StepWorker,
    /// The worker applying committed entries.
    CommitWorker,
    /// The worker saving and recovering snapshots.
    SnapshotWorker,
}

impl Component {
    /// All components, in identifier order.
    pub const ALL: [Component; 4] = [
        Component::NodeHost,
        Component::StepWorker,
        Component::CommitWorker,
        Component::SnapshotWorker,
    ];

    /// Raw identifier of the component.
    pub fn as_u64(self) -> u64 {
        match self {
            Component::NodeHost => 0,
            Component::StepWorker => 1,
            Component::CommitWorker => 2,
            Component::SnapshotWorker => 3,
        }
    }
}

impl TryFrom<u64> for Component {
    type Error = RsmError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Component::NodeHost),
            1 => Ok(Component::StepWorker),
            2 => Ok(Component::CommitWorker),
            3 => Ok(Component::SnapshotWorker),
            other => Err(RsmError::UnknownComponent(other)),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::NodeHost => "node_host",
            Component::StepWorker => "step_worker",
            Component::CommitWorker => "commit_worker",
            Component::SnapshotWorker => "snapshot_worker",
        };
        f.write_str(name)
    }
}

/// Load and offload flags of a managed state machine.
///
/// Not synchronized; the owner guards it together with the destroyed flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffloadedStatus {
    destroyed: bool,
    ready_to_destroy: bool,
    offloaded_from_node_host: bool,
    offloaded_from_step_worker: bool,
    offloaded_from_commit_worker: bool,
    offloaded_from_snapshot_worker: bool,
    loaded_by_step_worker: bool,
    loaded_by_commit_worker: bool,
    loaded_by_snapshot_worker: bool,
}

impl OffloadedStatus {
    /// Create a status with no component loaded or offloaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every component has offloaded the instance.
    pub fn ready_to_destroy(&self) -> bool {
        self.ready_to_destroy
    }

    /// Whether the instance has been destroyed.
    pub fn destroyed(&self) -> bool {
        self.destroyed
    }

    /// Mark the instance destroyed.
    pub fn set_destroyed(&mut self) {
        self.destroyed = true;
    }

    /// Whether `component` has offloaded the instance.
    pub fn offloaded_from(&self, component: Component) -> bool {
        match component {
            Component::NodeHost => self.offloaded_from_node_host,
            Component::StepWorker => self.offloaded_from_step_worker,
            Component::CommitWorker => self.offloaded_from_commit_worker,
            Component::SnapshotWorker => self.offloaded_from_snapshot_worker,
        }
    }

    /// Whether `component` has reported loading the instance.
    pub fn loaded_by(&self, component: Component) -> bool {
        match component {
            Component::NodeHost => false,
            Component::StepWorker => self.loaded_by_step_worker,
            Component::CommitWorker => self.loaded_by_commit_worker,
            Component::SnapshotWorker => self.loaded_by_snapshot_worker,
        }
    }

    /// Record that `component` loaded the instance.
    ///
    /// # Panics
    ///
    /// Panics when called for the node host, or for any worker after the
    /// node host has offloaded.
    pub fn set_loaded(&mut self, component: Component) {
        if self.offloaded_from_node_host && component != Component::NodeHost {
            fatal!("loaded from {} after offloaded from node_host", component);
        }
        match component {
            Component::NodeHost => {
                fatal!("node_host is not expected to report loaded");
            }
            Component::StepWorker => self.loaded_by_step_worker = true,
            Component::CommitWorker => self.loaded_by_commit_worker = true,
            Component::SnapshotWorker => self.loaded_by_snapshot_worker = true,
        }
    }

    /// Record that `component` offloaded the instance.
    ///
    /// When the node host offloads, workers that never loaded the instance
    /// count as offloaded too.
    pub fn set_offloaded(&mut self, component: Component) {
        match component {
            Component::NodeHost => self.offloaded_from_node_host = true,
            Component::StepWorker => self.offloaded_from_step_worker = true,
            Component::CommitWorker => self.offloaded_from_commit_worker = true,
            Component::SnapshotWorker => self.offloaded_from_snapshot_worker = true,
        }

        if component == Component::NodeHost {
            if !self.loaded_by_step_worker {
                self.offloaded_from_step_worker = true;
            }
            if !self.loaded_by_commit_worker {
                self.offloaded_from_commit_worker = true;
            }
            if !self.loaded_by_snapshot_worker {
                self.offloaded_from_snapshot_worker = true;
            }
        }

        if Component::ALL.iter().all(|&c| self.offloaded_from(c)) {
            self.ready_to_destroy = true;
        }
    }
}
