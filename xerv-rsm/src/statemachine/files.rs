//! External files referenced by a snapshot.

use std::collections::HashSet;
use std::path::PathBuf;

/// A file that lives next to a snapshot and is shipped with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    /// Identifier assigned by the state machine.
    pub file_id: u64,
    /// Location of the file.
    pub filepath: PathBuf,
    /// Application-defined metadata.
    pub metadata: Vec<u8>,
}

/// Sink for files a state machine registers while saving a snapshot.
pub trait SnapshotFileCollection {
    /// Register a file with the snapshot being written.
    fn add_file(&mut self, file_id: u64, path: PathBuf, metadata: Vec<u8>);
}

/// In-order collection of registered snapshot files.
#[derive(Debug, Default)]
pub struct FileCollection {
    files: Vec<SnapshotFile>,
    ids: HashSet<u64>,
}

impl FileCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered files in registration order.
    pub fn files(&self) -> &[SnapshotFile] {
        &self.files
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no file has been registered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Consume the collection.
    pub fn into_files(self) -> Vec<SnapshotFile> {
        self.files
    }
}

impl SnapshotFileCollection for FileCollection {
    fn add_file(&mut self, file_id: u64, path: PathBuf, metadata: Vec<u8>) {
        if !self.ids.insert(file_id) {
            fatal!("snapshot file {} added twice", file_id);
        }
        self.files.push(SnapshotFile {
            file_id,
            filepath: path,
            metadata,
        });
    }
}
