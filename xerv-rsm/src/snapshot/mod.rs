//! On-disk snapshot format.
//!
//! ```text
//! ┌──────────────────────────────┐ 0
//! │ header (SNAPSHOT_HEADER_SIZE)│  magic, version, section sizes,
//! │                              │  payload CRC32, header CRC32
//! ├──────────────────────────────┤ SNAPSHOT_HEADER_SIZE
//! │ session section              │  len u64 | sessions | CRC32
//! ├──────────────────────────────┤
//! │ application section          │  written by the user state machine
//! └──────────────────────────────┘
//! ```
//!
//! The header region is reserved up front and filled in last, once the
//! sizes of both sections are known. All integers are little-endian.
//!
//! The header sits at offset zero but is the last thing written, so a file
//! whose writer died part way keeps a zeroed header and is rejected on read;
//! that ordering is what makes a valid header imply a complete payload.

mod header;
mod reader;
mod writer;

pub use header::{SNAPSHOT_HEADER_SIZE, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, SnapshotHeader};
pub use reader::SnapshotReader;
pub use writer::SnapshotWriter;
