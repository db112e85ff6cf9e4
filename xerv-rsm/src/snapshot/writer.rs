//! Snapshot writer.

use super::header::{SNAPSHOT_HEADER_SIZE, SnapshotHeader};
use crate::error::{RsmError, RsmResult};
use crate::stop::StopSignal;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Writes a snapshot: a reserved header region followed by the session
/// and application sections.
///
/// Every payload byte passes through a running CRC32. The header is
/// written last by [`save_header`](Self::save_header), once both section
/// sizes are known.
pub struct SnapshotWriter<W: Write + Seek> {
    inner: W,
    hasher: crc32fast::Hasher,
    payload_size: u64,
    stop: StopSignal,
    header_saved: bool,
    paths: Option<(PathBuf, PathBuf)>,
}

impl SnapshotWriter<BufWriter<File>> {
    /// Create a snapshot file at `path`.
    ///
    /// Data goes to a temporary file next to `path` until
    /// [`commit`](Self::commit) renames it into place.
    pub fn create(path: impl AsRef<Path>, stop: StopSignal) -> RsmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let temp_path = path.with_extension("tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;

        let mut writer = Self::new(BufWriter::new(file), stop)?;
        writer.paths = Some((temp_path, path));
        Ok(writer)
    }

    /// Flush, sync and atomically move the snapshot to its final path.
    pub fn commit(mut self) -> RsmResult<PathBuf> {
        if !self.header_saved {
            return Err(RsmError::SnapshotHeader {
                cause: "header not saved".to_string(),
            });
        }
        self.inner.flush()?;
        self.inner.get_ref().sync_all()?;

        let Some((temp_path, path)) = self.paths.take() else {
            return Err(RsmError::Config(
                "snapshot writer has no target path".to_string(),
            ));
        };
        fs::rename(&temp_path, &path)?;

        tracing::debug!(
            path = %path.display(),
            payload_size = self.payload_size,
            "Snapshot committed"
        );
        Ok(path)
    }
}

impl<W: Write + Seek> SnapshotWriter<W> {
    /// Wrap `inner`, reserving the header region at its start.
    pub fn new(mut inner: W, stop: StopSignal) -> RsmResult<Self> {
        inner.seek(SeekFrom::Start(0))?;
        inner.write_all(&[0u8; SNAPSHOT_HEADER_SIZE as usize])?;
        Ok(Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            payload_size: 0,
            stop,
            header_saved: false,
            paths: None,
        })
    }

    /// Bytes written after the header region so far.
    pub fn payload_size(&self) -> u64 {
        self.payload_size
    }

    /// Write the header describing the payload written so far.
    ///
    /// `session_size + data_size` must equal the bytes written.
    pub fn save_header(&mut self, session_size: u64, data_size: u64) -> RsmResult<()> {
        self.stop.check()?;
        let expected = session_size.saturating_add(data_size);
        if expected != self.payload_size {
            return Err(RsmError::SnapshotPayload {
                cause: format!(
                    "section sizes sum to {}, but {} bytes were written",
                    expected, self.payload_size
                ),
            });
        }

        let header = SnapshotHeader::new(session_size, data_size, self.hasher.clone().finalize());
        self.inner.flush()?;
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(&header.to_bytes())?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        self.header_saved = true;

        tracing::trace!(session_size, data_size, "Snapshot header saved");
        Ok(())
    }

    /// Whether [`save_header`](Self::save_header) has completed.
    pub fn header_saved(&self) -> bool {
        self.header_saved
    }

    /// Unwrap the underlying sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek> Write for SnapshotWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stop.is_stopped() {
            return Err(io::Error::other("snapshot stopped"));
        }
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.payload_size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
