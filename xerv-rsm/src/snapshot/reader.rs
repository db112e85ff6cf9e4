//! Snapshot reader.

use super::header::{SNAPSHOT_HEADER_SIZE, SnapshotHeader};
use crate::error::{RsmError, RsmResult};
use crate::stop::StopSignal;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Reads a snapshot written by [`SnapshotWriter`](super::SnapshotWriter).
///
/// Reads after [`get_header`](Self::get_header) return payload bytes and
/// feed a running CRC32 that [`validate_payload`](Self::validate_payload)
/// checks against the header.
pub struct SnapshotReader<R: Read + Seek> {
    inner: R,
    hasher: crc32fast::Hasher,
    payload_read: u64,
    stream_len: u64,
    stop: StopSignal,
}

impl SnapshotReader<BufReader<File>> {
    /// Open the snapshot file at `path`.
    pub fn open(path: impl AsRef<Path>, stop: StopSignal) -> RsmResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file), stop)
    }
}

impl<R: Read + Seek> SnapshotReader<R> {
    /// Wrap `inner`.
    pub fn new(mut inner: R, stop: StopSignal) -> RsmResult<Self> {
        let stream_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            payload_read: 0,
            stream_len,
            stop,
        })
    }

    /// Read the header block and position the reader at the payload.
    ///
    /// The header is only decoded here; call
    /// [`validate_header`](Self::validate_header) before trusting it.
    pub fn get_header(&mut self) -> RsmResult<SnapshotHeader> {
        self.stop.check()?;
        if self.stream_len < SNAPSHOT_HEADER_SIZE {
            return Err(RsmError::SnapshotHeader {
                cause: format!("snapshot too small: {} bytes", self.stream_len),
            });
        }

        let mut block = vec![0u8; SNAPSHOT_HEADER_SIZE as usize];
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.read_exact(&mut block)?;
        self.hasher = crc32fast::Hasher::new();
        self.payload_read = 0;

        SnapshotHeader::from_bytes(&block)
    }

    /// Check the header's own integrity and that the sections it describes
    /// fit the snapshot.
    pub fn validate_header(&self, header: &SnapshotHeader) -> RsmResult<()> {
        header.validate()?;
        let available = self.stream_len.saturating_sub(SNAPSHOT_HEADER_SIZE);
        if header.payload_size() != available {
            return Err(RsmError::SnapshotHeader {
                cause: format!(
                    "header describes {} payload bytes, snapshot holds {}",
                    header.payload_size(),
                    available
                ),
            });
        }
        Ok(())
    }

    /// Check the whole payload against the header without consuming it.
    ///
    /// Hashes every payload byte, then rewinds to the start of the payload
    /// so the sections can be read. Run this before applying anything read
    /// from the snapshot.
    pub fn verify_payload(&mut self, header: &SnapshotHeader) -> RsmResult<()> {
        self.rewind_payload()?;
        io::copy(
            &mut (&mut *self).take(header.payload_size()),
            &mut io::sink(),
        )?;
        self.check_payload(header)?;
        self.rewind_payload()
    }

    /// Consume whatever payload remains and check its size and checksum
    /// against the header.
    pub fn validate_payload(&mut self, header: &SnapshotHeader) -> RsmResult<()> {
        io::copy(&mut *self, &mut io::sink())?;
        self.check_payload(header)
    }

    fn check_payload(&self, header: &SnapshotHeader) -> RsmResult<()> {
        if self.payload_read != header.payload_size() {
            return Err(RsmError::SnapshotPayload {
                cause: format!(
                    "expected {} payload bytes, read {}",
                    header.payload_size(),
                    self.payload_read
                ),
            });
        }
        let computed = self.hasher.clone().finalize();
        if computed != header.payload_checksum {
            return Err(RsmError::SnapshotPayload {
                cause: format!(
                    "checksum mismatch: expected {}, got {}",
                    header.payload_checksum, computed
                ),
            });
        }
        Ok(())
    }

    fn rewind_payload(&mut self) -> RsmResult<()> {
        self.stop.check()?;
        self.inner.seek(SeekFrom::Start(SNAPSHOT_HEADER_SIZE))?;
        self.hasher = crc32fast::Hasher::new();
        self.payload_read = 0;
        Ok(())
    }

    /// Payload bytes read so far.
    pub fn payload_read(&self) -> u64 {
        self.payload_read
    }
}

impl<R: Read + Seek> Read for SnapshotReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.stop.is_stopped() {
            return Err(io::Error::other("snapshot stopped"));
        }
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.payload_read += n as u64;
        Ok(n)
    }
}
