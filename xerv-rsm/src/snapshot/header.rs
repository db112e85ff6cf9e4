//! Fixed-size snapshot header.

use crate::error::{RsmError, RsmResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Write;

/// Size of the region reserved for the header at the start of a snapshot.
pub const SNAPSHOT_HEADER_SIZE: u64 = 1024;

/// Snapshot file format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Magic bytes for snapshot files.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"XRSM";

/// Bytes covered by the header checksum: magic, version, two sizes, payload CRC.
const HEADER_FIELDS_LEN: usize = 4 + 4 + 8 + 8 + 4;

/// Header describing the two payload sections of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes as read.
    pub magic: [u8; 4],
    /// Format version.
    pub version: u32,
    /// Size of the session section in bytes.
    pub session_size: u64,
    /// Size of the application section in bytes.
    pub data_size: u64,
    /// CRC32 over both sections.
    pub payload_checksum: u32,
    /// CRC32 over the fields above.
    pub header_checksum: u32,
}

impl SnapshotHeader {
    /// Create a header for a payload of the given shape.
    pub fn new(session_size: u64, data_size: u64, payload_checksum: u32) -> Self {
        let mut header = Self {
            magic: *SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            session_size,
            data_size,
            payload_checksum,
            header_checksum: 0,
        };
        header.header_checksum = crc32fast::hash(&header.fields());
        header
    }

    /// Total size of both payload sections.
    pub fn payload_size(&self) -> u64 {
        self.session_size.saturating_add(self.data_size)
    }

    /// Check magic, version and header checksum.
    pub fn validate(&self) -> RsmResult<()> {
        if &self.magic != SNAPSHOT_MAGIC {
            return Err(RsmError::SnapshotHeader {
                cause: "invalid snapshot magic".to_string(),
            });
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(RsmError::SnapshotHeader {
                cause: format!("unsupported snapshot version: {}", self.version),
            });
        }
        let computed = crc32fast::hash(&self.fields());
        if computed != self.header_checksum {
            return Err(RsmError::SnapshotHeader {
                cause: format!(
                    "header checksum mismatch: expected {}, got {}",
                    self.header_checksum, computed
                ),
            });
        }
        Ok(())
    }

    /// Encode into a zero-padded block of [`SNAPSHOT_HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut block = vec![0u8; SNAPSHOT_HEADER_SIZE as usize];
        let fields = self.fields();
        block[..HEADER_FIELDS_LEN].copy_from_slice(&fields);
        block[HEADER_FIELDS_LEN..HEADER_FIELDS_LEN + 4]
            .copy_from_slice(&self.header_checksum.to_le_bytes());
        block
    }

    /// Decode a header block without validating it.
    pub fn from_bytes(bytes: &[u8]) -> RsmResult<Self> {
        if bytes.len() < HEADER_FIELDS_LEN + 4 {
            return Err(RsmError::SnapshotHeader {
                cause: format!("header too small: {} bytes", bytes.len()),
            });
        }
        let mut cursor = bytes;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&cursor[..4]);
        cursor = &cursor[4..];

        // Length was checked above, so these reads cannot run out of input.
        let version = cursor.read_u32::<LittleEndian>()?;
        let session_size = cursor.read_u64::<LittleEndian>()?;
        let data_size = cursor.read_u64::<LittleEndian>()?;
        let payload_checksum = cursor.read_u32::<LittleEndian>()?;
        let header_checksum = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            magic,
            version,
            session_size,
            data_size,
            payload_checksum,
            header_checksum,
        })
    }

    fn fields(&self) -> [u8; HEADER_FIELDS_LEN] {
        let mut out = [0u8; HEADER_FIELDS_LEN];
        let mut cursor = &mut out[..];
        // Fixed-size buffer sized for exactly these fields.
        let _ = cursor.write_all(&self.magic);
        let _ = cursor.write_u32::<LittleEndian>(self.version);
        let _ = cursor.write_u64::<LittleEndian>(self.session_size);
        let _ = cursor.write_u64::<LittleEndian>(self.data_size);
        let _ = cursor.write_u32::<LittleEndian>(self.payload_checksum);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_validate() {
        let header = SnapshotHeader::new(100, 2000, 0xDEADBEEF);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len() as u64, SNAPSHOT_HEADER_SIZE);

        let decoded = SnapshotHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.validate().is_ok());
        assert_eq!(decoded.payload_size(), 2100);
    }

    #[test]
    fn zeroed_block_fails_validation() {
        let header = SnapshotHeader::from_bytes(&[0u8; SNAPSHOT_HEADER_SIZE as usize]).unwrap();
        assert!(matches!(
            header.validate(),
            Err(RsmError::SnapshotHeader { .. })
        ));
    }

    #[test]
    fn corrupted_size_fails_checksum() {
        let mut bytes = SnapshotHeader::new(1, 2, 3).to_bytes();
        bytes[8] ^= 0x01;
        let header = SnapshotHeader::from_bytes(&bytes).unwrap();
        let err = header.validate().unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut header = SnapshotHeader::new(1, 2, 3);
        header.version = 9;
        header.header_checksum = crc32fast::hash(&header.fields());
        let err = header.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot version"));
    }

    #[test]
    fn short_block_is_rejected() {
        assert!(SnapshotHeader::from_bytes(&[0u8; 8]).is_err());
    }
}
