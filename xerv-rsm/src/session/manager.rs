//! Client session registry with snapshot support.

use super::lru::LruSessions;
use super::record::Session;
use crate::config::RsmConfig;
use crate::error::{RsmError, RsmResult};
use crate::types::{ClientId, SeriesId};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// Bytes surrounding the encoded session payload: length prefix and CRC32.
const SESSION_FRAME_OVERHEAD: u64 = 8 + 4;

/// Owns the bounded set of client sessions of one state machine.
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions: LruSessions,
}

impl SessionManager {
    /// Create a manager tracking at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: LruSessions::new(capacity),
        }
    }

    /// Create a manager sized from the configuration.
    pub fn with_config(config: &RsmConfig) -> Self {
        Self::new(config.max_session_count)
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Maximum number of tracked sessions.
    pub fn capacity(&self) -> usize {
        self.sessions.capacity()
    }

    /// Register a client.
    ///
    /// Returns `client_id` when a new session was created, or
    /// [`ClientId::NOOP`] when the client was already registered.
    pub fn register_client_id(&mut self, client_id: ClientId) -> ClientId {
        if let Some(existing) = self.sessions.get_mut(client_id) {
            if existing.client_id() != client_id {
                fatal!(
                    "session lookup for {} returned {}",
                    client_id,
                    existing.client_id()
                );
            }
            tracing::warn!(%client_id, "client already registered");
            return ClientId::NOOP;
        }
        self.sessions.insert(Session::new(client_id));
        client_id
    }

    /// Unregister a client.
    ///
    /// Returns `client_id` when a session was removed, or [`ClientId::NOOP`]
    /// when no such session existed.
    pub fn unregister_client_id(&mut self, client_id: ClientId) -> ClientId {
        match self.sessions.remove(client_id) {
            Some(removed) => {
                if removed.client_id() != client_id {
                    fatal!(
                        "session lookup for {} returned {}",
                        client_id,
                        removed.client_id()
                    );
                }
                client_id
            }
            None => ClientId::NOOP,
        }
    }

    /// Look up the session of a registered client, marking it recently used.
    pub fn client_registered(&mut self, client_id: ClientId) -> Option<&mut Session> {
        let session = self.sessions.get_mut(client_id)?;
        if session.client_id() != client_id {
            fatal!(
                "session lookup for {} returned {}",
                client_id,
                session.client_id()
            );
        }
        Some(session)
    }

    /// Raise the acknowledgement mark of `session`.
    pub fn update_responded_to(session: &mut Session, responded_to: SeriesId) {
        session.clear_to(responded_to);
    }

    /// Hash of all retained session state.
    ///
    /// Sessions are hashed in client ID order so the value does not depend
    /// on recency or insertion order.
    pub fn get_session_hash(&self) -> u64 {
        let mut ordered: Vec<&Session> = self.sessions.iter().collect();
        ordered.sort_by_key(|s| s.client_id());

        let mut encoded = Vec::new();
        for session in ordered {
            // Writing into a Vec cannot fail.
            let _ = session.encode(&mut encoded);
        }

        let digest = Sha256::digest(&encoded);
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(first)
    }

    /// Serialize every session, least recently used first.
    ///
    /// Returns the number of bytes written.
    pub fn save_sessions<W: Write>(&self, writer: &mut W) -> RsmResult<u64> {
        let mut payload = Vec::new();
        payload.write_u64::<LittleEndian>(self.sessions.len() as u64)?;
        for session in self.sessions.iter() {
            session.encode(&mut payload)?;
        }
        let crc = crc32fast::hash(&payload);

        writer.write_u64::<LittleEndian>(payload.len() as u64)?;
        writer.write_all(&payload)?;
        writer.write_u32::<LittleEndian>(crc)?;

        Ok(payload.len() as u64 + SESSION_FRAME_OVERHEAD)
    }

    /// Replace all sessions with those serialized by [`save_sessions`].
    ///
    /// On error the current sessions are left untouched.
    ///
    /// [`save_sessions`]: SessionManager::save_sessions
    pub fn load_sessions<R: Read>(&mut self, reader: &mut R) -> RsmResult<()> {
        let len = reader
            .read_u64::<LittleEndian>()
            .map_err(|e| RsmError::session_data(format!("failed to read length: {}", e)))?;

        let mut payload = Vec::new();
        reader.by_ref().take(len).read_to_end(&mut payload)?;
        if payload.len() as u64 != len {
            return Err(RsmError::session_data(format!(
                "expected {} payload bytes, got {}",
                len,
                payload.len()
            )));
        }

        let stored_crc = reader
            .read_u32::<LittleEndian>()
            .map_err(|e| RsmError::session_data(format!("failed to read checksum: {}", e)))?;
        let computed_crc = crc32fast::hash(&payload);
        if stored_crc != computed_crc {
            return Err(RsmError::session_data(format!(
                "checksum mismatch: expected {}, got {}",
                stored_crc, computed_crc
            )));
        }

        let mut cursor = payload.as_slice();
        let count = cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| RsmError::session_data(format!("failed to read count: {}", e)))?;
        if count > self.sessions.capacity() as u64 {
            return Err(RsmError::session_data(format!(
                "{} sessions exceed capacity {}",
                count,
                self.sessions.capacity()
            )));
        }

        let mut restored = LruSessions::new(self.sessions.capacity());
        for _ in 0..count {
            let session = Session::decode(&mut cursor)?;
            if restored.contains(session.client_id()) {
                return Err(RsmError::session_data(format!(
                    "duplicate session for {}",
                    session.client_id()
                )));
            }
            restored.insert(session);
        }
        if !cursor.is_empty() {
            return Err(RsmError::session_data(format!(
                "{} trailing bytes after sessions",
                cursor.len()
            )));
        }

        self.sessions = restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Dedup;

    #[test]
    fn register_and_unregister() {
        let mut manager = SessionManager::new(8);
        assert_eq!(manager.register_client_id(ClientId::new(7)), ClientId::new(7));
        assert_eq!(manager.register_client_id(ClientId::new(7)), ClientId::NOOP);
        assert_eq!(manager.len(), 1);

        assert_eq!(manager.unregister_client_id(ClientId::new(7)), ClientId::new(7));
        assert_eq!(manager.unregister_client_id(ClientId::new(7)), ClientId::NOOP);
        assert!(manager.client_registered(ClientId::new(7)).is_none());
    }

    #[test]
    fn capacity_evicts_least_recently_touched() {
        let mut manager = SessionManager::new(3);
        for id in 1..=3 {
            manager.register_client_id(ClientId::new(id));
        }
        manager.client_registered(ClientId::new(1));

        manager.register_client_id(ClientId::new(4));
        assert!(manager.client_registered(ClientId::new(2)).is_none());
        for id in [1, 3, 4] {
            assert!(manager.client_registered(ClientId::new(id)).is_some());
        }
    }

    #[test]
    fn hash_ignores_recency() {
        let mut a = SessionManager::new(8);
        let mut b = SessionManager::new(8);
        for id in [1, 2, 3] {
            a.register_client_id(ClientId::new(id));
        }
        for id in [3, 1, 2] {
            b.register_client_id(ClientId::new(id));
        }
        assert_eq!(a.get_session_hash(), b.get_session_hash());

        a.client_registered(ClientId::new(2))
            .unwrap()
            .add_response(SeriesId::new(1), 5);
        assert_ne!(a.get_session_hash(), b.get_session_hash());
    }

    #[test]
    fn save_load_preserves_dedup_and_recency() {
        let mut manager = SessionManager::new(3);
        for id in 1..=3 {
            manager.register_client_id(ClientId::new(id));
        }
        let session = manager.client_registered(ClientId::new(1)).unwrap();
        session.add_response(SeriesId::new(1), 11);
        session.add_response(SeriesId::new(2), 12);
        SessionManager::update_responded_to(session, SeriesId::new(1));

        let mut buf = Vec::new();
        let written = manager.save_sessions(&mut buf).unwrap();
        assert_eq!(written, buf.len() as u64);

        let mut restored = SessionManager::new(3);
        restored.load_sessions(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.get_session_hash(), manager.get_session_hash());

        let session = restored.client_registered(ClientId::new(1)).unwrap();
        assert_eq!(session.update_required(SeriesId::new(1)), Dedup::Responded);
        assert_eq!(session.update_required(SeriesId::new(2)), Dedup::Cached(12));
        assert_eq!(session.update_required(SeriesId::new(3)), Dedup::Required);

        // client 2 was least recently used before the save and still is
        restored.register_client_id(ClientId::new(9));
        assert!(restored.client_registered(ClientId::new(2)).is_none());
    }

    #[test]
    fn load_rejects_corruption_and_keeps_state() {
        let mut manager = SessionManager::new(4);
        manager.register_client_id(ClientId::new(1));
        let mut buf = Vec::new();
        manager.save_sessions(&mut buf).unwrap();
        buf[10] ^= 0xFF;

        let mut target = SessionManager::new(4);
        target.register_client_id(ClientId::new(5));
        let err = target.load_sessions(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, RsmError::SessionData { .. }));
        assert!(target.client_registered(ClientId::new(5)).is_some());
    }

    #[test]
    fn load_rejects_more_sessions_than_capacity() {
        let mut manager = SessionManager::new(4);
        for id in 1..=4 {
            manager.register_client_id(ClientId::new(id));
        }
        let mut buf = Vec::new();
        manager.save_sessions(&mut buf).unwrap();

        let mut small = SessionManager::new(2);
        assert!(matches!(
            small.load_sessions(&mut buf.as_slice()),
            Err(RsmError::SessionData { .. })
        ));
    }

    #[test]
    fn load_rejects_truncated_section() {
        let manager = SessionManager::new(4);
        let mut buf = Vec::new();
        manager.save_sessions(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);

        let mut target = SessionManager::new(4);
        assert!(target.load_sessions(&mut buf.as_slice()).is_err());
    }
}
