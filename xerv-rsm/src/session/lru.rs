//! Bounded, least-recently-used collection of client sessions.
//!
//! Sessions live in a slab of nodes linked into a recency list. The map
//! gives O(1) lookup by client ID and the list gives O(1) touch and
//! eviction.

use super::record::Session;
use crate::types::ClientId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Node {
    session: Session,
    /// Neighbour towards the most recently used end.
    newer: Option<usize>,
    /// Neighbour towards the least recently used end.
    older: Option<usize>,
}

/// Sessions keyed by client ID, bounded by a fixed capacity.
#[derive(Debug, Clone)]
pub struct LruSessions {
    capacity: usize,
    index: HashMap<ClientId, usize>,
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    newest: Option<usize>,
    oldest: Option<usize>,
}

impl LruSessions {
    /// Create an empty collection holding at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            fatal!("session capacity must be > 0");
        }
        Self {
            capacity,
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            newest: None,
            oldest: None,
        }
    }

    /// Maximum number of sessions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no session is tracked.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether a session exists for `client_id`. Does not touch recency.
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.index.contains_key(&client_id)
    }

    /// Look up a session without touching recency.
    pub fn peek(&self, client_id: ClientId) -> Option<&Session> {
        let slot = *self.index.get(&client_id)?;
        self.slots[slot].as_ref().map(|node| &node.session)
    }

    /// Look up a session and mark it most recently used.
    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut Session> {
        let slot = *self.index.get(&client_id)?;
        self.unlink(slot);
        self.push_newest(slot);
        self.slots[slot].as_mut().map(|node| &mut node.session)
    }

    /// Insert a session as the most recently used one.
    ///
    /// Replaces an existing session for the same client. Returns the session
    /// evicted to make room, if any.
    pub fn insert(&mut self, session: Session) -> Option<Session> {
        let client_id = session.client_id();
        if let Some(&slot) = self.index.get(&client_id) {
            if let Some(node) = self.slots[slot].as_mut() {
                node.session = session;
            }
            self.unlink(slot);
            self.push_newest(slot);
            return None;
        }

        let evicted = if self.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let node = Node {
            session,
            newer: None,
            older: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.index.insert(client_id, slot);
        self.push_newest(slot);
        evicted
    }

    /// Remove the session for `client_id`.
    pub fn remove(&mut self, client_id: ClientId) -> Option<Session> {
        let slot = self.index.remove(&client_id)?;
        self.unlink(slot);
        self.free.push(slot);
        self.slots[slot].take().map(|node| node.session)
    }

    /// Iterate from the least to the most recently used session.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            sessions: self,
            cursor: self.oldest,
        }
    }

    fn evict_oldest(&mut self) -> Option<Session> {
        let slot = self.oldest?;
        let client_id = self.slots[slot].as_ref()?.session.client_id();
        let evicted = self.remove(client_id);
        tracing::debug!(%client_id, capacity = self.capacity, "evicted least recently used session");
        evicted
    }

    fn unlink(&mut self, slot: usize) {
        let (newer, older) = match self.slots[slot].as_ref() {
            Some(node) => (node.newer, node.older),
            None => return,
        };

        match newer {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.older = older;
                }
            }
            None => self.newest = older,
        }
        match older {
            Some(o) => {
                if let Some(node) = self.slots[o].as_mut() {
                    node.newer = newer;
                }
            }
            None => self.oldest = newer,
        }

        if let Some(node) = self.slots[slot].as_mut() {
            node.newer = None;
            node.older = None;
        }
    }

    fn push_newest(&mut self, slot: usize) {
        let previous = self.newest;
        if let Some(node) = self.slots[slot].as_mut() {
            node.newer = None;
            node.older = previous;
        }
        if let Some(p) = previous {
            if let Some(node) = self.slots[p].as_mut() {
                node.newer = Some(slot);
            }
        }
        self.newest = Some(slot);
        if self.oldest.is_none() {
            self.oldest = Some(slot);
        }
    }
}

/// Iterator over sessions from least to most recently used.
pub struct Iter<'a> {
    sessions: &'a LruSessions,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Session;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.sessions.slots[self.cursor?].as_ref()?;
        self.cursor = node.newer;
        Some(&node.session)
    }
}
