//! Property-based tests for session deduplication.
//!
//! These verify that dedup outcomes survive repeated application,
//! acknowledgement and a save/load cycle, and that capacity eviction
//! always removes the least recently used client.

use proptest::prelude::*;
use std::collections::BTreeMap;
use xerv_rsm::session::Dedup;
use xerv_rsm::{ClientId, SeriesId, SessionManager};

/// Generate (client, series, result) applications over a small id space so
/// collisions happen.
fn arb_applications() -> impl Strategy<Value = Vec<(u64, u64, u64)>> {
    prop::collection::vec((1u64..8, 1u64..32, any::<u64>()), 0..64)
}

/// Apply each command once, honoring dedup, and return what was recorded.
fn apply_all(
    manager: &mut SessionManager,
    applications: &[(u64, u64, u64)],
) -> BTreeMap<(u64, u64), u64> {
    let mut recorded = BTreeMap::new();
    for &(client, series, result) in applications {
        let client_id = ClientId::new(client);
        if manager.client_registered(client_id).is_none() {
            manager.register_client_id(client_id);
        }
        let session = manager
            .client_registered(client_id)
            .expect("client just registered");
        if session.update_required(SeriesId::new(series)).must_apply() {
            session.add_response(SeriesId::new(series), result);
            recorded.insert((client, series), result);
        }
    }
    recorded
}

proptest! {
    /// Property: a recorded result is returned for every later retry.
    #[test]
    fn dedup_is_idempotent(applications in arb_applications()) {
        let mut manager = SessionManager::new(16);
        let recorded = apply_all(&mut manager, &applications);

        for (&(client, series), &result) in &recorded {
            let session = manager.client_registered(ClientId::new(client)).unwrap();
            prop_assert_eq!(
                session.update_required(SeriesId::new(series)),
                Dedup::Cached(result)
            );
        }
    }

    /// Property: the acknowledgement mark never decreases and everything at
    /// or below it reports as responded without a result.
    #[test]
    fn responded_to_is_monotonic(
        marks in prop::collection::vec(0u64..64, 1..32),
        series in 1u64..64,
    ) {
        let mut manager = SessionManager::new(4);
        let client = ClientId::new(1);
        manager.register_client_id(client);
        let session = manager.client_registered(client).unwrap();
        session.add_response(SeriesId::new(series), 7);

        let mut highest = 0;
        for mark in marks {
            SessionManager::update_responded_to(session, SeriesId::new(mark));
            highest = highest.max(mark);
            prop_assert_eq!(session.responded_to(), SeriesId::new(highest));
        }

        let outcome = session.update_required(SeriesId::new(series));
        if series <= highest {
            prop_assert_eq!(outcome.into_parts(), (0, true, false));
            prop_assert!(session.get_response(SeriesId::new(series)).is_none());
        } else {
            prop_assert_eq!(outcome, Dedup::Cached(7));
        }
    }

    /// Property: saving and loading preserves every dedup outcome.
    #[test]
    fn save_load_preserves_dedup(
        applications in arb_applications(),
        acks in prop::collection::vec((1u64..8, 0u64..32), 0..8),
    ) {
        let mut manager = SessionManager::new(16);
        apply_all(&mut manager, &applications);
        for (client, mark) in acks {
            if let Some(session) = manager.client_registered(ClientId::new(client)) {
                SessionManager::update_responded_to(session, SeriesId::new(mark));
            }
        }

        let mut buf = Vec::new();
        let written = manager.save_sessions(&mut buf).unwrap();
        prop_assert_eq!(written, buf.len() as u64);

        let mut restored = SessionManager::new(16);
        restored.load_sessions(&mut buf.as_slice()).unwrap();
        prop_assert_eq!(restored.len(), manager.len());
        prop_assert_eq!(restored.get_session_hash(), manager.get_session_hash());

        for client in 1u64..8 {
            let client_id = ClientId::new(client);
            let before = manager.client_registered(client_id).map(|s| {
                (1u64..32)
                    .map(|series| s.update_required(SeriesId::new(series)))
                    .collect::<Vec<_>>()
            });
            let after = restored.client_registered(client_id).map(|s| {
                (1u64..32)
                    .map(|series| s.update_required(SeriesId::new(series)))
                    .collect::<Vec<_>>()
            });
            prop_assert_eq!(before, after);
        }
    }

    /// Property: one client past capacity evicts exactly the least recently
    /// touched session.
    #[test]
    fn capacity_evicts_least_recently_used(
        capacity in 1usize..16,
        touched in prop::collection::vec(0usize..16, 0..16),
    ) {
        let mut manager = SessionManager::new(capacity);
        let mut order: Vec<u64> = Vec::new();
        for client in 1..=capacity as u64 {
            manager.register_client_id(ClientId::new(client));
            order.push(client);
        }
        for t in touched {
            let client = (t % capacity) as u64 + 1;
            prop_assert!(manager.client_registered(ClientId::new(client)).is_some());
            order.retain(|&c| c != client);
            order.push(client);
        }

        let newcomer = ClientId::new(capacity as u64 + 1);
        prop_assert_eq!(manager.register_client_id(newcomer), newcomer);
        prop_assert_eq!(manager.len(), capacity);

        let evicted = order[0];
        prop_assert!(manager.client_registered(ClientId::new(evicted)).is_none());
        for &survivor in &order[1..] {
            prop_assert!(manager.client_registered(ClientId::new(survivor)).is_some());
        }
    }
}
