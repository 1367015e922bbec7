//! Keyed state machine for live stream sessions
//!
//! Single source of truth for "what should currently be streaming".
//! Holds no network state; all staleness between suspended backend calls
//! is resolved by epoch comparison, never by blocking.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::stream::StreamEndpoints;

/// Identity of one live stream: a device camera channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub imei: String,
    /// 1-based camera channel number as shown to the user (CH1, CH2, ...)
    pub channel: u32,
}

impl SessionKey {
    pub fn new(imei: impl Into<String>, channel: u32) -> Self {
        Self {
            imei: imei.into(),
            channel,
        }
    }

    /// Camera index expected by the backend (CH1 -> 0, CH2 -> 1, ...)
    pub fn camera_index(&self) -> u32 {
        self.channel.saturating_sub(1)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ch{}", self.imei, self.channel)
    }
}

/// Lifecycle state of a session. Idle is represented by absence from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Active,
    Stopping,
    Failed,
}

/// One live stream session per distinct `(imei, channel)`
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub state: SessionState,
    /// Set only while `Active`
    pub stream_url: Option<String>,
    /// Set only while `Active`
    pub hls_url: Option<String>,
    /// Strictly increases per key; a resolution applies only if its captured
    /// epoch still matches
    pub epoch: u64,
    /// Selection-order stamp, stable across state transitions
    pub order: u64,
    /// Present only in `Failed`
    pub last_error: Option<String>,
    pub selected_at: DateTime<Utc>,
}

/// Result of applying a start resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Applied; the session is now `Active`
    Activated,
    /// Applied; the session is now a `Failed` tombstone
    MarkedFailed,
    /// Discarded: a newer request superseded this one. `still_wanted` is
    /// true when the key is currently `Starting` or `Active`, meaning the
    /// newer request owns the backend slot and no corrective stop is needed.
    Stale { still_wanted: bool },
}

/// Per-state session counts for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub starting: usize,
    pub active: usize,
    pub stopping: usize,
    pub failed: usize,
}

/// In-memory registry of stream sessions keyed by `(imei, channel)`
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionKey, Session>,
    next_epoch: u64,
    next_order: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    /// Transition a key toward `Starting`, returning the epoch the caller
    /// must present when resolving.
    ///
    /// An in-flight stop on the same key is superseded locally: its eventual
    /// resolution will find a newer epoch and be discarded. A `Failed`
    /// tombstone is replaced by a fresh selection with a new order stamp.
    pub fn begin_start(&mut self, key: &SessionKey) -> u64 {
        self.next_epoch += 1;
        let epoch = self.next_epoch;

        match self.sessions.get_mut(key) {
            Some(session) => {
                // A tombstone re-selection takes a fresh slot position; a
                // superseded stop keeps its place.
                if session.state == SessionState::Failed {
                    self.next_order += 1;
                    session.order = self.next_order;
                    session.selected_at = Utc::now();
                }
                session.state = SessionState::Starting;
                session.epoch = epoch;
                session.stream_url = None;
                session.hls_url = None;
                session.last_error = None;
            }
            None => {
                self.next_order += 1;
                self.sessions.insert(
                    key.clone(),
                    Session {
                        key: key.clone(),
                        state: SessionState::Starting,
                        stream_url: None,
                        hls_url: None,
                        epoch,
                        order: self.next_order,
                        last_error: None,
                        selected_at: Utc::now(),
                    },
                );
            }
        }

        epoch
    }

    /// Apply a start outcome if the epoch is still current
    pub fn resolve_start(
        &mut self,
        key: &SessionKey,
        epoch: u64,
        result: Result<StreamEndpoints, String>,
    ) -> StartOutcome {
        let Some(session) = self.sessions.get_mut(key) else {
            return StartOutcome::Stale {
                still_wanted: false,
            };
        };

        if session.epoch != epoch {
            let still_wanted = matches!(
                session.state,
                SessionState::Starting | SessionState::Active
            );
            return StartOutcome::Stale { still_wanted };
        }

        match result {
            Ok(endpoints) => {
                session.state = SessionState::Active;
                session.stream_url = Some(endpoints.stream_url);
                session.hls_url = Some(endpoints.hls_url);
                session.last_error = None;
                StartOutcome::Activated
            }
            Err(error) => {
                session.state = SessionState::Failed;
                session.stream_url = None;
                session.hls_url = None;
                session.last_error = Some(error);
                StartOutcome::MarkedFailed
            }
        }
    }

    /// Transition a key toward `Stopping`, returning the epoch for the
    /// resolution. `None` means no session exists and no backend call may
    /// be issued.
    pub fn begin_stop(&mut self, key: &SessionKey) -> Option<u64> {
        let session = self.sessions.get_mut(key)?;

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        session.state = SessionState::Stopping;
        session.epoch = epoch;
        session.stream_url = None;
        session.hls_url = None;

        Some(epoch)
    }

    /// Remove the session if the epoch is still current; returns whether the
    /// removal applied.
    pub fn resolve_stop(&mut self, key: &SessionKey, epoch: u64) -> bool {
        match self.sessions.get(key) {
            Some(session) if session.epoch == epoch => {
                self.sessions.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Sessions eligible for display (`Starting` or `Active`) in selection
    /// order, oldest first
    pub fn list_active(&self) -> Vec<Session> {
        let mut active: Vec<Session> = self
            .sessions
            .values()
            .filter(|s| matches!(s.state, SessionState::Starting | SessionState::Active))
            .cloned()
            .collect();
        active.sort_by_key(|s| s.order);
        active
    }

    /// Keys that may still hold a backend encoder slot
    pub fn keys_holding_streams(&self) -> Vec<SessionKey> {
        let mut keys: Vec<(u64, SessionKey)> = self
            .sessions
            .values()
            .filter(|s| {
                matches!(
                    s.state,
                    SessionState::Starting | SessionState::Active | SessionState::Stopping
                )
            })
            .map(|s| (s.order, s.key.clone()))
            .collect();
        keys.sort_by_key(|(order, _)| *order);
        keys.into_iter().map(|(_, key)| key).collect()
    }

    /// Drop every session without touching the backend. Used by the
    /// process-exit path after detached stops have been dispatched.
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for session in self.sessions.values() {
            match session.state {
                SessionState::Starting => stats.starting += 1,
                SessionState::Active => stats.active += 1,
                SessionState::Stopping => stats.stopping += 1,
                SessionState::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(tag: &str) -> StreamEndpoints {
        StreamEndpoints {
            stream_url: format!("rtmp://host/{}", tag),
            hls_url: format!("http://host/{}.m3u8", tag),
        }
    }

    #[test]
    fn start_resolves_to_active_with_urls() {
        let mut store = SessionStore::new();
        let key = SessionKey::new("123456789012345", 1);

        let epoch = store.begin_start(&key);
        assert_eq!(store.get(&key).unwrap().state, SessionState::Starting);

        let outcome = store.resolve_start(&key, epoch, Ok(endpoints("h1")));
        assert_eq!(outcome, StartOutcome::Activated);

        let session = store.get(&key).unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.hls_url.as_deref(), Some("http://host/h1.m3u8"));
    }

    #[test]
    fn stale_start_is_discarded() {
        let mut store = SessionStore::new();
        let key = SessionKey::new("111", 1);

        let first = store.begin_start(&key);
        let stop_epoch = store.begin_stop(&key).unwrap();

        // The start resolution carries the superseded epoch
        let outcome = store.resolve_start(&key, first, Ok(endpoints("old")));
        assert_eq!(
            outcome,
            StartOutcome::Stale {
                still_wanted: false
            }
        );
        assert_eq!(store.get(&key).unwrap().state, SessionState::Stopping);

        assert!(store.resolve_stop(&key, stop_epoch));
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn restart_supersedes_in_flight_stop() {
        let mut store = SessionStore::new();
        let key = SessionKey::new("111", 2);

        let start1 = store.begin_start(&key);
        let stop = store.begin_stop(&key).unwrap();
        let start2 = store.begin_start(&key);

        // Old start: discarded, but the key is wanted again
        assert_eq!(
            store.resolve_start(&key, start1, Ok(endpoints("a"))),
            StartOutcome::Stale { still_wanted: true }
        );
        // Old stop: discarded, session survives
        assert!(!store.resolve_stop(&key, stop));
        assert!(store.get(&key).is_some());

        // Newest start wins
        assert_eq!(
            store.resolve_start(&key, start2, Ok(endpoints("b"))),
            StartOutcome::Activated
        );
        assert_eq!(
            store.get(&key).unwrap().hls_url.as_deref(),
            Some("http://host/b.m3u8")
        );
    }

    #[test]
    fn failed_start_leaves_tombstone_with_error() {
        let mut store = SessionStore::new();
        let key = SessionKey::new("222", 1);

        let epoch = store.begin_start(&key);
        let outcome = store.resolve_start(&key, epoch, Err("no encoder slot".to_string()));
        assert_eq!(outcome, StartOutcome::MarkedFailed);

        let session = store.get(&key).unwrap();
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.last_error.as_deref(), Some("no encoder slot"));
        assert!(store.list_active().is_empty());
    }

    #[test]
    fn begin_stop_on_missing_key_returns_none() {
        let mut store = SessionStore::new();
        assert!(store.begin_stop(&SessionKey::new("404", 1)).is_none());
    }

    #[test]
    fn list_active_preserves_selection_order() {
        let mut store = SessionStore::new();
        let keys: Vec<SessionKey> = (1..=4).map(|ch| SessionKey::new("555", ch)).collect();
        let epochs: Vec<u64> = keys.iter().map(|k| store.begin_start(k)).collect();

        // Activate out of order; positions must not move
        store.resolve_start(&keys[2], epochs[2], Ok(endpoints("c")));
        store.resolve_start(&keys[0], epochs[0], Ok(endpoints("a")));

        let active: Vec<u32> = store.list_active().iter().map(|s| s.key.channel).collect();
        assert_eq!(active, vec![1, 2, 3, 4]);
    }

    #[test]
    fn epochs_strictly_increase_per_key() {
        let mut store = SessionStore::new();
        let key = SessionKey::new("777", 1);

        let e1 = store.begin_start(&key);
        let e2 = store.begin_stop(&key).unwrap();
        let e3 = store.begin_start(&key);
        assert!(e1 < e2 && e2 < e3);
    }

    #[test]
    fn stats_count_states() {
        let mut store = SessionStore::new();
        let a = SessionKey::new("1", 1);
        let b = SessionKey::new("1", 2);
        let c = SessionKey::new("2", 1);

        let ea = store.begin_start(&a);
        store.begin_start(&b);
        let ec = store.begin_start(&c);

        store.resolve_start(&a, ea, Ok(endpoints("a")));
        store.resolve_start(&c, ec, Err("boom".to_string()));

        let stats = store.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.starting, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.stopping, 0);
    }
}
