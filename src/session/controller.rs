//! Translates channel selection toggles into session transitions and
//! backend stream calls, resolving races through epoch comparison.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::stream::{StreamBackend, StreamEndpoints, StreamError};

use super::events::{EventChannel, SessionEvent};
use super::store::{Session, SessionKey, SessionState, SessionStats, SessionStore, StartOutcome};

/// Drives the session store from user selection/deselection events.
///
/// No backend call is ever cancelled in flight; every resolution checks
/// whether it is still wanted via its captured epoch and compensates with a
/// corrective stop when a stale start success would otherwise leak a stream.
pub struct SelectionController {
    store: Arc<Mutex<SessionStore>>,
    backend: Arc<dyn StreamBackend>,
    events: EventChannel,
    call_timeout: Duration,
}

impl SelectionController {
    pub fn new(
        store: Arc<Mutex<SessionStore>>,
        backend: Arc<dyn StreamBackend>,
        events: EventChannel,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            events,
            call_timeout,
        }
    }

    /// Select a device channel for live viewing.
    ///
    /// No-op when the key is already `Starting` or `Active`. Otherwise the
    /// store transitions toward `Starting` and a backend start is awaited
    /// under a bounded timeout; the outcome is applied only if nothing
    /// superseded the request meanwhile.
    pub async fn select(&self, imei: &str, channel: u32) -> Result<()> {
        let key = SessionKey::new(imei, channel);

        let epoch = {
            let mut store = self.store.lock().await;
            match store.get(&key).map(|s| s.state.clone()) {
                Some(SessionState::Starting) | Some(SessionState::Active) => {
                    debug!("channel {} already selected, ignoring", key);
                    return Ok(());
                }
                _ => store.begin_start(&key),
            }
        };

        info!("starting stream for {}", key);
        let result = self.call_start(&key).await;
        let resolution = match &result {
            Ok(endpoints) => Ok(endpoints.clone()),
            Err(e) => Err(e.to_string()),
        };

        let outcome = {
            let mut store = self.store.lock().await;
            store.resolve_start(&key, epoch, resolution)
        };

        match outcome {
            StartOutcome::Activated => {
                if let Ok(endpoints) = result {
                    info!("stream active for {}: {}", key, endpoints.hls_url);
                    self.emit(SessionEvent::StreamStarted {
                        key: key.clone(),
                        hls_url: endpoints.hls_url,
                    });
                }
                self.emit(SessionEvent::GridChanged);
            }
            StartOutcome::MarkedFailed => {
                let error = result.err().map(|e| e.to_string()).unwrap_or_default();
                warn!("stream start failed for {}: {}", key, error);
                self.emit(SessionEvent::StreamFailed {
                    key: key.clone(),
                    error,
                });
                self.emit(SessionEvent::GridChanged);
            }
            StartOutcome::Stale { still_wanted } => {
                debug!("discarding stale start result for {}", key);
                // A stale success for a key nobody wants anymore holds a
                // backend encoder slot; release it.
                if !still_wanted && result.is_ok() {
                    if let Err(e) = self.backend.stop(&key.imei).await {
                        warn!("corrective stop for {} failed: {}", key, e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Deselect a device channel.
    ///
    /// No-op (and no backend call) when no session exists for the key. Stop
    /// failures are logged but the local session is still removed; a
    /// backend-side leak is recoverable out-of-band and must not wedge the
    /// selection state.
    pub async fn deselect(&self, imei: &str, channel: u32) -> Result<()> {
        let key = SessionKey::new(imei, channel);

        let epoch = {
            let mut store = self.store.lock().await;
            match store.begin_stop(&key) {
                Some(epoch) => epoch,
                None => {
                    debug!("channel {} not selected, ignoring deselect", key);
                    return Ok(());
                }
            }
        };

        info!("stopping stream for {}", key);
        if let Err(e) = self.call_stop(&key).await {
            warn!("stream stop for {} failed, clearing local state: {}", key, e);
        }

        let removed = {
            let mut store = self.store.lock().await;
            store.resolve_stop(&key, epoch)
        };

        if removed {
            self.emit(SessionEvent::StreamStopped { key });
            self.emit(SessionEvent::GridChanged);
        } else {
            debug!("stop resolution for {} superseded by a newer request", key);
        }

        Ok(())
    }

    /// Displayable sessions in selection order
    pub async fn active_sessions(&self) -> Vec<Session> {
        self.store.lock().await.list_active()
    }

    pub async fn stats(&self) -> SessionStats {
        self.store.lock().await.stats()
    }

    pub(crate) fn store(&self) -> Arc<Mutex<SessionStore>> {
        Arc::clone(&self.store)
    }

    pub(crate) fn backend(&self) -> Arc<dyn StreamBackend> {
        Arc::clone(&self.backend)
    }

    /// Run the backend start in its own task so a timeout does not drop the
    /// call in flight: the backend may still create the stream, and a late
    /// success must be observed to release it.
    async fn call_start(&self, key: &SessionKey) -> Result<StreamEndpoints, StreamError> {
        let backend = Arc::clone(&self.backend);
        let imei = key.imei.clone();
        let camera_index = key.camera_index();
        let mut call = tokio::spawn(async move { backend.start(&imei, camera_index).await });

        match timeout(self.call_timeout, &mut call).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StreamError::Backend(format!("start task failed: {}", e))),
            Err(_) => {
                self.watch_late_start(key.clone(), call);
                Err(StreamError::Timeout(self.call_timeout))
            }
        }
    }

    /// Await a timed-out start to completion. A late success holds a backend
    /// encoder slot the session no longer accounts for; stop it unless a
    /// newer request has re-selected the key meanwhile.
    fn watch_late_start(
        &self,
        key: SessionKey,
        call: JoinHandle<Result<StreamEndpoints, StreamError>>,
    ) {
        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);

        tokio::spawn(async move {
            let result = match call.await {
                Ok(result) => result,
                Err(_) => return,
            };
            if result.is_err() {
                return;
            }

            let still_wanted = {
                let store = store.lock().await;
                store
                    .get(&key)
                    .map(|s| matches!(s.state, SessionState::Starting | SessionState::Active))
                    .unwrap_or(false)
            };

            if !still_wanted {
                info!("late start success for {} after timeout, releasing stream", key);
                if let Err(e) = backend.stop(&key.imei).await {
                    warn!("corrective stop for {} failed: {}", key, e);
                }
            }
        });
    }

    async fn call_stop(&self, key: &SessionKey) -> Result<(), StreamError> {
        match timeout(self.call_timeout, self.backend.stop(&key.imei)).await {
            Ok(result) => result,
            Err(_) => Err(StreamError::Timeout(self.call_timeout)),
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events.send_event(event) {
            debug!("event receiver gone: {}", e);
        }
    }
}
