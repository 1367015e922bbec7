//! Exit-trigger handling: bulk teardown of live sessions when the user
//! leaves the live view or the process terminates.

use futures_util::future::join_all;
use futures_util::{StreamExt, stream::FuturesUnordered};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::controller::SelectionController;
use super::events::{EventChannel, SessionEvent};
use super::store::SessionState;

const TEARDOWN_MAX_CONCURRENCY: usize = 4;

/// Bound on waiting for detached stop requests to leave the process
const DETACHED_STOP_GRACE: Duration = Duration::from_secs(1);

/// Observes view-mode transitions and process termination and drives
/// teardown of all live sessions exactly once per exit event.
///
/// The live-view flag is level-triggered: teardown fires on each 1->0
/// transition, never repeatedly while the view stays inactive.
pub struct ExitTriggerCoordinator {
    controller: Arc<SelectionController>,
    events: EventChannel,
    in_live_view: bool,
}

impl ExitTriggerCoordinator {
    pub fn new(controller: Arc<SelectionController>, events: EventChannel) -> Self {
        Self {
            controller,
            events,
            in_live_view: false,
        }
    }

    pub fn in_live_view(&self) -> bool {
        self.in_live_view
    }

    /// Record the current view mode. Leaving the live view tears down every
    /// selected session through the normal deselect path.
    pub async fn set_live_view(&mut self, in_live_view: bool) {
        let leaving = self.in_live_view && !in_live_view;
        self.in_live_view = in_live_view;

        if leaving {
            self.teardown_all().await;
        }
    }

    /// Process termination: dispatch detached best-effort stops for every
    /// key that may hold a backend stream, then drop all local sessions.
    /// Bypasses the resolve path since no further state will be observed.
    pub async fn process_exit(&self) {
        let store = self.controller.store();
        let backend = self.controller.backend();

        let keys = {
            let store = store.lock().await;
            store.keys_holding_streams()
        };

        if keys.is_empty() {
            debug!("process exit with no live sessions");
            return;
        }

        info!(
            "process exit: dispatching detached stops for {} sessions",
            keys.len()
        );

        // The stop endpoint is keyed by IMEI; one stop per device suffices.
        let mut seen = HashSet::new();
        let mut dispatches = Vec::new();
        for key in &keys {
            if seen.insert(key.imei.clone()) {
                dispatches.push(backend.stop_detached(&key.imei));
            }
        }

        store.lock().await.clear();

        // The runtime dies with the process right after this returns; give
        // the spawned requests a bounded window to actually leave.
        if timeout(DETACHED_STOP_GRACE, join_all(dispatches))
            .await
            .is_err()
        {
            warn!("exit grace elapsed with detached stops still in flight");
        }
    }

    async fn teardown_all(&self) {
        let sessions = self.controller.active_sessions().await;
        let pending: Vec<_> = {
            // Active/Starting come from the display set; Stopping keys are
            // already on their way out through their own deselect.
            sessions
                .into_iter()
                .filter(|s| matches!(s.state, SessionState::Starting | SessionState::Active))
                .map(|s| s.key)
                .collect()
        };

        if pending.is_empty() {
            debug!("live view exit with no sessions to tear down");
            return;
        }

        info!("live view exit: tearing down {} sessions", pending.len());

        let semaphore = Arc::new(Semaphore::new(TEARDOWN_MAX_CONCURRENCY));
        let mut tasks = FuturesUnordered::new();

        for key in pending {
            let controller = Arc::clone(&self.controller);
            let semaphore = Arc::clone(&semaphore);

            tasks.push(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("teardown permit acquisition failed for {}: {}", key, e);
                        return 0usize;
                    }
                };

                match controller.deselect(&key.imei, key.channel).await {
                    Ok(()) => 1,
                    Err(e) => {
                        error!("teardown deselect failed for {}: {}", key, e);
                        0
                    }
                }
            });
        }

        let mut stopped = 0;
        while let Some(count) = tasks.next().await {
            stopped += count;
        }

        info!("live view teardown completed, {} sessions stopped", stopped);
        if let Err(e) = self
            .events
            .send_event(SessionEvent::TeardownCompleted { stopped })
        {
            debug!("event receiver gone: {}", e);
        }
    }
}
