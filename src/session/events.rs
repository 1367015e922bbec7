//! Event channel for asynchronous session notifications

use anyhow::Result;
use tokio::sync::mpsc;

use super::store::SessionKey;

/// Session events emitted by the orchestration components
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The set of displayable sessions changed; the viewport must recompute
    GridChanged,
    /// A stream reached `Active`
    StreamStarted { key: SessionKey, hls_url: String },
    /// A start was rejected or timed out
    StreamFailed { key: SessionKey, error: String },
    /// A session was removed after its stop resolved
    StreamStopped { key: SessionKey },
    /// A bulk view-exit teardown finished
    TeardownCompleted { stopped: usize },
    /// Shutdown request
    ShutdownRequested,
}

/// Channel carrying session events to the runtime loop
pub struct EventChannel {
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl Clone for EventChannel {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
            event_rx: None, // Receivers cannot be cloned
        }
    }
}

impl EventChannel {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    pub fn send_event(&self, event: SessionEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("Failed to send event: {}", e))
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if let Some(event_rx) = &mut self.event_rx {
            event_rx.recv().await
        } else {
            None
        }
    }

    pub fn request_shutdown(&self) -> Result<()> {
        self.send_event(SessionEvent::ShutdownRequested)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_request_reaches_the_receiving_channel() {
        let mut events = EventChannel::new();

        // Clones carry the sender only
        let mut remote = events.clone();
        remote.request_shutdown().unwrap();

        assert!(matches!(
            events.next_event().await,
            Some(SessionEvent::ShutdownRequested)
        ));
        assert!(remote.next_event().await.is_none());
    }
}
