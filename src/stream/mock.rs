//! Mock stream backend for testing session orchestration
//! Lets tests hold responses in flight to exercise epoch-based race handling

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::watch;

use super::StreamBackend;
use super::types::{StreamEndpoints, StreamError};

/// In-memory stream backend with controllable response gates.
///
/// While a gate is held, the corresponding call records itself and then
/// parks until the gate reopens, letting tests interleave new requests
/// between a call and its resolution.
pub struct MockStreamBackend {
    start_calls: Mutex<Vec<(String, u32)>>,
    stop_calls: Mutex<Vec<String>>,
    detached_stops: Mutex<Vec<String>>,
    failing_imeis: Mutex<HashSet<String>>,
    start_gate: watch::Sender<bool>,
    stop_gate: watch::Sender<bool>,
}

impl MockStreamBackend {
    pub fn new() -> Self {
        let (start_gate, _) = watch::channel(true);
        let (stop_gate, _) = watch::channel(true);

        Self {
            start_calls: Mutex::new(Vec::new()),
            stop_calls: Mutex::new(Vec::new()),
            detached_stops: Mutex::new(Vec::new()),
            failing_imeis: Mutex::new(HashSet::new()),
            start_gate,
            stop_gate,
        }
    }

    /// Park subsequent start calls after they are recorded
    pub fn hold_starts(&self) {
        self.start_gate.send_replace(false);
    }

    /// Let all parked and future start calls resolve
    pub fn release_starts(&self) {
        self.start_gate.send_replace(true);
    }

    /// Park subsequent stop calls after they are recorded
    pub fn hold_stops(&self) {
        self.stop_gate.send_replace(false);
    }

    /// Let all parked and future stop calls resolve
    pub fn release_stops(&self) {
        self.stop_gate.send_replace(true);
    }

    /// Make every start for the given IMEI fail with a backend rejection
    pub fn fail_starts_for(&self, imei: &str) {
        self.failing_imeis.lock().unwrap().insert(imei.to_string());
    }

    pub fn start_calls(&self) -> Vec<(String, u32)> {
        self.start_calls.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> Vec<String> {
        self.stop_calls.lock().unwrap().clone()
    }

    pub fn detached_stops(&self) -> Vec<String> {
        self.detached_stops.lock().unwrap().clone()
    }

    async fn wait_gate(gate: &watch::Sender<bool>) {
        let mut gate_rx = gate.subscribe();
        // Returns immediately while the gate is open
        let _ = gate_rx.wait_for(|open| *open).await;
    }
}

impl Default for MockStreamBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamBackend for MockStreamBackend {
    async fn start(&self, imei: &str, camera_index: u32) -> Result<StreamEndpoints, StreamError> {
        self.start_calls
            .lock()
            .unwrap()
            .push((imei.to_string(), camera_index));

        Self::wait_gate(&self.start_gate).await;

        if self.failing_imeis.lock().unwrap().contains(imei) {
            return Err(StreamError::StartRejected {
                status: 502,
                message: format!("no encoder slot available for {}", imei),
            });
        }

        Ok(StreamEndpoints {
            stream_url: format!("rtmp://mock/{}/{}", imei, camera_index),
            hls_url: format!("http://mock/{}/{}.m3u8", imei, camera_index),
        })
    }

    async fn stop(&self, imei: &str) -> Result<(), StreamError> {
        self.stop_calls.lock().unwrap().push(imei.to_string());

        Self::wait_gate(&self.stop_gate).await;
        Ok(())
    }

    fn stop_detached(&self, imei: &str) -> tokio::task::JoinHandle<()> {
        self.detached_stops.lock().unwrap().push(imei.to_string());
        tokio::spawn(async {})
    }
}
