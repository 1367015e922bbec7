//! Stream-control backend data types and structures

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for `POST /stream/start`
#[derive(Debug, Serialize)]
pub struct StartStreamRequest {
    pub imei: String,
    #[serde(rename = "cameraIndex")]
    pub camera_index: u32,
}

/// Response body for `POST /stream/start`
#[derive(Debug, Deserialize)]
pub struct StartStreamResponse {
    pub success: bool,
    #[serde(rename = "streamUrl")]
    pub stream_url: Option<String>,
    #[serde(rename = "hlsUrl")]
    pub hls_url: Option<String>,
    pub message: Option<String>,
}

/// Request body for `POST /stream/stop`
#[derive(Debug, Serialize)]
pub struct StopStreamRequest {
    pub imei: String,
}

/// Response body for `POST /stream/stop`
#[derive(Debug, Deserialize)]
pub struct StopStreamResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// Playback endpoints returned by a successful stream start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoints {
    /// RTMP ingest URL the device pushes to
    pub stream_url: String,
    /// HLS playlist URL the player consumes
    pub hls_url: String,
}

/// Error types for stream-control operations
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("backend rejected stream start ({status}): {message}")]
    StartRejected { status: u16, message: String },
    #[error("backend rejected stream stop ({status}): {message}")]
    StopRejected { status: u16, message: String },
    #[error("stream request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend error: {0}")]
    Backend(String),
}
