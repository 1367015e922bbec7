//! Clients for the external stream-control backend (RTMP ingest -> HLS playback)

use async_trait::async_trait;
use tokio::task::JoinHandle;

pub mod gateway;
pub mod mock;
pub mod types;

pub use gateway::StreamGateway;
pub use mock::MockStreamBackend;
pub use types::{StreamEndpoints, StreamError};

/// Control surface of the transcoding backend.
///
/// The backend is authoritative for stream state; callers never retry
/// indefinitely and must tolerate `stop` on an unknown or already-stopped
/// IMEI (the backend treats it as an idempotent no-op).
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Start transcoding for one camera of a device, returning the
    /// playback endpoints.
    async fn start(&self, imei: &str, camera_index: u32) -> Result<StreamEndpoints, StreamError>;

    /// Stop all streaming for a device.
    async fn stop(&self, imei: &str) -> Result<(), StreamError>;

    /// Best-effort stop that does not await the response body. Used during
    /// process teardown where no further local state will be updated. The
    /// returned handle resolves once the request has been dispatched.
    fn stop_detached(&self, imei: &str) -> JoinHandle<()>;
}
