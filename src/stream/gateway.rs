//! HTTP client for the stream-control endpoint

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::StreamBackend;
use super::types::{
    StartStreamRequest, StartStreamResponse, StopStreamRequest, StopStreamResponse,
    StreamEndpoints, StreamError,
};

/// Thin client for the transcoding backend's stream-control API
pub struct StreamGateway {
    base_url: String,
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl StreamGateway {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url,
            client,
            auth_token: None,
        }
    }

    /// Attach a bearer token forwarded on every request
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request
    }
}

#[async_trait]
impl StreamBackend for StreamGateway {
    async fn start(&self, imei: &str, camera_index: u32) -> Result<StreamEndpoints, StreamError> {
        debug!("requesting stream start for {} camera {}", imei, camera_index);

        let response = self
            .post("/stream/start")
            .json(&StartStreamRequest {
                imei: imei.to_string(),
                camera_index,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StreamError::StartRejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: StartStreamResponse = response.json().await?;
        if !body.success {
            return Err(StreamError::StartRejected {
                status: status.as_u16(),
                message: body
                    .message
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            });
        }

        match (body.stream_url, body.hls_url) {
            (Some(stream_url), Some(hls_url)) => {
                info!(
                    "stream started for {} camera {}: hls={}",
                    imei, camera_index, hls_url
                );
                Ok(StreamEndpoints {
                    stream_url,
                    hls_url,
                })
            }
            _ => Err(StreamError::Backend(
                "start response missing stream URLs".to_string(),
            )),
        }
    }

    async fn stop(&self, imei: &str) -> Result<(), StreamError> {
        debug!("requesting stream stop for {}", imei);

        let response = self
            .post("/stream/stop")
            .json(&StopStreamRequest {
                imei: imei.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StreamError::StopRejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: StopStreamResponse = response.json().await?;
        if !body.success {
            return Err(StreamError::StopRejected {
                status: status.as_u16(),
                message: body
                    .message
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            });
        }

        debug!("stream stopped for {}", imei);
        Ok(())
    }

    fn stop_detached(&self, imei: &str) -> tokio::task::JoinHandle<()> {
        let request = self.post("/stream/stop").json(&StopStreamRequest {
            imei: imei.to_string(),
        });
        let imei = imei.to_string();

        // The response body is never awaited; the handle resolves once the
        // request has been sent.
        tokio::spawn(async move {
            if let Err(e) = request.send().await {
                debug!("detached stop for {} failed: {}", imei, e);
            }
        })
    }
}
