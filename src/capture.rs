use async_trait::async_trait;
use image::ImageReader;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SentinelError};
use crate::store::Viewport;

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub address: String,
    pub viewport: Viewport,
    pub pre_script: Option<String>,
    pub timeout: Duration,
}

/// Encoded image bytes plus what the store needs to know about them.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub digest: String,
}

impl CapturedImage {
    /// Probe dimensions from the image header and hash the bytes.
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self> {
        let (width, height) = probe_dimensions(&bytes)?;
        let digest = content_digest(&bytes);
        Ok(Self {
            bytes,
            width,
            height,
            digest,
        })
    }
}

pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| SentinelError::Decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| SentinelError::Decode(e.to_string()))
}

#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Reachability pre-flight, checked once before a run touches any target.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CapturedImage>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    viewport: &'a Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pre_script: Option<&'a str>,
    full_page: bool,
    timeout_ms: u64,
}

/// Talks to a headless rendering service that answers a JSON render
/// request with PNG bytes.
pub struct HttpCaptureProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCaptureProvider {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self { client, endpoint }
    }
}

#[async_trait]
impl CaptureProvider for HttpCaptureProvider {
    async fn ready(&self) -> Result<()> {
        let url = format!("{}/health", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                SentinelError::Capture(format!("capture service unreachable at {}: {}", url, e))
            })?;
        if !resp.status().is_success() {
            return Err(SentinelError::Capture(format!(
                "capture service health check returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CapturedImage> {
        let body = RenderRequest {
            url: &request.address,
            viewport: &request.viewport,
            pre_script: request.pre_script.as_deref(),
            full_page: true,
            timeout_ms: request.timeout.as_millis() as u64,
        };

        let resp = self
            .client
            .post(format!("{}/screenshot", self.endpoint))
            .json(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SentinelError::Timeout(format!("capturing {}", request.address))
                } else {
                    SentinelError::Capture(format!("{}: {}", request.address, e))
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SentinelError::Capture(format!(
                "{}: renderer returned {}: {}",
                request.address, status, text
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SentinelError::Capture(format!("{}: {}", request.address, e)))?;
        debug!("Captured {} ({} bytes)", request.address, bytes.len());

        CapturedImage::from_encoded(bytes.to_vec())
    }
}
