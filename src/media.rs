//! Client for the external media-hosting collaborator.
//!
//! The media service accepts an image blob and returns a stable URL for it.
//! Parley never stores image bytes itself. Every call is bounded by the
//! agent's timeouts; a failed or unconfigured resolution is reported as an
//! error string and the caller downgrades the message to image-less.

use std::time::Duration;

use serde::Deserialize;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Clone)]
pub struct MediaClient {
    base_url: Option<String>,
    agent: ureq::Agent,
}

impl MediaClient {
    /// `base_url` of the media service, or `None` when no service is
    /// configured (image sends then degrade to text-only).
    pub fn new(base_url: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(3))
            .timeout(UPLOAD_TIMEOUT)
            .build();
        Self { base_url, agent }
    }

    pub fn configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Upload an image payload (base64 data from the client) and return the
    /// stable URL the media service assigned.
    pub fn resolve_image(&self, data: &str) -> Result<String, String> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| "no media service configured".to_string())?;
        let url = format!("{}/uploads", base.trim_end_matches('/'));
        let response: UploadResponse = self
            .agent
            .post(&url)
            .send_json(serde_json::json!({ "data": data }))
            .map_err(|e| format!("media upload failed: {e}"))?
            .into_json()
            .map_err(|e| format!("media response malformed: {e}"))?;
        Ok(response.url)
    }
}
