use std::sync::Arc;
use std::time::Duration;

use core_types::{DEFAULT_REQUEST_TIMEOUT, HttpTransport, OutboundRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_ENDPOINT: &str = "https://api.limewire.com/api/image/generation";
const PLACEHOLDER_PROMPT_CHARS: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image prompt is empty")]
    EmptyPrompt,
}

#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub endpoint: String,
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            width: 512,
            height: 512,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    pub prompt: String,
    pub placeholder: bool,
}

#[derive(Debug, Serialize)]
struct GenerationBody<'a> {
    prompt: &'a str,
    aspect_ratio: &'static str,
    model: &'static str,
    quality: &'static str,
    style: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedAsset>,
}

#[derive(Debug, Deserialize)]
struct GeneratedAsset {
    asset_url: Option<String>,
}

pub struct ImageGenerator {
    transport: Arc<dyn HttpTransport>,
    options: ImageOptions,
}

impl ImageGenerator {
    pub fn new(transport: Arc<dyn HttpTransport>, options: ImageOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    pub async fn generate(
        &self,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<GeneratedImage, ImageError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ImageError::EmptyPrompt);
        }

        let Some(api_key) = api_key.map(str::trim).filter(|key| !key.is_empty()) else {
            warn!("no image api key configured; using placeholder");
            return Ok(self.placeholder(prompt));
        };

        match self.request_asset(prompt, api_key).await {
            Some(url) => {
                info!("image generated");
                Ok(GeneratedImage {
                    url,
                    prompt: prompt.to_string(),
                    placeholder: false,
                })
            }
            None => Ok(self.placeholder(prompt)),
        }
    }

    async fn request_asset(&self, prompt: &str, api_key: &str) -> Option<String> {
        let body = GenerationBody {
            prompt,
            aspect_ratio: "1:1",
            model: "flux-1.1-pro",
            quality: "HD",
            style: "PHOTOREALISTIC",
        };
        let body = match serde_json::to_value(&body) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to encode image request");
                return None;
            }
        };
        let request = OutboundRequest::post(self.options.endpoint.clone(), body)
            .header("X-Api-Version", "v1")
            .header("Authorization", format!("Bearer {api_key}"))
            .with_timeout(self.options.timeout);
        debug!(endpoint = %self.options.endpoint, "requesting image");

        let response = match self.transport.post_json(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "image request failed; using placeholder");
                return None;
            }
        };
        if !response.is_success() {
            warn!(status = response.status, "image service rejected request; using placeholder");
            return None;
        }

        let url = serde_json::from_str::<GenerationResponse>(&response.body)
            .ok()
            .and_then(|parsed| parsed.data.into_iter().next())
            .and_then(|asset| asset.asset_url)
            .filter(|url| !url.trim().is_empty());
        if url.is_none() {
            warn!("image response had no asset url; using placeholder");
        }
        url
    }

    pub fn placeholder(&self, prompt: &str) -> GeneratedImage {
        GeneratedImage {
            url: placeholder_url(prompt, self.options.width, self.options.height),
            prompt: prompt.to_string(),
            placeholder: true,
        }
    }
}

pub fn placeholder_url(prompt: &str, width: u32, height: u32) -> String {
    let head: String = prompt.chars().take(PLACEHOLDER_PROMPT_CHARS).collect();
    format!(
        "https://via.placeholder.com/{width}x{height}/1a1a1a/00ff00?text={}",
        encode_uri_component(&head)
    )
}

// Same escaping as a browser's `encodeURIComponent`: `!'()*` stay literal.
fn encode_uri_component(text: &str) -> String {
    urlencoding::encode(text)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}
