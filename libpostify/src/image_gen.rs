//! Text-to-image generation
//!
//! `StabilityClient` calls the Stability AI REST endpoint and returns the
//! first artifact as base64. There is no retry; any failure surfaces as a
//! single error.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::ImageGenerationConfig;
use crate::error::{ImageGenError, PostifyError, Result};

const TIMEOUT_SECS: u64 = 120;

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image for `prompt`, returned as base64-encoded bytes
    async fn generate_image(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct TextPrompt<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    text_prompts: Vec<TextPrompt<'a>>,
    cfg_scale: u32,
    height: u32,
    width: u32,
    samples: u32,
    steps: u32,
}

impl<'a> GenerationRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            text_prompts: vec![TextPrompt { text: prompt }],
            cfg_scale: 7,
            height: 512,
            width: 512,
            samples: 1,
            steps: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Artifact {
    base64: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    artifacts: Vec<Artifact>,
}

pub struct StabilityClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl StabilityClient {
    pub fn new(config: &ImageGenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(ImageGenError::Transport)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
        })
    }
}

#[async_trait]
impl ImageGenerator for StabilityClient {
    async fn generate_image(&self, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(PostifyError::InvalidInput("Prompt is required".to_string()));
        }
        let api_key = self.api_key.as_ref().ok_or(ImageGenError::NotConfigured)?;

        debug!("Requesting image generation ({} char prompt)", prompt.len());
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose_secret())
            .header("Accept", "application/json")
            .json(&GenerationRequest::new(prompt))
            .send()
            .await
            .map_err(ImageGenError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(ImageGenError::Transport)?;
            error!("Image generation returned {}: {}", status, body);
            return Err(ImageGenError::Api(body).into());
        }

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ImageGenError::MalformedResponse(e.to_string()))?;

        parsed
            .artifacts
            .into_iter()
            .next()
            .map(|a| a.base64)
            .ok_or_else(|| ImageGenError::MalformedResponse("no artifacts".to_string()).into())
    }
}

/// File name suggested for a generated image
pub fn generated_file_name(user_id: &str, prompt: &str) -> String {
    let stem: String = prompt
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .take(10)
        .collect::<String>()
        .trim()
        .replace(' ', "_");
    format!("generated_{}_{}.png", user_id, stem)
}
