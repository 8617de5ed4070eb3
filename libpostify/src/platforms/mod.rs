//! Platform adapters
//!
//! Each adapter turns a post, the account it is recorded against and an
//! optional per-request credential bundle into a single delivery attempt.
//! Adapters never raise: every failure becomes a `PlatformError` whose
//! message is reported to the caller and persisted verbatim.
//!
//! # Examples
//!
//! ```no_run
//! use libpostify::config::Config;
//! use libpostify::platforms::PlatformRegistry;
//! use libpostify::types::PlatformKind;
//!
//! # fn example() -> libpostify::error::Result<()> {
//! let config = Config::default();
//! let registry = PlatformRegistry::from_config(&config)?;
//! assert!(registry.get(PlatformKind::Telegram).is_some());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::media::ResolvedImage;
use crate::types::{CredentialBundle, PlatformKind, Post, SocialAccount};

pub mod facebook;
pub mod instagram;
pub mod telegram;
pub mod whatsapp;

// Available outside tests so integration tests can script deliveries
pub mod mock;

const USER_AGENT: &str = concat!("postify/", env!("CARGO_PKG_VERSION"));

/// Everything an adapter needs to know about the post being delivered
#[derive(Debug, Clone)]
pub struct Delivery {
    pub post: Post,
    /// Already resolved through `MediaStore`; `None` means text only
    pub image: Option<ResolvedImage>,
}

impl Delivery {
    pub fn new(post: Post, image: Option<ResolvedImage>) -> Self {
        Self { post, image }
    }

    pub fn text_only(post: Post) -> Self {
        Self { post, image: None }
    }

    /// Read the image bytes, if any
    pub async fn image_bytes(&self) -> std::result::Result<Option<(Vec<u8>, &ResolvedImage)>, PlatformError> {
        match &self.image {
            Some(image) => {
                let bytes = image.read().await.map_err(|e| {
                    PlatformError::InvalidInput(format!(
                        "Failed to read image {}: {}",
                        image.path.display(),
                        e
                    ))
                })?;
                Ok(Some((bytes, image)))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Whether process-wide configuration is complete. Per-request
    /// credentials are checked at delivery time.
    fn is_configured(&self) -> bool;

    /// Perform the delivery. `Ok` carries the success confirmation.
    async fn deliver(
        &self,
        delivery: &Delivery,
        account: &SocialAccount,
        credentials: Option<&CredentialBundle>,
    ) -> std::result::Result<String, PlatformError>;

    /// `deliver` reduced to `(success, message)`
    async fn attempt(
        &self,
        delivery: &Delivery,
        account: &SocialAccount,
        credentials: Option<&CredentialBundle>,
    ) -> (bool, String) {
        match self.deliver(delivery, account, credentials).await {
            Ok(message) => (true, message),
            Err(e) => (false, e.message().to_string()),
        }
    }
}

/// Adapter lookup keyed by platform
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: BTreeMap<PlatformKind, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same platform
    pub fn register(&mut self, platform: Arc<dyn Platform>) {
        self.adapters.insert(platform.kind(), platform);
    }

    pub fn with(mut self, platform: Arc<dyn Platform>) -> Self {
        self.register(platform);
        self
    }

    pub fn get(&self, kind: PlatformKind) -> Option<Arc<dyn Platform>> {
        self.adapters.get(&kind).cloned()
    }

    /// Build all four HTTP adapters over one shared client
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(config.publish.timeout()?)?;

        let registry = Self::new()
            .with(Arc::new(telegram::TelegramPlatform::new(
                &config.telegram,
                client.clone(),
            )))
            .with(Arc::new(instagram::InstagramPlatform::new(
                &config.instagram,
                client.clone(),
            )))
            .with(Arc::new(facebook::FacebookPlatform::new(
                &config.facebook,
                client.clone(),
            )))
            .with(Arc::new(whatsapp::WhatsAppPlatform::new(
                &config.whatsapp,
                client,
            )));

        for (kind, adapter) in &registry.adapters {
            debug!("{} adapter configured: {}", kind, adapter.is_configured());
        }
        Ok(registry)
    }
}

/// Shared HTTP client for the adapters
pub fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| PlatformError::Transport(format!("Failed to build HTTP client: {}", e)))?;
    Ok(client)
}

/// Map a reqwest failure to a transport error
pub(crate) fn transport_error(platform: PlatformKind, e: reqwest::Error) -> PlatformError {
    if e.is_timeout() {
        PlatformError::Timeout(format!("{} request timed out", platform.display_name()))
    } else {
        PlatformError::Transport(e.to_string())
    }
}

/// Non-2xx responses become `Rejected` carrying the response body
pub(crate) async fn check_status(
    platform: PlatformKind,
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(platform, e))?;
    let body = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body
    };
    Err(PlatformError::Rejected(body))
}
