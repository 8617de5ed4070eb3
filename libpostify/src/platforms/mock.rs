//! Mock platform implementation for testing
//!
//! A scriptable adapter that can succeed, fail or stall, and records what it
//! was asked to deliver. Used by orchestrator tests to exercise ordering,
//! partial failure and timeouts without any network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::platforms::{Delivery, Platform};
use crate::types::{CredentialBundle, PlatformKind, SocialAccount};

/// What a mock adapter saw on one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub post_id: String,
    pub account_id: String,
    pub had_image: bool,
    pub had_credentials: bool,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub kind: PlatformKind,

    /// `Ok` carries the success message, `Err` the scripted failure
    pub outcome: Result<String, PlatformError>,

    /// Delay before completing (simulates network latency)
    pub delay: Duration,

    pub is_configured: bool,

    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockConfig {
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            outcome: Ok(format!("Posted to {} successfully", kind.display_name())),
            delay: Duration::ZERO,
            is_configured: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    pub fn success(kind: PlatformKind) -> Self {
        Self::new(MockConfig::new(kind))
    }

    pub fn failure(kind: PlatformKind, message: &str) -> Self {
        Self::new(MockConfig {
            outcome: Err(PlatformError::Rejected(message.to_string())),
            ..MockConfig::new(kind)
        })
    }

    pub fn with_delay(kind: PlatformKind, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(kind)
        })
    }

    pub fn call_count(&self) -> usize {
        self.config.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.config
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        self.config.kind
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    async fn deliver(
        &self,
        delivery: &Delivery,
        account: &SocialAccount,
        credentials: Option<&CredentialBundle>,
    ) -> Result<String, PlatformError> {
        self.config
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                post_id: delivery.post.id.clone(),
                account_id: account.id.clone(),
                had_image: delivery.image.is_some(),
                had_credentials: credentials.is_some(),
            });

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        self.config.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Post;

    #[tokio::test]
    async fn test_mock_records_calls() {
        let platform = MockPlatform::success(PlatformKind::Telegram);
        let post = Post::new("u".to_string(), "t".to_string(), "b".to_string());
        let account = SocialAccount::placeholder("u", PlatformKind::Telegram);
        let creds = CredentialBundle::new().with("k", "v");

        let message = platform
            .deliver(&Delivery::text_only(post.clone()), &account, Some(&creds))
            .await
            .unwrap();

        assert_eq!(message, "Posted to Telegram successfully");
        assert_eq!(
            platform.calls(),
            vec![MockCall {
                post_id: post.id,
                account_id: account.id,
                had_image: false,
                had_credentials: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_mock_failure_returns_scripted_error() {
        let platform = MockPlatform::failure(PlatformKind::Facebook, "HTTP 500");
        let post = Post::new("u".to_string(), "t".to_string(), "b".to_string());
        let account = SocialAccount::placeholder("u", PlatformKind::Facebook);

        let err = platform
            .deliver(&Delivery::text_only(post), &account, None)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "HTTP 500");
        assert_eq!(platform.call_count(), 1);
    }
}
