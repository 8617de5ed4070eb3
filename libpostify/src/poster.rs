//! Multi-platform publish orchestration
//!
//! Attempts every selected platform concurrently, records one result row per
//! attempt and recomputes the post status from the outcomes of this call.
//! Persistence failures are logged and never change what the caller sees.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::accounts::AccountResolver;
use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::media::{MediaStore, ResolvedImage};
use crate::platforms::{Delivery, PlatformRegistry};
use crate::store::ContentStore;
use crate::types::{
    Outcome, PlatformKind, PlatformSelection, Post, PostResult, PostStatus, PublishCredentials,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Operational switches applied above the adapters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishPolicy {
    /// When `false`, Instagram attempts are refused without calling the adapter
    pub instagram_enabled: bool,
}

impl PublishPolicy {
    /// The refusal for a platform disabled by policy, if any
    pub fn refusal(&self, platform: PlatformKind) -> Option<PlatformError> {
        match platform {
            PlatformKind::Instagram if !self.instagram_enabled => Some(PlatformError::Disabled(
                "Instagram disabled - IP banned".to_string(),
            )),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct MultiPlatformPoster {
    store: Arc<dyn ContentStore>,
    platforms: PlatformRegistry,
    resolver: AccountResolver,
    media: Option<MediaStore>,
    policy: PublishPolicy,
    timeout: Duration,
    retain_results: Option<usize>,
}

impl MultiPlatformPoster {
    /// Create a poster with the default policy (Instagram disabled) and a 30s
    /// per-platform timeout
    pub fn new(store: Arc<dyn ContentStore>, platforms: PlatformRegistry) -> Self {
        Self {
            resolver: AccountResolver::new(store.clone()),
            store,
            platforms,
            media: None,
            policy: PublishPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            retain_results: None,
        }
    }

    /// Wire the HTTP adapters, media root and `[publish]` settings from config
    pub fn from_config(config: &Config, store: Arc<dyn ContentStore>) -> Result<Self> {
        let platforms = PlatformRegistry::from_config(config)?;
        Ok(Self::new(store, platforms)
            .with_media(MediaStore::new(config.media_root()))
            .with_policy(PublishPolicy {
                instagram_enabled: config.publish.instagram_enabled,
            })
            .with_timeout(config.publish.timeout()?)
            .with_retention(config.publish.retain_results_per_post))
    }

    pub fn with_media(mut self, media: MediaStore) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retention(mut self, keep_last: Option<usize>) -> Self {
        self.retain_results = keep_last;
        self
    }

    pub fn resolver(&self) -> &AccountResolver {
        &self.resolver
    }

    /// Publish from the wire shape. Unknown platform names make the whole
    /// selection malformed and yield a single system-error outcome.
    pub async fn publish_wire(
        &self,
        post_id: &str,
        platforms: &BTreeMap<String, bool>,
        credentials: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Vec<Outcome> {
        let selection = match PlatformSelection::from_names(platforms) {
            Ok(selection) => selection,
            Err(e) => return vec![Outcome::system_error(e.to_string())],
        };
        self.publish(post_id, &selection, &PublishCredentials::from_wire(credentials))
            .await
    }

    /// Publish a post to every truthy platform in `selection`.
    ///
    /// Returns one outcome per selected platform in priority order, or a
    /// single system-error outcome when the call cannot start.
    pub async fn publish(
        &self,
        post_id: &str,
        selection: &PlatformSelection,
        credentials: &PublishCredentials,
    ) -> Vec<Outcome> {
        let platforms = selection.selected();
        if platforms.is_empty() {
            return vec![Outcome::system_error("No platform data provided")];
        }

        let post = match self.store.get_post(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                return vec![Outcome::system_error(format!("Post not found: {}", post_id))]
            }
            Err(e) => {
                warn!("Failed to load post {}: {}", post_id, e);
                return vec![Outcome::system_error(format!(
                    "Failed to load post {}: {}",
                    post_id, e
                ))];
            }
        };

        let started_at = chrono::Utc::now().timestamp();
        match self
            .store
            .claim_publish(post_id, started_at, started_at - self.claim_lifetime())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!("Rejected concurrent publish of post {}", post_id);
                return vec![Outcome::system_error(format!(
                    "Publish already in progress for post {}",
                    post_id
                ))];
            }
            Err(e) => {
                warn!("Failed to claim post {} for publishing: {}", post_id, e);
                return vec![Outcome::system_error(format!(
                    "Failed to claim post {}: {}",
                    post_id, e
                ))];
            }
        }

        let image = self.resolve_image(&post).await;
        let delivery = Delivery::new(post, image);

        let attempts = platforms
            .iter()
            .map(|platform| self.attempt_platform(&delivery, *platform, credentials));
        let outcomes = join_all(attempts).await;

        self.record_status(post_id, &outcomes, started_at).await;
        self.apply_retention(post_id).await;

        if let Err(e) = self.store.release_publish(post_id).await {
            warn!("Failed to release publish claim on post {}: {}", post_id, e);
        }
        outcomes
    }

    /// Seconds after which an unreleased claim counts as abandoned
    fn claim_lifetime(&self) -> i64 {
        let timeout = i64::try_from(self.timeout.as_secs()).unwrap_or(i64::MAX / 4);
        timeout.saturating_mul(2).saturating_add(60)
    }

    async fn resolve_image(&self, post: &Post) -> Option<ResolvedImage> {
        let reference = post.image.as_deref()?;
        let Some(media) = &self.media else {
            warn!("Post {} has an image but no media store is configured", post.id);
            return None;
        };
        match media.resolve(reference).await {
            Ok(Some(image)) => Some(image),
            Ok(None) => {
                warn!("Image {} for post {} is missing, sending text only", reference, post.id);
                None
            }
            Err(e) => {
                warn!("Cannot use image {} for post {}: {}", reference, post.id, e);
                None
            }
        }
    }

    async fn attempt_platform(
        &self,
        delivery: &Delivery,
        platform: PlatformKind,
        credentials: &PublishCredentials,
    ) -> Outcome {
        let post = &delivery.post;

        let account = match self.resolver.resolve(&post.owner_id, platform).await {
            Ok(account) => account,
            Err(e) => {
                warn!("Failed to resolve {} account for post {}: {}", platform, post.id, e);
                return Outcome::new(
                    platform,
                    false,
                    format!("Failed to resolve {} account: {}", platform.display_name(), e),
                );
            }
        };

        let (success, message) = if let Some(refusal) = self.policy.refusal(platform) {
            (false, refusal.message().to_string())
        } else if let Some(adapter) = self.platforms.get(platform) {
            let attempt = adapter.attempt(delivery, &account, credentials.get(platform));
            match tokio::time::timeout(self.timeout, attempt).await {
                Ok(result) => result,
                Err(_) => (
                    false,
                    format!(
                        "{} request timed out after {}",
                        platform.display_name(),
                        humantime::format_duration(self.timeout)
                    ),
                ),
            }
        } else {
            (
                false,
                format!("{} adapter is not available", platform.display_name()),
            )
        };

        if success {
            info!("Published post {} to {}: {}", post.id, platform, message);
        } else {
            info!("Publishing post {} to {} failed: {}", post.id, platform, message);
        }

        let row = PostResult {
            id: None,
            post_id: post.id.clone(),
            account_id: account.id.clone(),
            success,
            error_message: if success { String::new() } else { message.clone() },
            posted_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.store.append_result(&row).await {
            warn!(
                "Failed to record {} result for post {}: {}",
                platform, post.id, e
            );
        }

        Outcome::new(platform, success, message)
    }

    async fn record_status(&self, post_id: &str, outcomes: &[Outcome], started_at: i64) {
        let success_count = outcomes.iter().filter(|o| o.success).count();

        let (status, posted_at) = if success_count > 0 {
            (
                PostStatus::Posted,
                Some(chrono::Utc::now().timestamp().max(started_at)),
            )
        } else {
            (PostStatus::Failed, None)
        };

        info!(
            "Post {} is now {} ({}/{} platforms succeeded)",
            post_id,
            status,
            success_count,
            outcomes.len()
        );

        match self.store.set_post_status(post_id, status, posted_at).await {
            Ok(true) => {}
            Ok(false) => warn!("Post {} disappeared while publishing", post_id),
            Err(e) => warn!("Failed to update status of post {}: {}", post_id, e),
        }
    }

    async fn apply_retention(&self, post_id: &str) {
        let Some(keep_last) = self.retain_results else {
            return;
        };
        match self.store.prune_results(post_id, keep_last).await {
            Ok(0) => {}
            Ok(removed) => info!("Pruned {} old results of post {}", removed, post_id),
            Err(e) => warn!("Failed to prune results of post {}: {}", post_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FacebookConfig, InstagramConfig};
    use crate::platforms::facebook::FacebookPlatform;
    use crate::platforms::instagram::InstagramPlatform;
    use crate::platforms::mock::MockPlatform;
    use crate::store::MemoryStore;
    use crate::types::CredentialBundle;

    fn draft(store: &MemoryStore) -> Post {
        let post = Post::new("owner-1".to_string(), "Title".to_string(), "Body".to_string());
        store.insert_post(post.clone());
        post
    }

    fn instagram_creds() -> PublishCredentials {
        let mut creds = PublishCredentials::default();
        creds.insert(
            PlatformKind::Instagram,
            CredentialBundle::new()
                .with("username", "someone")
                .with("password", "secret"),
        );
        creds
    }

    fn all_mocks() -> (PlatformRegistry, Vec<Arc<MockPlatform>>) {
        let mocks: Vec<_> = PlatformKind::ALL
            .iter()
            .map(|kind| Arc::new(MockPlatform::success(*kind)))
            .collect();
        let mut registry = PlatformRegistry::new();
        for mock in &mocks {
            registry.register(mock.clone());
        }
        (registry, mocks)
    }

    #[tokio::test]
    async fn test_outcomes_follow_priority_not_completion_order() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let registry = PlatformRegistry::new()
            .with(Arc::new(MockPlatform::with_delay(
                PlatformKind::Telegram,
                Duration::from_millis(80),
            )))
            .with(Arc::new(MockPlatform::with_delay(
                PlatformKind::Facebook,
                Duration::from_millis(40),
            )))
            .with(Arc::new(MockPlatform::success(PlatformKind::WhatsApp)));
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[
                    PlatformKind::WhatsApp,
                    PlatformKind::Facebook,
                    PlatformKind::Telegram,
                ]),
                &PublishCredentials::default(),
            )
            .await;

        let names: Vec<_> = outcomes.iter().map(|o| o.platform.as_str()).collect();
        assert_eq!(names, vec!["telegram", "facebook", "whatsapp"]);
        assert_eq!(store.results().len(), 3);
    }

    #[tokio::test]
    async fn test_instagram_kill_switch_refuses_any_credentials() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let (registry, mocks) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Instagram]),
                &instagram_creds(),
            )
            .await;

        assert_eq!(
            outcomes,
            vec![Outcome::new(
                PlatformKind::Instagram,
                false,
                "Instagram disabled - IP banned"
            )]
        );
        assert_eq!(mocks[1].call_count(), 0);
        // The refusal is still recorded
        let results = store.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error_message, "Instagram disabled - IP banned");
        assert_eq!(store.post(&post.id).unwrap().status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_instagram_reaches_adapter_when_enabled() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let (registry, mocks) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry)
            .with_policy(PublishPolicy {
                instagram_enabled: true,
            });

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Instagram]),
                &instagram_creds(),
            )
            .await;

        assert!(outcomes[0].success);
        assert_eq!(mocks[1].call_count(), 1);
        assert!(mocks[1].calls()[0].had_credentials);
    }

    #[tokio::test]
    async fn test_instagram_without_image_fails_post() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let instagram = InstagramPlatform::new(
            &InstagramConfig {
                api_base: "http://127.0.0.1:9".to_string(),
                min_delay_ms: 0,
                max_delay_ms: 0,
            },
            reqwest::Client::new(),
        );
        let poster = MultiPlatformPoster::new(
            Arc::new(store.clone()),
            PlatformRegistry::new().with(Arc::new(instagram)),
        )
        .with_policy(PublishPolicy {
            instagram_enabled: true,
        });

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Instagram]),
                &PublishCredentials::default(),
            )
            .await;

        assert_eq!(
            outcomes,
            vec![Outcome::new(
                PlatformKind::Instagram,
                false,
                "Instagram requires an image"
            )]
        );
        assert_eq!(store.post(&post.id).unwrap().status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_one_success_marks_post_posted() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let facebook = FacebookPlatform::new(&FacebookConfig::default(), reqwest::Client::new());
        let registry = PlatformRegistry::new()
            .with(Arc::new(MockPlatform::success(PlatformKind::Telegram)))
            .with(Arc::new(facebook));
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);
        let before = chrono::Utc::now().timestamp();

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Telegram, PlatformKind::Facebook]),
                &PublishCredentials::default(),
            )
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert_eq!(
            outcomes[1],
            Outcome::new(
                PlatformKind::Facebook,
                false,
                "Facebook credentials not configured"
            )
        );

        let stored = store.post(&post.id).unwrap();
        assert_eq!(stored.status, PostStatus::Posted);
        assert!(stored.posted_at.unwrap() >= before);

        let results = store.results();
        let failed = results.iter().find(|r| !r.success).unwrap();
        assert_eq!(failed.error_message, "Facebook credentials not configured");
        let succeeded = results.iter().find(|r| r.success).unwrap();
        assert!(succeeded.error_message.is_empty());
    }

    #[tokio::test]
    async fn test_all_failures_mark_failed_and_keep_posted_at() {
        let store = MemoryStore::new();
        let mut post = draft(&store);
        post.posted_at = Some(42);
        store.insert_post(post.clone());

        let registry = PlatformRegistry::new()
            .with(Arc::new(MockPlatform::failure(PlatformKind::Telegram, "HTTP 401")));
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Telegram]),
                &PublishCredentials::default(),
            )
            .await;

        let stored = store.post(&post.id).unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.posted_at, Some(42));
    }

    #[tokio::test]
    async fn test_result_write_failure_does_not_stop_other_platforms() {
        let store = MemoryStore::new();
        let post = draft(&store);
        store.fail_result_writes(true);
        let (registry, mocks) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[
                    PlatformKind::Telegram,
                    PlatformKind::Facebook,
                    PlatformKind::WhatsApp,
                ]),
                &PublishCredentials::default(),
            )
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.success));
        assert_eq!(store.result_write_attempts(), 3);
        assert_eq!(mocks[0].call_count(), 1);
        assert_eq!(mocks[2].call_count(), 1);
        assert_eq!(mocks[3].call_count(), 1);
        assert_eq!(store.post(&post.id).unwrap().status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_status_write_failure_is_swallowed() {
        let store = MemoryStore::new();
        let post = draft(&store);
        store.fail_post_updates(true);
        let (registry, _) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Telegram]),
                &PublishCredentials::default(),
            )
            .await;

        assert!(outcomes[0].success);
        assert_eq!(store.post(&post.id).unwrap().status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_empty_selection_leaves_post_untouched() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let (registry, mocks) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let mut flags = BTreeMap::new();
        flags.insert("telegram".to_string(), false);
        for selection in [
            PlatformSelection::default(),
            PlatformSelection::from_names(&flags).unwrap(),
        ] {
            let outcomes = poster
                .publish(&post.id, &selection, &PublishCredentials::default())
                .await;
            assert_eq!(
                outcomes,
                vec![Outcome {
                    platform: "error".to_string(),
                    success: false,
                    message: "No platform data provided".to_string(),
                }]
            );
        }

        assert_eq!(store.post(&post.id).unwrap(), post);
        assert!(store.results().is_empty());
        assert!(mocks.iter().all(|m| m.call_count() == 0));
    }

    #[tokio::test]
    async fn test_missing_post_is_system_error() {
        let store = MemoryStore::new();
        let (registry, _) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let outcomes = poster
            .publish(
                "nope",
                &PlatformSelection::only(&[PlatformKind::Telegram]),
                &PublishCredentials::default(),
            )
            .await;

        assert_eq!(outcomes, vec![Outcome::system_error("Post not found: nope")]);
        assert!(store.accounts().is_empty());
    }

    #[tokio::test]
    async fn test_store_error_on_load_is_system_error() {
        let store = MemoryStore::new();
        let post = draft(&store);
        store.fail_post_reads(true);
        let (registry, _) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Telegram]),
                &PublishCredentials::default(),
            )
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].platform, "error");
        assert!(outcomes[0].message.starts_with("Failed to load post"));
    }

    #[tokio::test]
    async fn test_unknown_platform_name_is_malformed() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let (registry, _) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let mut flags = BTreeMap::new();
        flags.insert("telegram".to_string(), true);
        flags.insert("myspace".to_string(), true);

        let outcomes = poster.publish_wire(&post.id, &flags, &BTreeMap::new()).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].platform, "error");
        assert!(outcomes[0].message.contains("Unsupported platform: myspace"));
        assert!(store.results().is_empty());
    }

    #[tokio::test]
    async fn test_slow_platform_times_out_alone() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let registry = PlatformRegistry::new()
            .with(Arc::new(MockPlatform::with_delay(
                PlatformKind::Facebook,
                Duration::from_secs(5),
            )))
            .with(Arc::new(MockPlatform::success(PlatformKind::WhatsApp)));
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry)
            .with_timeout(Duration::from_millis(50));

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Facebook, PlatformKind::WhatsApp]),
                &PublishCredentials::default(),
            )
            .await;

        assert_eq!(
            outcomes[0],
            Outcome::new(
                PlatformKind::Facebook,
                false,
                "Facebook request timed out after 50ms"
            )
        );
        assert!(outcomes[1].success);
        assert_eq!(store.post(&post.id).unwrap().status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_concurrent_publish_of_same_post_is_rejected() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let registry = PlatformRegistry::new().with(Arc::new(MockPlatform::with_delay(
            PlatformKind::Telegram,
            Duration::from_millis(300),
        )));
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);
        let selection = PlatformSelection::only(&[PlatformKind::Telegram]);

        let first = {
            let poster = poster.clone();
            let selection = selection.clone();
            let post_id = post.id.clone();
            tokio::spawn(async move {
                poster
                    .publish(&post_id, &selection, &PublishCredentials::default())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = poster
            .publish(&post.id, &selection, &PublishCredentials::default())
            .await;
        assert_eq!(
            second,
            vec![Outcome::system_error(format!(
                "Publish already in progress for post {}",
                post.id
            ))]
        );

        let first = first.await.unwrap();
        assert!(first[0].success);

        // The guard is released once the first call finishes
        let third = poster
            .publish(&post.id, &selection, &PublishCredentials::default())
            .await;
        assert_eq!(third[0].platform, "telegram");
    }

    #[tokio::test]
    async fn test_claim_held_by_another_process_is_respected() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let (registry, mocks) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);
        let selection = PlatformSelection::only(&[PlatformKind::Telegram]);

        let now = chrono::Utc::now().timestamp();
        assert!(store.claim_publish(&post.id, now, 0).await.unwrap());

        let outcomes = poster
            .publish(&post.id, &selection, &PublishCredentials::default())
            .await;
        assert_eq!(
            outcomes,
            vec![Outcome::system_error(format!(
                "Publish already in progress for post {}",
                post.id
            ))]
        );
        assert_eq!(mocks[0].call_count(), 0);
        assert_eq!(store.post(&post.id).unwrap().status, PostStatus::Draft);

        // A claim from a process that died long ago is taken over
        store.release_publish(&post.id).await.unwrap();
        assert!(store.claim_publish(&post.id, now - 3600, 0).await.unwrap());
        let outcomes = poster
            .publish(&post.id, &selection, &PublishCredentials::default())
            .await;
        assert!(outcomes[0].success);
        assert!(!store.is_claimed(&post.id));
    }

    #[tokio::test]
    async fn test_edits_during_publish_survive_status_write() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let registry = PlatformRegistry::new().with(Arc::new(MockPlatform::with_delay(
            PlatformKind::Telegram,
            Duration::from_millis(200),
        )));
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);

        let running = {
            let poster = poster.clone();
            let post_id = post.id.clone();
            tokio::spawn(async move {
                poster
                    .publish(
                        &post_id,
                        &PlatformSelection::only(&[PlatformKind::Telegram]),
                        &PublishCredentials::default(),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut edited = store.post(&post.id).unwrap();
        edited.title = "Edited while publishing".to_string();
        store.insert_post(edited);

        assert!(running.await.unwrap()[0].success);
        let stored = store.post(&post.id).unwrap();
        assert_eq!(stored.title, "Edited while publishing");
        assert_eq!(stored.status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn test_history_accumulates_and_account_is_reused() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let (registry, mocks) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry);
        let selection = PlatformSelection::only(&[PlatformKind::Telegram]);

        for _ in 0..3 {
            poster
                .publish(&post.id, &selection, &PublishCredentials::default())
                .await;
        }

        let results = store.results();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.account_id == results[0].account_id));
        assert_eq!(store.accounts().len(), 1);
        assert_eq!(mocks[0].call_count(), 3);
    }

    #[tokio::test]
    async fn test_retention_prunes_old_rows() {
        let store = MemoryStore::new();
        let post = draft(&store);
        let (registry, _) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry)
            .with_retention(Some(2));
        let selection = PlatformSelection::only(&[PlatformKind::Telegram]);

        for _ in 0..4 {
            poster
                .publish(&post.id, &selection, &PublishCredentials::default())
                .await;
        }

        let ids: Vec<_> = store.results().iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_stored_image_is_handed_to_adapter() {
        let dir = tempfile::TempDir::new().unwrap();
        let media = MediaStore::new(dir.path());
        let store = MemoryStore::new();
        let mut post = draft(&store);
        post.image = Some(media.save(b"png", "image/png").await.unwrap());
        store.insert_post(post.clone());

        let (registry, mocks) = all_mocks();
        let poster =
            MultiPlatformPoster::new(Arc::new(store.clone()), registry).with_media(media);

        poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Telegram]),
                &PublishCredentials::default(),
            )
            .await;

        assert!(mocks[0].calls()[0].had_image);
    }

    #[tokio::test]
    async fn test_missing_image_file_falls_back_to_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut post = draft(&store);
        post.image = Some("posts/gone.png".to_string());
        store.insert_post(post.clone());

        let (registry, mocks) = all_mocks();
        let poster = MultiPlatformPoster::new(Arc::new(store.clone()), registry)
            .with_media(MediaStore::new(dir.path()));

        let outcomes = poster
            .publish(
                &post.id,
                &PlatformSelection::only(&[PlatformKind::Telegram]),
                &PublishCredentials::default(),
            )
            .await;

        assert!(outcomes[0].success);
        assert!(!mocks[0].calls()[0].had_image);
    }
}
