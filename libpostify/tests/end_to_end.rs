//! End-to-end publish workflows over the SQLite store
//!
//! These tests verify complete workflows including:
//! - Publishing to several platforms with partial failure
//! - Result history accumulating across repeated publishes
//! - Lazy account creation on first publish
//! - Scheduled posts becoming due

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use libpostify::db::Database;
use libpostify::platforms::mock::MockPlatform;
use libpostify::platforms::PlatformRegistry;
use libpostify::poster::{MultiPlatformPoster, PublishPolicy};
use libpostify::types::{
    PlatformKind, PlatformSelection, Post, PostStatus, PublishCredentials, User,
};
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path.to_string_lossy()).await?;
    Ok((temp_dir, db))
}

async fn create_owner(db: &Database) -> Result<User> {
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: "owner".to_string(),
        email: String::new(),
        password_hash: "unused".to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };
    db.create_user(&user).await?;
    Ok(user)
}

fn registry() -> PlatformRegistry {
    PlatformRegistry::new()
        .with(Arc::new(MockPlatform::success(PlatformKind::Telegram)))
        .with(Arc::new(MockPlatform::success(PlatformKind::Instagram)))
        .with(Arc::new(MockPlatform::failure(
            PlatformKind::Facebook,
            "Facebook credentials not configured",
        )))
        .with(Arc::new(MockPlatform::success(PlatformKind::WhatsApp)))
}

#[tokio::test]
async fn test_partial_failure_is_recorded_per_platform() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let owner = create_owner(&db).await?;
    let post = Post::new(owner.id.clone(), "Title".to_string(), "Body".to_string());
    db.create_post(&post).await?;

    let poster = MultiPlatformPoster::new(Arc::new(db.clone()), registry());
    let outcomes = poster
        .publish(
            &post.id,
            &PlatformSelection::only(&[PlatformKind::Telegram, PlatformKind::Facebook]),
            &PublishCredentials::default(),
        )
        .await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].platform, "telegram");
    assert!(outcomes[0].success);
    assert_eq!(outcomes[1].platform, "facebook");
    assert!(!outcomes[1].success);
    assert_eq!(outcomes[1].message, "Facebook credentials not configured");

    let stored = db.get_post(&post.id).await?.expect("post exists");
    assert_eq!(stored.status, PostStatus::Posted);
    assert!(stored.posted_at.is_some());

    let history = db.list_results(&post.id).await?;
    assert_eq!(history.len(), 2);
    let facebook = history
        .iter()
        .find(|r| r.account.platform == PlatformKind::Facebook)
        .expect("facebook row");
    assert!(!facebook.result.success);
    assert_eq!(
        facebook.result.error_message,
        "Facebook credentials not configured"
    );

    // Placeholder accounts were created on first use
    let accounts = db.list_accounts(&owner.id).await?;
    assert_eq!(accounts.len(), 2);
    assert!(accounts
        .iter()
        .any(|a| a.display_name == "Your Facebook Account"));

    Ok(())
}

#[tokio::test]
async fn test_republish_recomputes_status_and_appends_history() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let owner = create_owner(&db).await?;
    let post = Post::new(owner.id.clone(), "Title".to_string(), "Body".to_string());
    db.create_post(&post).await?;

    let poster = MultiPlatformPoster::new(Arc::new(db.clone()), registry());

    poster
        .publish(
            &post.id,
            &PlatformSelection::only(&[PlatformKind::Facebook]),
            &PublishCredentials::default(),
        )
        .await;
    assert_eq!(
        db.get_post(&post.id).await?.unwrap().status,
        PostStatus::Failed
    );

    poster
        .publish(
            &post.id,
            &PlatformSelection::only(&[PlatformKind::WhatsApp]),
            &PublishCredentials::default(),
        )
        .await;
    assert_eq!(
        db.get_post(&post.id).await?.unwrap().status,
        PostStatus::Posted
    );

    poster
        .publish(
            &post.id,
            &PlatformSelection::only(&[PlatformKind::Facebook]),
            &PublishCredentials::default(),
        )
        .await;
    assert_eq!(
        db.get_post(&post.id).await?.unwrap().status,
        PostStatus::Failed
    );

    let history = db.list_results(&post.id).await?;
    let platforms: Vec<_> = history.iter().map(|r| r.account.platform).collect();
    assert_eq!(
        platforms,
        vec![
            PlatformKind::Facebook,
            PlatformKind::WhatsApp,
            PlatformKind::Facebook
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_instagram_kill_switch_over_database() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let owner = create_owner(&db).await?;
    let post = Post::new(owner.id.clone(), "Title".to_string(), "Body".to_string());
    db.create_post(&post).await?;

    let mut wire_creds = BTreeMap::new();
    let mut insta = BTreeMap::new();
    insta.insert("username".to_string(), "u".to_string());
    insta.insert("password".to_string(), "p".to_string());
    wire_creds.insert("instagram".to_string(), insta);
    let mut flags = BTreeMap::new();
    flags.insert("instagram".to_string(), true);

    let disabled = MultiPlatformPoster::new(Arc::new(db.clone()), registry());
    let outcomes = disabled.publish_wire(&post.id, &flags, &wire_creds).await;
    assert!(!outcomes[0].success);
    assert_eq!(outcomes[0].message, "Instagram disabled - IP banned");

    let enabled = MultiPlatformPoster::new(Arc::new(db.clone()), registry()).with_policy(
        PublishPolicy {
            instagram_enabled: true,
        },
    );
    let outcomes = enabled.publish_wire(&post.id, &flags, &wire_creds).await;
    assert!(outcomes[0].success);

    assert_eq!(db.list_results(&post.id).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_due_scheduled_post_is_published() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let owner = create_owner(&db).await?;

    let mut post = Post::new(owner.id.clone(), "Later".to_string(), "Body".to_string());
    post.status = PostStatus::Scheduled;
    post.scheduled_time = Some(chrono::Utc::now().timestamp() - 10);
    db.create_post(&post).await?;

    let poster = MultiPlatformPoster::new(Arc::new(db.clone()), registry());
    let selection = PlatformSelection::only(&[PlatformKind::Telegram]);

    let due = db.due_scheduled_posts(chrono::Utc::now().timestamp()).await?;
    assert_eq!(due.len(), 1);
    for post in due {
        poster
            .publish(&post.id, &selection, &PublishCredentials::default())
            .await;
    }

    assert!(db
        .due_scheduled_posts(chrono::Utc::now().timestamp())
        .await?
        .is_empty());
    assert_eq!(
        db.get_post(&post.id).await?.unwrap().status,
        PostStatus::Posted
    );
    Ok(())
}
