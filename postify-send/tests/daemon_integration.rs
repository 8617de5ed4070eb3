//! Integration tests for the postify-send daemon

use assert_cmd::Command;
use libpostify::{Database, Post, PostStatus, User};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Write a config pointing at a fresh database; Telegram stays unconfigured
async fn setup_test_env() -> (TempDir, String, Database) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");
    let media_root = temp_dir.path().join("media");

    let config_content = format!(
        r#"
[database]
path = "{}"

[media]
root = "{}"

[telegram]
api_base = "http://127.0.0.1:9"

[scheduling]
poll_interval = 1
default_platforms = ["telegram"]
"#,
        db_path.display().to_string().replace('\\', "/"),
        media_root.display().to_string().replace('\\', "/")
    );
    fs::write(&config_path, config_content).unwrap();

    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    let user = User {
        id: "owner-1".to_string(),
        username: "owner".to_string(),
        email: String::new(),
        password_hash: "unused".to_string(),
        created_at: 0,
    };
    db.create_user(&user).await.unwrap();

    (temp_dir, config_path.to_str().unwrap().to_string(), db)
}

fn daemon(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("postify-send").unwrap();
    cmd.env("POSTIFY_CONFIG", config_path)
        .env_remove("TELEGRAM_TOKEN")
        .env_remove("CHAT_ID")
        .env_remove("POSTIFY_DB_PATH")
        .env_remove("POSTIFY_MEDIA_ROOT");
    cmd
}

#[test]
fn test_help_mentions_drafts_flag() {
    Command::cargo_bin("postify-send")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--drafts"));
}

#[tokio::test]
async fn test_once_publishes_due_posts() {
    let (_dir, config_path, db) = setup_test_env().await;

    let mut due = Post::new("owner-1".to_string(), "Due".to_string(), "Body".to_string());
    due.status = PostStatus::Scheduled;
    due.scheduled_time = Some(chrono::Utc::now().timestamp() - 10);
    db.create_post(&due).await.unwrap();

    let mut later = Post::new("owner-1".to_string(), "Later".to_string(), "Body".to_string());
    later.status = PostStatus::Scheduled;
    later.scheduled_time = Some(chrono::Utc::now().timestamp() + 3600);
    db.create_post(&later).await.unwrap();

    daemon(&config_path).arg("--once").assert().success();

    // Telegram is not configured, so the attempt is recorded as a failure
    let stored = db.get_post(&due.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Failed);
    let history = db.list_results(&due.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].result.error_message,
        "Telegram credentials not configured"
    );

    let untouched = db.get_post(&later.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, PostStatus::Scheduled);
    assert!(db.list_results(&later.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_drafts_mode_targets_telegram() {
    let (_dir, config_path, db) = setup_test_env().await;

    let draft = Post::new("owner-1".to_string(), "Draft".to_string(), "Body".to_string());
    db.create_post(&draft).await.unwrap();

    daemon(&config_path).arg("--drafts").assert().success();

    let history = db.list_results(&draft.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].account.platform,
        libpostify::PlatformKind::Telegram
    );
}

#[tokio::test]
async fn test_invalid_default_platform_exits_with_config_code() {
    let (_dir, config_path, _db) = setup_test_env().await;
    let content = fs::read_to_string(&config_path)
        .unwrap()
        .replace(r#"["telegram"]"#, r#"["myspace"]"#);
    fs::write(&config_path, content).unwrap();

    daemon(&config_path)
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("scheduling.default_platforms"));
}
