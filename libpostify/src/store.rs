//! Content store abstraction used by the publish orchestrator
//!
//! `Database` is the production implementation. `MemoryStore` keeps everything
//! in process and can be scripted to fail individual write paths, which lets
//! tests observe that persistence failures are logged and tolerated.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{DbError, Result};
use crate::types::{PlatformKind, Post, PostResult, PostStatus, SocialAccount};

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>>;

    /// Write a post's status, leaving every other column alone. `posted_at`
    /// of `None` keeps the stored value. Returns `false` if the post is gone.
    async fn set_post_status(
        &self,
        post_id: &str,
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<bool>;

    /// Mark a post as being published. Fails to claim while another claim
    /// newer than `stale_before` is held, including one from another process.
    async fn claim_publish(&self, post_id: &str, now: i64, stale_before: i64) -> Result<bool>;

    async fn release_publish(&self, post_id: &str) -> Result<()>;

    async fn find_account(
        &self,
        owner_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<SocialAccount>>;

    /// Insert the account unless one already exists for its (owner, platform)
    /// pair, and return whichever row is stored afterwards.
    async fn create_account(&self, account: &SocialAccount) -> Result<SocialAccount>;

    /// Append one delivery result, returning its row id
    async fn append_result(&self, result: &PostResult) -> Result<i64>;

    /// Delete all but the newest `keep_last` results of a post
    async fn prune_results(&self, post_id: &str, keep_last: usize) -> Result<u64>;
}

#[derive(Default)]
struct MemoryState {
    posts: HashMap<String, Post>,
    accounts: Vec<SocialAccount>,
    results: Vec<PostResult>,
    claims: HashMap<String, i64>,
    next_result_id: i64,
    fail_post_reads: bool,
    fail_post_updates: bool,
    fail_result_writes: bool,
    result_write_attempts: usize,
}

/// In-memory `ContentStore` with fault injection
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_post(&self, post: Post) {
        self.lock().posts.insert(post.id.clone(), post);
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.lock().posts.get(post_id).cloned()
    }

    pub fn accounts(&self) -> Vec<SocialAccount> {
        self.lock().accounts.clone()
    }

    pub fn results(&self) -> Vec<PostResult> {
        self.lock().results.clone()
    }

    /// Number of `append_result` calls, including failed ones
    pub fn result_write_attempts(&self) -> usize {
        self.lock().result_write_attempts
    }

    pub fn fail_post_reads(&self, fail: bool) {
        self.lock().fail_post_reads = fail;
    }

    pub fn fail_post_updates(&self, fail: bool) {
        self.lock().fail_post_updates = fail;
    }

    pub fn fail_result_writes(&self, fail: bool) {
        self.lock().fail_result_writes = fail;
    }

    pub fn is_claimed(&self, post_id: &str) -> bool {
        self.lock().claims.contains_key(post_id)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let state = self.lock();
        if state.fail_post_reads {
            return Err(DbError::Injected("post read".to_string()).into());
        }
        Ok(state.posts.get(post_id).cloned())
    }

    async fn set_post_status(
        &self,
        post_id: &str,
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<bool> {
        let mut state = self.lock();
        if state.fail_post_updates {
            return Err(DbError::Injected("post update".to_string()).into());
        }
        let Some(post) = state.posts.get_mut(post_id) else {
            return Ok(false);
        };
        post.status = status;
        if posted_at.is_some() {
            post.posted_at = posted_at;
        }
        Ok(true)
    }

    async fn claim_publish(&self, post_id: &str, now: i64, stale_before: i64) -> Result<bool> {
        let mut state = self.lock();
        if !state.posts.contains_key(post_id) {
            return Ok(false);
        }
        match state.claims.get(post_id) {
            Some(claimed_at) if *claimed_at >= stale_before => Ok(false),
            _ => {
                state.claims.insert(post_id.to_string(), now);
                Ok(true)
            }
        }
    }

    async fn release_publish(&self, post_id: &str) -> Result<()> {
        self.lock().claims.remove(post_id);
        Ok(())
    }

    async fn find_account(
        &self,
        owner_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<SocialAccount>> {
        Ok(self
            .lock()
            .accounts
            .iter()
            .find(|a| a.owner_id == owner_id && a.platform == platform)
            .cloned())
    }

    async fn create_account(&self, account: &SocialAccount) -> Result<SocialAccount> {
        let mut state = self.lock();
        if let Some(existing) = state
            .accounts
            .iter()
            .find(|a| a.owner_id == account.owner_id && a.platform == account.platform)
        {
            return Ok(existing.clone());
        }
        state.accounts.push(account.clone());
        Ok(account.clone())
    }

    async fn append_result(&self, result: &PostResult) -> Result<i64> {
        let mut state = self.lock();
        state.result_write_attempts += 1;
        if state.fail_result_writes {
            return Err(DbError::Injected("result append".to_string()).into());
        }
        state.next_result_id += 1;
        let id = state.next_result_id;
        let mut row = result.clone();
        row.id = Some(id);
        state.results.push(row);
        Ok(id)
    }

    async fn prune_results(&self, post_id: &str, keep_last: usize) -> Result<u64> {
        let mut state = self.lock();
        let total = state.results.iter().filter(|r| r.post_id == post_id).count();
        let excess = total.saturating_sub(keep_last);
        let mut skipped = 0;
        state.results.retain(|r| {
            if r.post_id != post_id || skipped >= excess {
                return true;
            }
            skipped += 1;
            false
        });
        Ok(excess as u64)
    }
}
