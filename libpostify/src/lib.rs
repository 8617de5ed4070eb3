//! Postify - publish one post to several social platforms
//!
//! This library holds the domain model, persistence, platform adapters and
//! the publish orchestrator shared by the `postify-server` HTTP API and the
//! `postify-send` scheduling daemon.

pub mod accounts;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod image_gen;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod poster;
pub mod scheduling;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use accounts::AccountResolver;
pub use config::Config;
pub use db::{Database, ResultWithAccount};
pub use error::{PostifyError, Result};
pub use identity::{IdentityService, MemorySessionStore, Session, SessionStore};
pub use media::{MediaStore, ResolvedImage};
pub use poster::{MultiPlatformPoster, PublishPolicy};
pub use store::{ContentStore, MemoryStore};
pub use types::{
    CredentialBundle, Outcome, PlatformKind, PlatformSelection, Post, PostResult, PostStatus,
    PublishCredentials, SocialAccount, User,
};
