//! Core types for Postify

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PostifyError, Result};

/// Platform name used for call-level failures that are not tied to a platform.
pub const SYSTEM_OUTCOME_PLATFORM: &str = "error";

/// Supported publishing targets.
///
/// Declaration order is the fixed publishing priority: outcomes are always
/// reported in this order regardless of completion timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Telegram,
    Instagram,
    Facebook,
    WhatsApp,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 4] = [
        PlatformKind::Telegram,
        PlatformKind::Instagram,
        PlatformKind::Facebook,
        PlatformKind::WhatsApp,
    ];

    /// Lowercase identifier used on the wire and in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Telegram => "telegram",
            PlatformKind::Instagram => "instagram",
            PlatformKind::Facebook => "facebook",
            PlatformKind::WhatsApp => "whatsapp",
        }
    }

    /// Human-facing name, used in messages and default account names
    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::Telegram => "Telegram",
            PlatformKind::Instagram => "Instagram",
            PlatformKind::Facebook => "Facebook",
            PlatformKind::WhatsApp => "WhatsApp",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = PostifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "telegram" => Ok(PlatformKind::Telegram),
            "instagram" => Ok(PlatformKind::Instagram),
            "facebook" => Ok(PlatformKind::Facebook),
            "whatsapp" => Ok(PlatformKind::WhatsApp),
            other => Err(PostifyError::InvalidInput(format!(
                "Unsupported platform: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = PostifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            other => Err(PostifyError::InvalidInput(format!("Unknown post status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    /// Media storage reference, resolved through `MediaStore`
    pub image: Option<String>,
    pub generated_image_prompt: Option<String>,
    pub status: PostStatus,
    pub scheduled_time: Option<i64>,
    pub created_at: i64,
    pub posted_at: Option<i64>,
}

impl Post {
    pub fn new(owner_id: String, title: String, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            title,
            content,
            image: None,
            generated_image_prompt: None,
            status: PostStatus::Draft,
            scheduled_time: None,
            created_at: chrono::Utc::now().timestamp(),
            posted_at: None,
        }
    }

    /// `title`, a blank line, then the body
    pub fn caption(&self) -> String {
        format!("{}\n\n{}", self.title, self.content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SocialAccount {
    pub id: String,
    pub owner_id: String,
    pub platform: PlatformKind,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(skip_serializing)]
    pub chat_id: String,
    pub is_active: bool,
    pub created_at: i64,
}

impl SocialAccount {
    /// Placeholder account created the first time a user publishes to a platform
    pub fn placeholder(owner_id: &str, platform: PlatformKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            platform,
            display_name: format!("Your {} Account", platform.display_name()),
            token: String::new(),
            chat_id: String::new(),
            is_active: true,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// One append-only row per delivery attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostResult {
    pub id: Option<i64>,
    pub post_id: String,
    pub account_id: String,
    pub success: bool,
    /// Empty on success
    pub error_message: String,
    pub posted_at: i64,
}

/// Per-platform entry returned to the caller of a publish
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub platform: String,
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn new(platform: PlatformKind, success: bool, message: impl Into<String>) -> Self {
        Self {
            platform: platform.as_str().to_string(),
            success,
            message: message.into(),
        }
    }

    /// Call-level failure not attributable to any platform
    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            platform: SYSTEM_OUTCOME_PLATFORM.to_string(),
            success: false,
            message: message.into(),
        }
    }
}

/// The set of platforms requested for one publish call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSelection {
    flags: BTreeMap<PlatformKind, bool>,
}

impl PlatformSelection {
    /// Build a selection from wire names, rejecting unknown platforms
    pub fn from_names(names: &BTreeMap<String, bool>) -> Result<Self> {
        let mut flags = BTreeMap::new();
        for (name, enabled) in names {
            flags.insert(name.parse::<PlatformKind>()?, *enabled);
        }
        Ok(Self { flags })
    }

    pub fn only(platforms: &[PlatformKind]) -> Self {
        Self {
            flags: platforms.iter().map(|p| (*p, true)).collect(),
        }
    }

    /// Truthy platforms in priority order
    pub fn selected(&self) -> Vec<PlatformKind> {
        self.flags
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(platform, _)| *platform)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.selected().is_empty()
    }
}

/// Opaque per-platform credential bundle supplied with a single request.
/// Values are never persisted.
#[derive(Debug, Default)]
pub struct CredentialBundle {
    values: HashMap<String, SecretString>,
}

impl CredentialBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values
            .insert(key.to_string(), SecretString::from(value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.expose_secret())
            .filter(|v| !v.is_empty())
    }
}

/// Credentials for all platforms in one publish call
#[derive(Debug, Default)]
pub struct PublishCredentials {
    bundles: HashMap<PlatformKind, CredentialBundle>,
}

impl PublishCredentials {
    /// Build from the wire shape. Entries for unknown platforms are ignored.
    pub fn from_wire(raw: &BTreeMap<String, BTreeMap<String, String>>) -> Self {
        let mut bundles = HashMap::new();
        for (platform, values) in raw {
            let Ok(kind) = platform.parse::<PlatformKind>() else {
                tracing::debug!("Ignoring credentials for unknown platform '{}'", platform);
                continue;
            };
            let bundle = values
                .iter()
                .fold(CredentialBundle::new(), |b, (k, v)| b.with(k, v));
            bundles.insert(kind, bundle);
        }
        Self { bundles }
    }

    pub fn insert(&mut self, platform: PlatformKind, bundle: CredentialBundle) {
        self.bundles.insert(platform, bundle);
    }

    pub fn get(&self, platform: PlatformKind) -> Option<&CredentialBundle> {
        self.bundles.get(&platform)
    }
}

/// Supported image MIME types for post media
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}
