//! Telegram Bot API adapter

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::error::PlatformError;
use crate::platforms::{transport_error, Delivery, Platform};
use crate::types::{CredentialBundle, PlatformKind, SocialAccount};

const KIND: PlatformKind = PlatformKind::Telegram;

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramPlatform {
    client: Client,
    api_base: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramPlatform {
    pub fn new(config: &TelegramConfig, client: Client) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone().filter(|t| !t.is_empty()),
            chat_id: config.chat_id.clone().filter(|c| !c.is_empty()),
        }
    }

    /// Token and chat stored on the account win over process configuration
    fn target<'a>(&'a self, account: &'a SocialAccount) -> Option<(&'a str, &'a str)> {
        let token = Some(account.token.as_str())
            .filter(|t| !t.is_empty())
            .or(self.bot_token.as_deref())?;
        let chat = Some(account.chat_id.as_str())
            .filter(|c| !c.is_empty())
            .or(self.chat_id.as_deref())?;
        Some((token, chat))
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, token, method)
    }
}

#[async_trait]
impl Platform for TelegramPlatform {
    fn kind(&self) -> PlatformKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    async fn deliver(
        &self,
        delivery: &Delivery,
        account: &SocialAccount,
        _credentials: Option<&CredentialBundle>,
    ) -> Result<String, PlatformError> {
        let (token, chat_id) = self.target(account).ok_or_else(|| {
            PlatformError::Configuration("Telegram credentials not configured".to_string())
        })?;
        let caption = delivery.post.caption();

        let request = match delivery.image_bytes().await? {
            Some((bytes, image)) => {
                debug!("Sending photo {} to Telegram chat {}", image.file_name(), chat_id);
                let photo = Part::bytes(bytes)
                    .file_name(image.file_name())
                    .mime_str(image.mime.as_str())
                    .map_err(|e| transport_error(KIND, e))?;
                let form = Form::new()
                    .text("chat_id", chat_id.to_string())
                    .text("caption", caption)
                    .part("photo", photo);
                self.client
                    .post(self.method_url(token, "sendPhoto"))
                    .multipart(form)
            }
            None => {
                debug!("Sending text message to Telegram chat {}", chat_id);
                self.client
                    .post(self.method_url(token, "sendMessage"))
                    .json(&json!({ "chat_id": chat_id, "text": caption }))
            }
        };

        let response = request.send().await.map_err(|e| transport_error(KIND, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(KIND, e))?;

        match serde_json::from_str::<BotResponse>(&body) {
            Ok(reply) if reply.ok && status.is_success() => {
                Ok("Posted to Telegram successfully".to_string())
            }
            Ok(reply) => Err(PlatformError::Rejected(
                reply.description.unwrap_or_else(|| format!("HTTP {}", status)),
            )),
            Err(_) if status.is_success() => Err(PlatformError::Rejected(format!(
                "Unexpected Telegram response: {}",
                body
            ))),
            Err(_) => Err(PlatformError::Rejected(body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Post;

    fn config(token: Option<&str>, chat: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.map(str::to_string),
            chat_id: chat.map(str::to_string),
            // Nothing listens here; tests below never reach the network
            api_base: "http://127.0.0.1:9".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_configuration_fails_without_network() {
        let platform = TelegramPlatform::new(&config(Some("tok"), None), Client::new());
        let post = Post::new("u".to_string(), "t".to_string(), "b".to_string());
        let account = SocialAccount::placeholder("u", KIND);

        let err = platform
            .deliver(&Delivery::text_only(post), &account, None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PlatformError::Configuration("Telegram credentials not configured".to_string())
        );
        assert!(!platform.is_configured());
    }

    #[test]
    fn test_account_values_override_configuration() {
        let platform = TelegramPlatform::new(&config(Some("tok"), Some("@chan")), Client::new());
        let mut account = SocialAccount::placeholder("u", KIND);
        assert_eq!(platform.target(&account), Some(("tok", "@chan")));

        account.chat_id = "-100123".to_string();
        assert_eq!(platform.target(&account), Some(("tok", "-100123")));
    }

    #[test]
    fn test_blank_configuration_counts_as_missing() {
        let platform = TelegramPlatform::new(&config(Some(""), Some("@chan")), Client::new());
        assert!(!platform.is_configured());
    }
}
