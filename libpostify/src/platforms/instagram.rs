//! Instagram adapter (private mobile API)
//!
//! Credentials arrive with each request and are never stored. Every attempt
//! logs in afresh, uploads the photo, then configures it as a feed post.
//! A random pause between the three requests keeps the traffic pattern
//! closer to a human client.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::InstagramConfig;
use crate::error::PlatformError;
use crate::platforms::{check_status, transport_error, Delivery, Platform};
use crate::types::{CredentialBundle, PlatformKind, SocialAccount};

const KIND: PlatformKind = PlatformKind::Instagram;
const AUTH_HEADER: &str = "ig-set-authorization";

#[derive(Debug, Deserialize)]
struct ApiReply {
    status: Option<String>,
    message: Option<String>,
    upload_id: Option<String>,
}

impl ApiReply {
    fn into_result(self, step: &str) -> Result<Self, PlatformError> {
        if self.status.as_deref() == Some("ok") {
            Ok(self)
        } else {
            Err(PlatformError::Rejected(self.message.unwrap_or_else(|| {
                format!("Instagram {} failed", step)
            })))
        }
    }
}

pub struct InstagramPlatform {
    client: Client,
    api_base: String,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl InstagramPlatform {
    pub fn new(config: &InstagramConfig, client: Client) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    async fn pause(&self) {
        if self.max_delay_ms == 0 {
            return;
        }
        let ms = rand::thread_rng().gen_range(self.min_delay_ms..=self.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn authorized(request: RequestBuilder, auth: &Option<String>) -> RequestBuilder {
        match auth {
            Some(value) => request.header("Authorization", value),
            None => request,
        }
    }

    async fn read_reply(
        response: reqwest::Response,
        step: &str,
    ) -> Result<ApiReply, PlatformError> {
        let response = check_status(KIND, response).await?;
        let reply: ApiReply = response.json().await.map_err(|e| {
            PlatformError::Rejected(format!("Unexpected Instagram {} response: {}", step, e))
        })?;
        reply.into_result(step)
    }

    async fn login(&self, username: &str, password: &str) -> Result<Option<String>, PlatformError> {
        debug!("Logging in to Instagram as {}", username);
        let response = self
            .client
            .post(format!("{}/accounts/login/", self.api_base))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;

        let auth = response
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self::read_reply(response, "login").await?;
        Ok(auth)
    }
}

#[async_trait]
impl Platform for InstagramPlatform {
    fn kind(&self) -> PlatformKind {
        KIND
    }

    /// Instagram only needs per-request credentials
    fn is_configured(&self) -> bool {
        true
    }

    async fn deliver(
        &self,
        delivery: &Delivery,
        _account: &SocialAccount,
        credentials: Option<&CredentialBundle>,
    ) -> Result<String, PlatformError> {
        let Some((bytes, image)) = delivery.image_bytes().await? else {
            return Err(PlatformError::InvalidInput(
                "Instagram requires an image".to_string(),
            ));
        };

        let (Some(username), Some(password)) = (
            credentials.and_then(|c| c.get("username")),
            credentials.and_then(|c| c.get("password")),
        ) else {
            return Err(PlatformError::InvalidInput(
                "Instagram credentials required".to_string(),
            ));
        };

        let auth = self.login(username, password).await?;
        self.pause().await;

        let upload_id = chrono::Utc::now().timestamp_millis().to_string();
        let rupload_params = json!({
            "upload_id": upload_id,
            "media_type": "1",
            "image_compression": json!({ "lib_name": "moz", "lib_version": "3.1.m", "quality": "80" }).to_string(),
        });
        let upload = self
            .client
            .post(format!("{}/rupload_igphoto/{}", self.api_base, upload_id))
            .header("X-Instagram-Rupload-Params", rupload_params.to_string())
            .header("X-Entity-Type", image.mime.as_str())
            .header("X-Entity-Name", format!("{}_0", upload_id))
            .header("X-Entity-Length", bytes.len().to_string())
            .header("Offset", "0")
            .body(bytes);
        let response = Self::authorized(upload, &auth)
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;
        let uploaded = Self::read_reply(response, "upload").await?;
        let upload_id = uploaded.upload_id.unwrap_or(upload_id);
        self.pause().await;

        let configure = self
            .client
            .post(format!("{}/media/configure/", self.api_base))
            .form(&[
                ("upload_id", upload_id.as_str()),
                ("caption", delivery.post.content.as_str()),
            ]);
        let response = Self::authorized(configure, &auth)
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;
        Self::read_reply(response, "configure").await?;

        Ok("Posted to Instagram successfully".to_string())
    }
}
