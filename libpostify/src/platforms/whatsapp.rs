//! WhatsApp Business Cloud API adapter
//!
//! Sends a text message to one configured recipient. Images are not
//! forwarded; the caption is delivered on its own.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::WhatsAppConfig;
use crate::error::PlatformError;
use crate::platforms::{check_status, transport_error, Delivery, Platform};
use crate::types::{CredentialBundle, PlatformKind, SocialAccount};

const KIND: PlatformKind = PlatformKind::WhatsApp;

pub struct WhatsAppPlatform {
    client: Client,
    graph_base: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
    recipient: Option<String>,
}

impl WhatsAppPlatform {
    pub fn new(config: &WhatsAppConfig, client: Client) -> Self {
        let non_blank = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        Self {
            client,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            access_token: non_blank(&config.access_token),
            phone_number_id: non_blank(&config.phone_number_id),
            recipient: non_blank(&config.recipient),
        }
    }
}

#[async_trait]
impl Platform for WhatsAppPlatform {
    fn kind(&self) -> PlatformKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some() && self.phone_number_id.is_some() && self.recipient.is_some()
    }

    async fn deliver(
        &self,
        delivery: &Delivery,
        _account: &SocialAccount,
        _credentials: Option<&CredentialBundle>,
    ) -> Result<String, PlatformError> {
        let (Some(token), Some(phone_id), Some(to)) =
            (&self.access_token, &self.phone_number_id, &self.recipient)
        else {
            return Err(PlatformError::Configuration(
                "WhatsApp credentials not configured".to_string(),
            ));
        };

        if delivery.image.is_some() {
            debug!("WhatsApp adapter sends text only, skipping image");
        }

        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": delivery.post.caption() },
        });

        let response = self
            .client
            .post(format!("{}/{}/messages", self.graph_base, phone_id))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;
        check_status(KIND, response).await?;

        Ok("Sent to WhatsApp successfully".to_string())
    }
}
