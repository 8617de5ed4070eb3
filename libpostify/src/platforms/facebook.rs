//! Facebook page adapter (Graph API)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::debug;

use crate::config::FacebookConfig;
use crate::error::PlatformError;
use crate::platforms::{check_status, transport_error, Delivery, Platform};
use crate::types::{CredentialBundle, PlatformKind, SocialAccount};

const KIND: PlatformKind = PlatformKind::Facebook;

pub struct FacebookPlatform {
    client: Client,
    graph_base: String,
    page_id: Option<String>,
    access_token: Option<String>,
}

impl FacebookPlatform {
    pub fn new(config: &FacebookConfig, client: Client) -> Self {
        Self {
            client,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            page_id: config.page_id.clone().filter(|p| !p.is_empty()),
            access_token: config.access_token.clone().filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl Platform for FacebookPlatform {
    fn kind(&self) -> PlatformKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        self.page_id.is_some() && self.access_token.is_some()
    }

    async fn deliver(
        &self,
        delivery: &Delivery,
        _account: &SocialAccount,
        _credentials: Option<&CredentialBundle>,
    ) -> Result<String, PlatformError> {
        let (Some(page_id), Some(token)) = (&self.page_id, &self.access_token) else {
            return Err(PlatformError::Configuration(
                "Facebook credentials not configured".to_string(),
            ));
        };
        let message = delivery.post.caption();

        let request = match delivery.image_bytes().await? {
            Some((bytes, image)) => {
                debug!("Uploading photo to Facebook page {}", page_id);
                let source = Part::bytes(bytes)
                    .file_name(image.file_name())
                    .mime_str(image.mime.as_str())
                    .map_err(|e| transport_error(KIND, e))?;
                let form = Form::new()
                    .text("caption", message)
                    .text("access_token", token.clone())
                    .part("source", source);
                self.client
                    .post(format!("{}/{}/photos", self.graph_base, page_id))
                    .multipart(form)
            }
            None => {
                debug!("Posting to Facebook page {} feed", page_id);
                self.client
                    .post(format!("{}/{}/feed", self.graph_base, page_id))
                    .form(&[("message", message.as_str()), ("access_token", token.as_str())])
            }
        };

        let response = request.send().await.map_err(|e| transport_error(KIND, e))?;
        check_status(KIND, response).await?;

        Ok("Posted to Facebook successfully".to_string())
    }
}
