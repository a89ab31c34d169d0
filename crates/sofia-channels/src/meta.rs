//! Outbound delivery through the Meta Graph API.
//!
//! One channel covers all three platforms: WhatsApp Cloud API posts to
//! `/{phone_id}/messages`, Messenger (Facebook and Instagram) posts to
//! `/{page_id}/messages`. Transport failures are retried a bounded number
//! of times; an HTTP error status is terminal for the call.

use async_trait::async_trait;
use serde_json::{json, Value};
use sofia_core::{
    config::ChannelConfig,
    error::SofiaError,
    message::Platform,
    traits::Channel,
};
use std::time::Duration;
use tracing::{info, warn};

const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v20.0";

/// Outbound message length cap. Above this the text is cut and marked
/// with an ellipsis before the network call.
const MAX_MESSAGE_CHARS: usize = 4000;

/// Bounded transport retry: attempts per send and the pause between them.
const MAX_SEND_ATTEMPTS: u32 = 3;
const SEND_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Graph API delivery client for WhatsApp, Facebook, and Instagram.
pub struct MetaChannel {
    client: reqwest::Client,
    whatsapp: Option<WhatsAppRoute>,
    messenger: Option<MessengerRoute>,
    base_url: String,
    retry_delay: Duration,
}

struct WhatsAppRoute {
    token: String,
    phone_id: String,
}

struct MessengerRoute {
    page_token: String,
    page_id: String,
}

struct DeliveryRequest {
    url: String,
    token: String,
    body: Value,
}

impl MetaChannel {
    /// Create from config values. The client timeout bounds each delivery
    /// call so a stuck Graph API never holds a worker slot.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, SofiaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SofiaError::Channel(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            whatsapp: config.whatsapp.as_ref().map(|wa| WhatsAppRoute {
                token: wa.token.clone(),
                phone_id: wa.phone_id.clone(),
            }),
            messenger: config.messenger.as_ref().map(|fb| MessengerRoute {
                page_token: fb.page_token.clone(),
                page_id: fb.page_id.clone(),
            }),
            base_url: GRAPH_BASE_URL.to_string(),
            retry_delay: SEND_RETRY_DELAY,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self.retry_delay = Duration::ZERO;
        self
    }

    /// Resolve the endpoint, credential, and payload for a platform.
    fn route(
        &self,
        platform: Platform,
        recipient_id: &str,
        text: &str,
    ) -> Result<DeliveryRequest, SofiaError> {
        match platform {
            Platform::Whatsapp => {
                let wa = self.whatsapp.as_ref().ok_or_else(|| {
                    SofiaError::Channel("whatsapp channel not configured".into())
                })?;
                Ok(DeliveryRequest {
                    url: format!("{}/{}/messages", self.base_url, wa.phone_id),
                    token: wa.token.clone(),
                    body: json!({
                        "messaging_product": "whatsapp",
                        "to": recipient_id,
                        "type": "text",
                        "text": {"body": text},
                    }),
                })
            }
            Platform::Facebook | Platform::Instagram => {
                let fb = self.messenger.as_ref().ok_or_else(|| {
                    SofiaError::Channel("messenger channel not configured".into())
                })?;
                Ok(DeliveryRequest {
                    url: format!("{}/{}/messages", self.base_url, fb.page_id),
                    token: fb.page_token.clone(),
                    body: json!({
                        "recipient": {"id": recipient_id},
                        "message": {"text": text},
                    }),
                })
            }
        }
    }
}

/// Cap `text` at [`MAX_MESSAGE_CHARS`] chars, marking the cut with an
/// ellipsis. Char-boundary safe.
fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    out.push('…');
    out
}

#[async_trait]
impl Channel for MetaChannel {
    fn name(&self) -> &str {
        "meta"
    }

    async fn send(
        &self,
        platform: Platform,
        recipient_id: &str,
        text: &str,
    ) -> Result<(), SofiaError> {
        if recipient_id.is_empty() || text.is_empty() {
            return Err(SofiaError::Channel(
                "send requires a non-empty recipient and text".into(),
            ));
        }

        let text = truncate_message(text);
        let request = self.route(platform, recipient_id, &text)?;

        let mut attempt = 1u32;
        loop {
            match self
                .client
                .post(&request.url)
                .bearer_auth(&request.token)
                .json(&request.body)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    info!("delivered to {recipient_id} via {platform}");
                    return Ok(());
                }
                Ok(resp) => {
                    // HTTP error statuses (invalid recipient, expired
                    // token) are not transient — no retry.
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(SofiaError::Channel(format!(
                        "{platform} delivery failed ({status}): {body}"
                    )));
                }
                Err(e) if attempt < MAX_SEND_ATTEMPTS => {
                    warn!(
                        "{platform} delivery transport error (attempt {attempt}/{MAX_SEND_ATTEMPTS}): {e}"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    return Err(SofiaError::Channel(format!(
                        "{platform} delivery failed after {MAX_SEND_ATTEMPTS} attempts: {e}"
                    )));
                }
            }
        }
    }
}
