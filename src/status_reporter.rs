use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};
use crate::hub_client::HubClient;
use crate::slideshow_controller::StatusSnapshot;

/// Posts status snapshots to a fixed URL.
#[derive(Clone)]
pub struct WebhookClient {
    http: Client,
    url: Url,
}

impl WebhookClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            url: Url::parse(url)?,
        })
    }

    pub async fn post(&self, status: &StatusSnapshot) -> Result<()> {
        let response = self.http.post(self.url.clone()).json(status).send().await?;
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus(response.status()));
        }
        Ok(())
    }
}

/// Fans controller status out to the hub and the webhook. Failures are
/// logged and never reach the controller.
#[derive(Default)]
pub struct StatusReporter {
    hub: Option<HubClient>,
    webhook: Option<WebhookClient>,
}

impl StatusReporter {
    pub fn new(hub: Option<HubClient>, webhook: Option<WebhookClient>) -> Self {
        Self { hub, webhook }
    }

    pub async fn report(&self, status: &StatusSnapshot) {
        if let Some(hub) = &self.hub {
            if let Err(e) = hub.publish_status(status).await {
                tracing::warn!("Failed to publish status to MQTT: {}", e);
            }
        }
        if let Some(webhook) = &self.webhook {
            if let Err(e) = webhook.post(status).await {
                tracing::warn!("Failed to post status to webhook: {}", e);
            }
        }
    }

    pub async fn run(self, mut statuses: mpsc::Receiver<StatusSnapshot>) {
        while let Some(status) = statuses.recv().await {
            tracing::debug!(
                "Status: {:?} at {:?}/{}",
                status.current_image_id,
                status.position_index,
                status.total_count
            );
            self.report(&status).await;
        }
        tracing::debug!("Status channel closed");
    }
}
