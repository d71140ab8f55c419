//! MQTT link to the home-automation hub.
//!
//! Commands arrive on `daydream/<device>/command` as
//! `{"command": "...", "payload": {...}}`; status snapshots, heartbeats and
//! errors are published next to it.

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::ConfigUpdate;
use crate::error::{Error, Result};
use crate::slideshow_controller::{SlideshowCommand, SlideshowHandle, StatusSnapshot};

const DEFAULT_MQTT_PORT: u16 = 1883;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubCommand {
    pub command: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ProfilePayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct BrightnessPayload {
    level: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMessage {
    pub device_id: String,
    pub timestamp: String,
    pub status: String,
    pub uptime_seconds: u64,
}

pub fn topic(device_id: &str, leaf: &str) -> String {
    format!("daydream/{}/{}", device_id, leaf)
}

/// Accepts `mqtt://host:port`, `tcp://host` or a bare `host[:port]`.
pub fn broker_address(broker_url: &str) -> Result<(String, u16)> {
    let with_scheme = if broker_url.contains("://") {
        broker_url.to_string()
    } else {
        format!("mqtt://{}", broker_url)
    };
    let url = url::Url::parse(&with_scheme)?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::InvalidConfig(format!("mqtt broker '{}' has no host", broker_url)))?;
    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

/// Maps a hub message to a controller command. Unknown commands give `None`.
pub fn parse_command(payload: &[u8]) -> Result<Option<SlideshowCommand>> {
    let message: HubCommand = serde_json::from_slice(payload)?;

    let command = match message.command.as_str() {
        "configure" => {
            let update: ConfigUpdate = serde_json::from_value(message.payload)?;
            update.validate()?;
            SlideshowCommand::Configure(update)
        }
        "refresh" => SlideshowCommand::Refresh,
        "next" => SlideshowCommand::Next,
        "previous" => SlideshowCommand::Previous,
        "set_profile" => {
            let profile: ProfilePayload = serde_json::from_value(message.payload)?;
            SlideshowCommand::SetProfile(profile.name)
        }
        "slideshow_start" => SlideshowCommand::StartSlideshow,
        "slideshow_exit" => SlideshowCommand::ExitSlideshow,
        "show_info" => SlideshowCommand::ShowInfoPanel,
        "hide_info" => SlideshowCommand::HideInfoPanel,
        "set_brightness" => {
            let brightness: BrightnessPayload = serde_json::from_value(message.payload)?;
            SlideshowCommand::SetBrightness(brightness.level.min(100))
        }
        other => {
            tracing::info!("Ignoring unknown hub command: {}", other);
            return Ok(None);
        }
    };
    Ok(Some(command))
}

#[derive(Clone)]
pub struct HubClient {
    client: AsyncClient,
    device_id: String,
}

impl HubClient {
    pub async fn connect(broker_url: &str, device_id: String, handle: SlideshowHandle) -> Result<Self> {
        let (host, port) = broker_address(broker_url)?;

        let mut options = MqttOptions::new(&device_id, &host, port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        let command_topic = topic(&device_id, "command");
        client.subscribe(&command_topic, QoS::AtLeastOnce).await?;
        tracing::info!("MQTT connecting to {}:{}, subscribed to {}", host, port, command_topic);

        let hub = Self { client, device_id };

        let listener = hub.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(publish))) if publish.topic == command_topic => {
                        listener.on_command(&publish.payload, &handle).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT connection error: {}", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        Ok(hub)
    }

    async fn on_command(&self, payload: &[u8], handle: &SlideshowHandle) {
        let command = match parse_command(payload) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Rejected hub command: {}", e);
                if let Err(e) = self.publish_error(&format!("Rejected command: {}", e)).await {
                    tracing::warn!("Failed to publish error: {}", e);
                }
                return;
            }
        };

        tracing::debug!("Hub command: {:?}", command);
        if let Err(e) = handle.send(command).await {
            tracing::warn!("Dropping hub command: {}", e);
        }
    }

    pub async fn publish_status(&self, status: &StatusSnapshot) -> Result<()> {
        let payload = serde_json::to_string(status)?;
        self.client
            .publish(topic(&self.device_id, "status"), QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    pub async fn publish_error(&self, error: &str) -> Result<()> {
        let payload = serde_json::json!({
            "error": error,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        self.client
            .publish(topic(&self.device_id, "error"), QoS::AtLeastOnce, false, payload.to_string())
            .await?;
        Ok(())
    }

    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let client = self.client.clone();
        let device_id = self.device_id.clone();
        let started = Instant::now();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            let heartbeat_topic = topic(&device_id, "heartbeat");
            loop {
                ticker.tick().await;
                let heartbeat = HeartbeatMessage {
                    device_id: device_id.clone(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    status: "online".to_string(),
                    uptime_seconds: started.elapsed().as_secs(),
                };
                match serde_json::to_string(&heartbeat) {
                    Ok(payload) => {
                        if let Err(e) = client
                            .publish(&heartbeat_topic, QoS::AtLeastOnce, false, payload)
                            .await
                        {
                            tracing::warn!("Failed to publish heartbeat: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!("Failed to encode heartbeat: {}", e),
                }
            }
        })
    }
}
