use anyhow::Context;
use clap::Parser;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use photo_daydream_rs::asset_source::ImmichClient;
use photo_daydream_rs::config::Settings;
use photo_daydream_rs::http_server;
use photo_daydream_rs::hub_client::HubClient;
use photo_daydream_rs::presentation::LogPresentation;
use photo_daydream_rs::settings_watch::watch_settings;
use photo_daydream_rs::slideshow_controller::{SlideshowCommand, SlideshowController, SlideshowHandle};
use photo_daydream_rs::status_reporter::{StatusReporter, WebhookClient};

const STATUS_BUFFER: usize = 64;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON settings file; watched for changes
    #[arg(short, long, default_value = "daydream.json")]
    settings: PathBuf,

    /// Photo server base URL
    #[arg(long, env = "IMMICH_URL")]
    server_url: Option<String>,

    /// Photo server API key
    #[arg(long, env = "IMMICH_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Device id used in MQTT topics (hostname if not provided)
    #[arg(long)]
    device_id: Option<String>,

    /// MQTT broker URL, e.g. mqtt://hub.local:1883
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// URL that receives status snapshots as JSON
    #[arg(long)]
    webhook_url: Option<String>,

    /// HTTP server port for local control
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Timeout for outgoing HTTP requests, in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// Do not reload the settings file when it changes
    #[arg(long)]
    no_watch: bool,
}

impl Args {
    fn apply_overrides(&self, settings: &mut Settings) {
        let overrides = [
            (&self.server_url, &mut settings.server_url),
            (&self.api_key, &mut settings.api_key),
            (&self.device_id, &mut settings.device_id),
            (&self.mqtt_broker, &mut settings.mqtt_broker),
            (&self.webhook_url, &mut settings.webhook_url),
        ];
        for (cli, file) in overrides {
            if cli.is_some() {
                *file = cli.clone();
            }
        }
    }
}

fn setup_signal_handler(handle: SlideshowHandle) -> std::io::Result<thread::JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    Ok(thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::info!("Received signal {}, shutting down", signal);
            let _ = handle.blocking_send(SlideshowCommand::Shutdown);
        }
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut settings = Settings::load_or_default(&args.settings)
        .with_context(|| format!("failed to load {}", args.settings.display()))?;
    args.apply_overrides(&mut settings);
    settings.validate().context("invalid settings")?;

    let device_id = settings.device_id();
    let timeout = Duration::from_secs(args.request_timeout);
    let server_url = settings.server_url.clone().context("serverUrl is required")?;
    let api_key = settings.api_key.clone().context("apiKey is required")?;

    tracing::info!("Photo daydream {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Device ID: {}", device_id);
    tracing::info!("Photo server: {}", server_url);
    tracing::info!("Profiles in catalogue: {}", settings.profiles.len());

    let source = Arc::new(ImmichClient::new(&server_url, &api_key, timeout).context("invalid photo server settings")?);

    let (status_sender, status_receiver) = mpsc::channel(STATUS_BUFFER);
    let (controller, handle) = SlideshowController::new(
        settings.slideshow_config(),
        source,
        Box::new(LogPresentation::default()),
    );
    let controller = controller
        .with_profiles(settings.profiles.clone())
        .with_status_sender(status_sender)
        .with_refresh_interval(settings.refresh_interval());
    let controller_task = tokio::spawn(controller.run());

    let hub = match settings.mqtt_broker.as_deref() {
        Some(broker) => match HubClient::connect(broker, device_id.clone(), handle.clone()).await {
            Ok(hub) => {
                hub.spawn_heartbeat();
                Some(hub)
            }
            Err(e) => {
                tracing::warn!("MQTT control disabled: {}", e);
                None
            }
        },
        None => None,
    };
    let webhook = settings
        .webhook_url
        .as_deref()
        .map(|url| WebhookClient::new(url, timeout))
        .transpose()
        .context("invalid webhook url")?;
    tokio::spawn(StatusReporter::new(hub, webhook).run(status_receiver));

    let _watcher = if args.no_watch {
        None
    } else {
        match watch_settings(&args.settings, handle.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!("Settings hot reload disabled: {}", e);
                None
            }
        }
    };

    setup_signal_handler(handle.clone()).context("failed to install signal handler")?;

    tokio::spawn(http_server::run_http_server(args.http_port, handle));

    controller_task.await.context("slideshow controller failed")?;
    tracing::info!("Goodbye");
    Ok(())
}
