use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::asset_source::AssetSource;
use crate::config::{ConfigUpdate, SlideshowConfig};
use crate::error::{Error, Result};
use crate::model::{AssetRef, DisplayMode, Profile};
use crate::playlist::{ApplyOutcome, FetchPlan, FetchedBatch, PlaylistStore, Step};
use crate::presentation::{Presentation, Transition};
use crate::scheduler::RotationScheduler;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug)]
pub enum SlideshowCommand {
    Configure(ConfigUpdate),
    Refresh,
    Next,
    Previous,
    SetProfile(String),
    StartSlideshow,
    ExitSlideshow,
    ShowInfoPanel,
    HideInfoPanel,
    GetBrightness(oneshot::Sender<u8>),
    SetBrightness(u8),
    Status(oneshot::Sender<StatusSnapshot>),
    UpdateProfiles(Vec<Profile>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub current_image_id: Option<String>,
    pub current_image_url: Option<String>,
    pub profile_name: String,
    pub position_index: Option<usize>,
    pub total_count: usize,
    pub display_mode: DisplayMode,
    pub last_refresh_timestamp: Option<i64>,
}

/// Cloneable sender side of the controller.
#[derive(Debug, Clone)]
pub struct SlideshowHandle {
    tx: mpsc::Sender<SlideshowCommand>,
}

impl SlideshowHandle {
    pub async fn send(&self, command: SlideshowCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::ControllerGone)
    }

    /// For threads outside the runtime (file watcher, signal handler).
    pub fn blocking_send(&self, command: SlideshowCommand) -> Result<()> {
        self.tx.blocking_send(command).map_err(|_| Error::ControllerGone)
    }

    pub async fn configure(&self, update: ConfigUpdate) -> Result<()> {
        update.validate()?;
        self.send(SlideshowCommand::Configure(update)).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SlideshowCommand::Status(reply)).await?;
        rx.await.map_err(|_| Error::ControllerGone)
    }

    pub async fn brightness(&self) -> Result<u8> {
        let (reply, rx) = oneshot::channel();
        self.send(SlideshowCommand::GetBrightness(reply)).await?;
        rx.await.map_err(|_| Error::ControllerGone)
    }
}

/// Owns the playlist, the rotation timer and the display. Everything else
/// talks to it through a [`SlideshowHandle`].
pub struct SlideshowController {
    config: SlideshowConfig,
    profiles: Vec<Profile>,
    store: PlaylistStore,
    scheduler: RotationScheduler,
    presentation: Box<dyn Presentation>,
    commands: mpsc::Receiver<SlideshowCommand>,
    status_sender: Option<mpsc::Sender<StatusSnapshot>>,
    fetches: JoinSet<FetchedBatch>,
    refresh_every: Option<Duration>,
    slideshow_visible: bool,
    info_panel_open: bool,
}

impl SlideshowController {
    pub fn new(
        config: SlideshowConfig,
        source: Arc<dyn AssetSource>,
        presentation: Box<dyn Presentation>,
    ) -> (Self, SlideshowHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let controller = Self {
            store: PlaylistStore::new(source, config.fetch_options()),
            scheduler: RotationScheduler::new(config.interval),
            config,
            profiles: Vec::new(),
            presentation,
            commands,
            status_sender: None,
            fetches: JoinSet::new(),
            refresh_every: None,
            slideshow_visible: true,
            info_panel_open: false,
        };
        (controller, SlideshowHandle { tx })
    }

    pub fn with_profiles(mut self, profiles: Vec<Profile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_status_sender(mut self, status_sender: mpsc::Sender<StatusSnapshot>) -> Self {
        self.status_sender = Some(status_sender);
        self
    }

    pub fn with_refresh_interval(mut self, refresh_every: Option<Duration>) -> Self {
        self.refresh_every = refresh_every;
        self
    }

    pub async fn run(mut self) {
        tracing::info!(
            "Slideshow controller started: profile '{}', {} mode, {}s interval",
            self.config.profile.name,
            self.config.display_mode.as_str(),
            self.config.interval.as_secs()
        );

        let mut refresh = self.refresh_every.map(|every| {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        self.scheduler.start();
        self.load(false);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SlideshowCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                _ = self.scheduler.fired() => self.on_tick(),
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    self.on_fetch_joined(joined)
                }
                _ = next_refresh(&mut refresh) => {
                    tracing::debug!("Periodic refresh");
                    self.load(true);
                }
            }
        }

        self.scheduler.stop();
        self.fetches.abort_all();
        self.store.cancel_pending();
        tracing::info!("Slideshow controller stopped");
    }

    fn handle_command(&mut self, command: SlideshowCommand) {
        tracing::debug!("Handling command: {:?}", command);

        match command {
            SlideshowCommand::Configure(update) => self.configure(update),
            SlideshowCommand::Refresh => {
                self.load(false);
                self.scheduler.reset();
            }
            SlideshowCommand::Next => {
                self.advance();
                self.scheduler.reset();
            }
            SlideshowCommand::Previous => {
                if let Some(asset) = self.store.retreat() {
                    self.render(&asset);
                    self.publish_status();
                }
                self.scheduler.reset();
            }
            SlideshowCommand::SetProfile(name) => self.set_profile(&name),
            SlideshowCommand::StartSlideshow => {
                self.slideshow_visible = true;
                self.presentation.start_slideshow();
                self.sync_scheduler();
            }
            SlideshowCommand::ExitSlideshow => {
                self.slideshow_visible = false;
                self.presentation.exit_slideshow();
                self.sync_scheduler();
            }
            SlideshowCommand::ShowInfoPanel => {
                self.info_panel_open = true;
                self.sync_scheduler();
            }
            SlideshowCommand::HideInfoPanel => {
                self.info_panel_open = false;
                self.sync_scheduler();
            }
            SlideshowCommand::GetBrightness(reply) => {
                let _ = reply.send(self.presentation.brightness());
            }
            SlideshowCommand::SetBrightness(level) => self.presentation.set_brightness(level),
            SlideshowCommand::Status(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SlideshowCommand::UpdateProfiles(profiles) => {
                tracing::info!("Profile catalogue updated: {} profiles", profiles.len());
                self.profiles = profiles;
            }
            SlideshowCommand::Shutdown => {}
        }
    }

    fn configure(&mut self, update: ConfigUpdate) {
        if let Err(e) = update.validate() {
            tracing::warn!("Ignoring configuration update: {}", e);
            return;
        }

        let next = self.config.merged(&update);
        let previous = std::mem::replace(&mut self.config, next);

        self.scheduler.set_interval(self.config.interval);
        self.store.set_options(self.config.fetch_options());

        let reloading = self.switch_content(self.config.profile.clone(), self.config.display_mode);
        if !reloading && previous.pan_speed != self.config.pan_speed {
            if let Some(asset) = self.store.current().cloned() {
                self.render(&asset);
            }
        }

        self.scheduler.reset();
        self.publish_status();
    }

    fn set_profile(&mut self, name: &str) {
        let mut named = self.profiles.iter().filter(|p| p.name == name);
        let found = named.next().cloned();
        let duplicates = named.count();

        let profile = match found {
            Some(profile) => profile,
            None => {
                tracing::info!("No profile named '{}' in the catalogue, refreshing instead", name);
                self.load(false);
                self.scheduler.reset();
                return;
            }
        };
        if duplicates > 0 {
            tracing::warn!(
                "{} profiles are named '{}', using '{}'",
                duplicates + 1,
                name,
                profile.id
            );
        }

        tracing::info!("Switching to profile '{}' ({})", profile.name, profile.id);
        self.config = self.config.with_profile(profile.clone());
        self.switch_content(profile, self.config.display_mode);
        self.scheduler.reset();
        self.publish_status();
    }

    /// Starts a reload if `profile`/`mode` select different content.
    fn switch_content(&mut self, profile: Profile, mode: DisplayMode) -> bool {
        match self.store.plan_filter_change(profile, mode) {
            Some(plan) => {
                tracing::info!("Content changed, reloading playlist");
                self.spawn_fetch(plan);
                true
            }
            None => false,
        }
    }

    fn load(&mut self, continue_pagination: bool) {
        let plan = self.store.plan_load(
            self.config.profile.clone(),
            self.config.display_mode,
            continue_pagination,
        );
        self.spawn_fetch(plan);
    }

    fn spawn_fetch(&mut self, plan: FetchPlan) {
        self.fetches.abort_all();
        tracing::debug!(
            "Fetching generation {} for {} ({} mode, page {})",
            plan.generation,
            plan.reason.as_str(),
            plan.mode.as_str(),
            plan.page
        );
        let source = self.store.source();
        self.fetches
            .spawn(async move { plan.execute(source.as_ref()).await });
    }

    fn on_fetch_joined(&mut self, joined: std::result::Result<FetchedBatch, JoinError>) {
        let batch = match joined {
            Ok(batch) => batch,
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                tracing::warn!("Fetch task failed: {}", e);
                if self.fetches.is_empty() {
                    self.store.cancel_pending();
                    self.scheduler.reset();
                }
                return;
            }
        };

        match self.store.apply(batch) {
            ApplyOutcome::Ready(asset) => {
                self.render(&asset);
                self.scheduler.reset();
                self.publish_status();
            }
            ApplyOutcome::Empty => {
                self.presentation.show_empty();
                self.publish_status();
            }
            ApplyOutcome::Stale => {}
        }
    }

    fn on_tick(&mut self) {
        if self.advance() {
            self.scheduler.reset();
        }
    }

    /// Returns true when an image changed without waiting for a fetch.
    fn advance(&mut self) -> bool {
        match self.store.step_forward() {
            Step::Ready(asset) => {
                self.render(&asset);
                self.publish_status();
                true
            }
            Step::Refetch(plan) => {
                self.spawn_fetch(plan);
                false
            }
            Step::Pending | Step::Stalled => false,
        }
    }

    fn sync_scheduler(&mut self) {
        if self.slideshow_visible && !self.info_panel_open {
            self.scheduler.resume();
        } else {
            self.scheduler.pause();
        }
    }

    fn render(&mut self, asset: &AssetRef) {
        let url = self.store.source().asset_url(asset);
        let transition = Transition::for_pan_speed(self.config.pan_speed);
        if let Err(e) = self.presentation.show_image(asset, url.as_deref(), transition) {
            tracing::warn!("Failed to display {}: {}", asset.id, e);
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let current = self.store.current();
        StatusSnapshot {
            current_image_id: current.map(|asset| asset.id.clone()),
            current_image_url: current.and_then(|asset| self.store.source().asset_url(asset)),
            profile_name: self.config.profile.name.clone(),
            position_index: self.store.position(),
            total_count: self.store.len(),
            display_mode: self.config.display_mode,
            last_refresh_timestamp: self.store.last_refresh().map(|at| at.timestamp_millis()),
        }
    }

    fn publish_status(&self) {
        if let Some(sender) = &self.status_sender {
            if let Err(e) = sender.try_send(self.snapshot()) {
                tracing::debug!("Status update dropped: {}", e);
            }
        }
    }
}

async fn next_refresh(refresh: &mut Option<Interval>) {
    match refresh {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
