use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{DisplayMode, Profile, SearchFilter};

pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;
pub const MIN_INTERVAL_SECONDS: u64 = 3;
pub const MAX_INTERVAL_SECONDS: u64 = 24 * 60 * 60;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 1000;
/// Shared by the fetch-side recency constraint and the partition shuffle.
pub const DEFAULT_RECENCY_WINDOW_DAYS: u32 = 30;
pub const MAX_PAN_SPEED: f32 = 10.0;

/// How the smart-shuffle mode blends its "any" and "recent" samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendStrategy {
    /// Alternate the two samples one by one.
    #[default]
    Interleave,
    /// Pool both samples and run them through `SmartShuffle`.
    Partition,
}

/// Fetch parameters the playlist needs from the slideshow config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchOptions {
    pub batch_size: usize,
    pub recency_window: chrono::Duration,
    pub blend: BlendStrategy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            recency_window: chrono::Duration::days(DEFAULT_RECENCY_WINDOW_DAYS as i64),
            blend: BlendStrategy::default(),
        }
    }
}

/// Partial slideshow configuration as pushed by the hub or read from the
/// settings file. Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
    pub search_filter: Option<SearchFilter>,
    pub exclude_paths: Option<Vec<String>>,
    pub display_mode: Option<DisplayMode>,
    pub interval_seconds: Option<u64>,
    pub pan_speed: Option<f32>,
    pub blend_strategy: Option<BlendStrategy>,
    pub batch_size: Option<usize>,
    pub recency_window_days: Option<u32>,
}

impl ConfigUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.profile_id {
            if id.trim().is_empty() {
                return Err(Error::InvalidConfig("profileId must not be empty".into()));
            }
        }
        if let Some(secs) = self.interval_seconds {
            if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&secs) {
                return Err(Error::InvalidConfig(format!(
                    "intervalSeconds must be between {} and {}, got {}",
                    MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS, secs
                )));
            }
        }
        if let Some(speed) = self.pan_speed {
            if !speed.is_finite() || !(0.0..=MAX_PAN_SPEED).contains(&speed) {
                return Err(Error::InvalidConfig(format!(
                    "panSpeed must be between 0 and {}, got {}",
                    MAX_PAN_SPEED, speed
                )));
            }
        }
        if let Some(size) = self.batch_size {
            if size == 0 || size > MAX_BATCH_SIZE {
                return Err(Error::InvalidConfig(format!(
                    "batchSize must be between 1 and {}, got {}",
                    MAX_BATCH_SIZE, size
                )));
            }
        }
        if self.recency_window_days == Some(0) {
            return Err(Error::InvalidConfig("recencyWindowDays must be at least 1".into()));
        }
        Ok(())
    }
}

/// Fully resolved slideshow configuration owned by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideshowConfig {
    pub profile: Profile,
    pub display_mode: DisplayMode,
    pub interval: Duration,
    pub pan_speed: f32,
    pub blend: BlendStrategy,
    pub batch_size: usize,
    pub recency_window_days: u32,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            display_mode: DisplayMode::default(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECONDS),
            pan_speed: 0.0,
            blend: BlendStrategy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            recency_window_days: DEFAULT_RECENCY_WINDOW_DAYS,
        }
    }
}

impl SlideshowConfig {
    /// Applies an already validated update. A different `profileId` starts
    /// the profile over, so criteria of the old profile never leak into the
    /// new one.
    pub fn merged(&self, update: &ConfigUpdate) -> Self {
        let mut next = self.clone();

        if let Some(id) = &update.profile_id {
            if *id != next.profile.id {
                next.profile = Profile {
                    id: id.clone(),
                    name: id.clone(),
                    filter: SearchFilter::default(),
                    exclude_paths: Vec::new(),
                };
            }
        }
        if let Some(name) = &update.profile_name {
            next.profile.name = name.clone();
        }
        if let Some(filter) = &update.search_filter {
            next.profile.filter = filter.clone();
        }
        if let Some(excludes) = &update.exclude_paths {
            next.profile.exclude_paths = excludes.clone();
        }
        if let Some(mode) = update.display_mode {
            next.display_mode = mode;
        }
        if let Some(secs) = update.interval_seconds {
            next.interval = Duration::from_secs(secs.clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS));
        }
        if let Some(speed) = update.pan_speed {
            next.pan_speed = speed.clamp(0.0, MAX_PAN_SPEED);
        }
        if let Some(blend) = update.blend_strategy {
            next.blend = blend;
        }
        if let Some(size) = update.batch_size {
            next.batch_size = size.clamp(1, MAX_BATCH_SIZE);
        }
        if let Some(days) = update.recency_window_days {
            next.recency_window_days = days.max(1);
        }

        next
    }

    /// Config with `profile` switched in, keeping display settings.
    pub fn with_profile(&self, profile: Profile) -> Self {
        Self {
            profile,
            ..self.clone()
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            batch_size: self.batch_size,
            recency_window: chrono::Duration::days(self.recency_window_days as i64),
            blend: self.blend,
        }
    }
}

/// On-disk settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    pub device_id: Option<String>,
    pub mqtt_broker: Option<String>,
    pub webhook_url: Option<String>,
    pub refresh_interval_minutes: Option<u64>,
    pub profiles: Vec<Profile>,
    pub slideshow: ConfigUpdate,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| Error::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&raw)?;
        Ok(settings)
    }

    /// Like [`Settings::load`], but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Settings file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        match self.server_url.as_deref() {
            None | Some("") => {
                return Err(Error::InvalidConfig("serverUrl is required".into()));
            }
            Some(url) => {
                url::Url::parse(url)?;
            }
        }
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(Error::InvalidConfig("apiKey is required".into()));
        }
        if self.refresh_interval_minutes == Some(0) {
            return Err(Error::InvalidConfig("refreshIntervalMinutes must be at least 1".into()));
        }
        for profile in &self.profiles {
            if profile.id.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "profile '{}' has an empty profileId",
                    profile.name
                )));
            }
        }
        self.slideshow.validate()
    }

    /// Configured id, else one derived from the hostname.
    pub fn device_id(&self) -> String {
        match self.device_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => device_id_for_host(hostname().as_deref()),
        }
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_minutes.map(|m| Duration::from_secs(m * 60))
    }

    /// The slideshow section with catalogue details filled in for its
    /// profile id. Explicit fields in the section win.
    pub fn slideshow_update(&self) -> ConfigUpdate {
        let mut update = self.slideshow.clone();
        let catalogued = self
            .slideshow
            .profile_id
            .as_ref()
            .and_then(|id| self.profiles.iter().find(|p| &p.id == id));

        if let Some(profile) = catalogued {
            update.profile_name.get_or_insert_with(|| profile.name.clone());
            update.search_filter.get_or_insert_with(|| profile.filter.clone());
            update.exclude_paths.get_or_insert_with(|| profile.exclude_paths.clone());
        }
        update
    }

    /// Initial slideshow config: defaults, then the catalogue entry matching
    /// the configured profile id, then the explicit slideshow section.
    pub fn slideshow_config(&self) -> SlideshowConfig {
        SlideshowConfig::default().merged(&self.slideshow_update())
    }
}

fn hostname() -> Option<String> {
    let output = std::process::Command::new("hostname").output().ok()?;
    String::from_utf8(output.stdout).ok()
}

/// `daydream_<host>`, or a short random suffix when the host is unusable.
fn device_id_for_host(hostname: Option<&str>) -> String {
    match hostname.map(|h| h.trim().replace(' ', "_")) {
        Some(host) if !host.is_empty() && host != "localhost" => format!("daydream_{}", host),
        _ => format!("daydream_{}", &Uuid::new_v4().simple().to_string()[..8]),
    }
}
