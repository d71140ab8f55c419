use chrono::{DateTime, Duration, Utc};

use crate::config::DEFAULT_RECENCY_WINDOW_DAYS;
use crate::model::AssetRef;

pub const DEFAULT_RECENT_RATIO: f64 = 0.5;

/// Partition-based blend of recent and older assets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmartShuffle {
    pub recent_window: Duration,
    pub recent_ratio: f64,
}

impl Default for SmartShuffle {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_RECENCY_WINDOW_DAYS as i64), DEFAULT_RECENT_RATIO)
    }
}

impl SmartShuffle {
    pub fn new(recent_window: Duration, recent_ratio: f64) -> Self {
        let recent_ratio = if recent_ratio.is_finite() {
            recent_ratio.clamp(0.0, 1.0)
        } else {
            DEFAULT_RECENT_RATIO
        };
        Self {
            recent_window,
            recent_ratio,
        }
    }

    fn is_recent(&self, asset: &AssetRef, now: DateTime<Utc>) -> bool {
        asset
            .created_at
            .map_or(false, |created| created >= now - self.recent_window)
    }

    /// Returns a shuffled subset of `assets` with roughly `recent_ratio` of
    /// it drawn from assets created inside the window. A short recent
    /// partition is taken whole and the older share grows to cover the gap,
    /// as far as older assets allow.
    pub fn shuffle(&self, assets: &[AssetRef], now: DateTime<Utc>, rng: &mut fastrand::Rng) -> Vec<AssetRef> {
        if assets.is_empty() {
            return Vec::new();
        }

        let (mut recent, mut older): (Vec<AssetRef>, Vec<AssetRef>) = assets
            .iter()
            .cloned()
            .partition(|asset| self.is_recent(asset, now));
        rng.shuffle(&mut recent);
        rng.shuffle(&mut older);

        let total = assets.len();
        let recent_target = ((total as f64 * self.recent_ratio).round() as usize).min(total);
        let recent_count = recent_target.min(recent.len());
        let older_count = (total - recent_count).min(older.len());

        recent.truncate(recent_count);
        older.truncate(older_count);

        let mut blended = recent;
        blended.append(&mut older);
        rng.shuffle(&mut blended);
        blended
    }
}
