use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetType {
    #[default]
    Image,
    Video,
    #[serde(other)]
    Other,
}

/// One remote image as returned by the photo server. Metadata only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: String,
    pub original_path: String,
    #[serde(default)]
    pub original_file_name: Option<String>,
    #[serde(default, rename = "fileCreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "type")]
    pub asset_type: AssetType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Sequential,
    #[default]
    Random,
    SmartShuffle,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Sequential => "sequential",
            DisplayMode::Random => "random",
            DisplayMode::SmartShuffle => "smart_shuffle",
        }
    }
}

/// Search criteria sent to the photo server. Treated as an opaque value and
/// compared structurally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilter {
    pub query: Option<String>,
    pub person_ids: Vec<String>,
    pub tag_ids: Vec<String>,
    pub album_ids: Vec<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub taken_after: Option<DateTime<Utc>>,
    pub taken_before: Option<DateTime<Utc>>,
    pub is_archived: Option<bool>,
    pub is_favorite: Option<bool>,
    pub media_type: Option<AssetType>,
}

impl SearchFilter {
    /// Same criteria, narrowed to assets taken within `window` before `now`.
    /// An existing lower bound that is already tighter is kept.
    pub fn taken_within(&self, window: Duration, now: DateTime<Utc>) -> Self {
        let cutoff = now - window;
        let taken_after = match self.taken_after {
            Some(existing) if existing > cutoff => existing,
            _ => cutoff,
        };
        Self {
            taken_after: Some(taken_after),
            ..self.clone()
        }
    }
}

/// A named content set. `id` is the identity; `name` is for display only and
/// may collide across profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "profileId")]
    pub id: String,
    #[serde(rename = "profileName", default)]
    pub name: String,
    #[serde(rename = "searchFilter", default)]
    pub filter: SearchFilter,
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            name: "All photos".to_string(),
            filter: SearchFilter::default(),
            exclude_paths: Vec::new(),
        }
    }
}

impl Profile {
    /// True when both profiles select the same content. The display name is
    /// not compared.
    pub fn same_content(&self, other: &Profile) -> bool {
        self.id == other.id && self.filter == other.filter && self.exclude_paths == other.exclude_paths
    }

    pub fn is_excluded(&self, asset: &AssetRef) -> bool {
        self.exclude_paths.iter().any(|pattern| {
            let needle = pattern.replace('*', "");
            !needle.is_empty() && asset.original_path.contains(&needle)
        })
    }
}
