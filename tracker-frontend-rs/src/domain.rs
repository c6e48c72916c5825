//! The records the tracker keeps, in the shape they are cached and written remotely.
//!
//! Timestamps are milliseconds since the Unix epoch. Optional fields serialize as explicit `null`s so a remote
//! write never leaves a stale value behind.

use chrono::NaiveDate;
use mirror::Record;

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Anime,
    Series,
    Movie,
    Manga,
    Manhwa,
}

impl ContentType {
    /// Movies are watched in one go, so they carry no progress counter.
    pub fn tracks_progress(self) -> bool {
        self != ContentType::Movie
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Paused,
    Abandoned,
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Something one profile is watching or reading.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub id: String,
    pub profile_id: String,
    pub content_type: ContentType,
    pub title: String,
    pub status: TrackingStatus,
    #[serde(default)]
    pub current_progress: u32,
    #[serde(default)]
    pub total_progress: Option<u32>,
    /// 0 to 10, halves allowed.
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TrackedItem {
    /// The progress ceiling, if there is one. A total of zero means "unknown".
    pub fn progress_limit(&self) -> Option<u32> {
        self.total_progress.filter(|total| *total > 0)
    }
}

impl Record for TrackedItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn index_key(&self) -> &str {
        &self.profile_id
    }
}

/// A suggestion sent from one profile to the other.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub from_profile_id: String,
    pub to_profile_id: String,
    pub content_type: ContentType,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub origin_tracked_item_id: Option<String>,
    #[serde(default)]
    pub status: RecommendationStatus,
    pub created_at: i64,
}

impl Record for Recommendation {
    fn id(&self) -> &str {
        &self.id
    }

    // inboxes are what gets listed, so recommendations live under their recipient
    fn index_key(&self) -> &str {
        &self.to_profile_id
    }
}

/// An upcoming release somebody is waiting for.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Premiere {
    pub id: String,
    pub profile_id: String,
    pub content_type: ContentType,
    pub title: String,
    /// Serialized as `YYYY-MM-DD`, which also sorts chronologically on the remote side.
    pub release_date: NaiveDate,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Record for Premiere {
    fn id(&self) -> &str {
        &self.id
    }

    fn index_key(&self) -> &str {
        &self.profile_id
    }
}
