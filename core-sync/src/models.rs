//! Records produced and read back by the sync engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use provider_lightroom::{RenditionSize, ShutterSpeed};
use serde::{Deserialize, Serialize};

/// Ingestion state of an Asset node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Claimed by a sync in progress
    Pending,
    Synced,
    /// Ingestion failed; the next sync may reclaim it
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
        }
    }
}

/// Camera settings copied from EXIF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub lens: String,
    #[serde(default)]
    pub iso: Option<f64>,
    #[serde(default)]
    pub aperture: Option<f64>,
    #[serde(default)]
    pub shutter_speed: Option<ShutterSpeed>,
    #[serde(default)]
    pub focal_length: Option<f64>,
}

/// A synced asset as persisted in the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub lightroom_id: String,
    pub catalog_id: String,
    pub album_id: String,
    pub album_name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub capture_date: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub camera: CameraInfo,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub caption: String,
    pub thumbnail_key: String,
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub identified: bool,
    #[serde(default)]
    pub species_name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Outcome of one `sync_album` call, persisted as a `SyncLog` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub album_id: String,
    pub album_name: String,
    pub total_assets: u64,
    pub new_assets: u64,
    pub skipped_assets: u64,
    pub errors: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncReport {
    pub fn new(album_id: &str, album_name: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            album_id: album_id.to_string(),
            album_name: album_name.to_string(),
            total_assets: 0,
            new_assets: 0,
            skipped_assets: 0,
            errors: 0,
            start_time,
            end_time: None,
            error_message: None,
        }
    }

    /// Completed without an album-level failure. Per-asset errors do not
    /// count.
    pub fn is_success(&self) -> bool {
        self.error_message.is_none()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// An album with at least one synced asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedAlbum {
    pub id: String,
    pub name: String,
    pub photo_count: u64,
}

/// Rendition URLs cached per asset. Tiers other than the thumbnail are
/// filled in on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionBundle {
    pub thumbnail: Option<String>,
    #[serde(rename = "640")]
    pub px640: Option<String>,
    #[serde(rename = "2048")]
    pub px2048: Option<String>,
    pub full: Option<String>,
}

impl RenditionBundle {
    pub fn with_thumbnail(url: impl Into<String>) -> Self {
        Self {
            thumbnail: Some(url.into()),
            ..Self::default()
        }
    }

    /// Cached URL for a tier; the bundle has no slot for 1280.
    pub fn get(&self, size: RenditionSize) -> Option<&str> {
        match size {
            RenditionSize::Thumbnail2x => self.thumbnail.as_deref(),
            RenditionSize::Px640 => self.px640.as_deref(),
            RenditionSize::Px2048 => self.px2048.as_deref(),
            RenditionSize::Full => self.full.as_deref(),
            RenditionSize::Px1280 => None,
        }
    }

    pub fn set(&mut self, size: RenditionSize, url: String) {
        match size {
            RenditionSize::Thumbnail2x => self.thumbnail = Some(url),
            RenditionSize::Px640 => self.px640 = Some(url),
            RenditionSize::Px2048 => self.px2048 = Some(url),
            RenditionSize::Full => self.full = Some(url),
            RenditionSize::Px1280 => {}
        }
    }
}

/// A synced asset together with its freshly downloaded 2048px image.
#[derive(Debug, Clone)]
pub struct IdentificationAsset {
    pub asset: AssetRecord,
    pub image_data: Bytes,
    pub image_key: String,
}
