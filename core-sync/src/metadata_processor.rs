//! Metadata Processing
//!
//! Turns the provider's listing entry and metadata blocks into the
//! [`AssetRecord`] that gets persisted.
//!
//! ## Field mapping
//!
//! - capture date: the listing's `captureDate`, falling back to
//!   `exif.dateTimeOriginal`
//! - location: `exif.gps.latitude` / `exif.gps.longitude`
//! - camera: `exif.make`, `model`, `lens`, `iso`, `aperture`,
//!   `shutterSpeed`, `focalLength`
//! - description: `xmp.keywords`, `xmp.caption`
//!
//! Missing text fields become empty strings and missing numbers stay
//! absent, so a sparse metadata response never blocks ingestion.

use chrono::{DateTime, Utc};
use provider_lightroom::{AssetMetadata, RemoteAsset};

use crate::models::{AssetRecord, CameraInfo};

/// Where an asset was found.
#[derive(Debug, Clone, Copy)]
pub struct AlbumContext<'a> {
    pub catalog_id: &'a str,
    pub album_id: &'a str,
    pub album_name: &'a str,
}

/// Stateless normalizer for provider metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataProcessor;

impl MetadataProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        context: AlbumContext<'_>,
        asset: &RemoteAsset,
        metadata: &AssetMetadata,
        thumbnail_key: &str,
        synced_at: DateTime<Utc>,
    ) -> AssetRecord {
        let exif = &metadata.exif;
        let xmp = &metadata.xmp;
        let gps = exif.gps.as_ref();

        let capture_date = asset
            .capture_date
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| exif.date_time_original.clone());

        AssetRecord {
            lightroom_id: asset.id.clone(),
            catalog_id: context.catalog_id.to_string(),
            album_id: context.album_id.to_string(),
            album_name: context.album_name.to_string(),
            filename: asset.filename.clone().unwrap_or_default(),
            capture_date,
            latitude: gps.and_then(|g| g.latitude),
            longitude: gps.and_then(|g| g.longitude),
            camera: CameraInfo {
                make: exif.make.clone().unwrap_or_default(),
                model: exif.model.clone().unwrap_or_default(),
                lens: exif.lens.clone().unwrap_or_default(),
                iso: exif.iso,
                aperture: exif.aperture,
                shutter_speed: exif.shutter_speed.clone(),
                focal_length: exif.focal_length,
            },
            keywords: xmp.keywords.clone(),
            caption: xmp.caption.clone().unwrap_or_default(),
            thumbnail_key: thumbnail_key.to_string(),
            synced_at,
            identified: false,
            species_name: None,
            confidence: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provider_lightroom::ShutterSpeed;

    fn context() -> AlbumContext<'static> {
        AlbumContext {
            catalog_id: "cat-1",
            album_id: "alb-1",
            album_name: "Reef Trip",
        }
    }

    fn metadata(raw: &str) -> AssetMetadata {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_full_metadata() {
        let asset: RemoteAsset = serde_json::from_str(
            r#"{"id":"a1","filename":"P5010001.ORF","captureDate":"2024-05-01T10:15:00"}"#,
        )
        .unwrap();
        let metadata = metadata(
            r#"{
                "exif": {
                    "make": "OM System", "model": "OM-1", "lens": "60mm Macro",
                    "iso": 400, "aperture": 5.6, "shutterSpeed": 0.004,
                    "focalLength": 60, "gps": {"latitude": -16.9, "longitude": 145.7}
                },
                "xmp": {"keywords": ["nudibranch"], "caption": "Chromodoris"}
            }"#,
        );
        let now = Utc::now();

        let record =
            MetadataProcessor::new().normalize(context(), &asset, &metadata, "thumbnails/a1.jpg", now);

        assert_eq!(record.lightroom_id, "a1");
        assert_eq!(record.album_name, "Reef Trip");
        assert_eq!(record.filename, "P5010001.ORF");
        assert_eq!(record.capture_date.as_deref(), Some("2024-05-01T10:15:00"));
        assert_eq!(record.latitude, Some(-16.9));
        assert_eq!(record.longitude, Some(145.7));
        assert_eq!(record.camera.make, "OM System");
        assert_eq!(record.camera.shutter_speed, Some(ShutterSpeed::Seconds(0.004)));
        assert_eq!(record.keywords, vec!["nudibranch"]);
        assert_eq!(record.caption, "Chromodoris");
        assert_eq!(record.synced_at, now);
        assert!(!record.identified);
    }

    #[test]
    fn test_capture_date_falls_back_to_exif() {
        let asset = RemoteAsset::new("a2");
        let metadata = metadata(r#"{"exif": {"dateTimeOriginal": "2023-11-02T08:00:00"}}"#);

        let record =
            MetadataProcessor::new().normalize(context(), &asset, &metadata, "k", Utc::now());
        assert_eq!(record.capture_date.as_deref(), Some("2023-11-02T08:00:00"));
    }

    #[test]
    fn test_sparse_metadata_uses_defaults() {
        let asset = RemoteAsset::new("a3");
        let record = MetadataProcessor::new().normalize(
            context(),
            &asset,
            &AssetMetadata::default(),
            "k",
            Utc::now(),
        );

        assert_eq!(record.filename, "");
        assert!(record.capture_date.is_none());
        assert!(record.latitude.is_none());
        assert_eq!(record.camera, CameraInfo::default());
        assert!(record.keywords.is_empty());
        assert_eq!(record.caption, "");
    }
}
