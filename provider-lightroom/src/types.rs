//! Lightroom API response types
//!
//! Every resource is decoded into an explicit structure; required fields
//! that are missing fail decoding instead of surfacing as empty values.

use serde::{Deserialize, Serialize};

/// The authenticated user's account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, alias = "full_name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The user's single Lightroom catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// Album resource, read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    #[serde(default = "untitled_album")]
    pub name: String,
    #[serde(default)]
    pub asset_count: u64,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

fn untitled_album() -> String {
    "Untitled Album".to_string()
}

/// Asset as listed inside an album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAsset {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "captureDate")]
    pub capture_date: Option<String>,
}

impl RemoteAsset {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: None,
            capture_date: None,
        }
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub resources: Vec<T>,
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub next: Option<NextLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextLink {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
}

/// Asset metadata blocks consumed by the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    #[serde(default)]
    pub exif: Exif,
    #[serde(default)]
    pub xmp: Xmp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exif {
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub lens: Option<String>,
    #[serde(default)]
    pub iso: Option<f64>,
    #[serde(default)]
    pub aperture: Option<f64>,
    #[serde(default)]
    pub shutter_speed: Option<ShutterSpeed>,
    #[serde(default)]
    pub focal_length: Option<f64>,
    #[serde(default)]
    pub date_time_original: Option<String>,
    #[serde(default)]
    pub gps: Option<Gps>,
}

/// Exposure time, either in seconds or as the provider's display string
/// (`"1/250"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShutterSpeed {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gps {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Xmp {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Rendition lookup result; `href` may be relative to the API base.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rendition {
    pub href: String,
}

/// Rendition size tiers offered by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenditionSize {
    Thumbnail2x,
    Px640,
    Px1280,
    Px2048,
    Full,
}

impl RenditionSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenditionSize::Thumbnail2x => "thumbnail2x",
            RenditionSize::Px640 => "640",
            RenditionSize::Px1280 => "1280",
            RenditionSize::Px2048 => "2048",
            RenditionSize::Full => "full",
        }
    }
}

impl std::fmt::Display for RenditionSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_defaults() {
        let album: Album = serde_json::from_str(r#"{"id":"alb-1"}"#).unwrap();
        assert_eq!(album.name, "Untitled Album");
        assert_eq!(album.asset_count, 0);
        assert!(album.created.is_none());
    }

    #[test]
    fn test_album_requires_id() {
        assert!(serde_json::from_str::<Album>(r#"{"name":"Reef Trip"}"#).is_err());
    }

    #[test]
    fn test_metadata_decoding() {
        let raw = r#"{
            "exif": {
                "make": "OM System",
                "model": "OM-1",
                "iso": 200,
                "aperture": 8.0,
                "shutterSpeed": "1/250",
                "focalLength": 60,
                "dateTimeOriginal": "2024-05-01T10:15:00",
                "gps": {"latitude": -16.5, "longitude": 145.8}
            },
            "xmp": {"keywords": ["reef", "turtle"], "caption": "Green turtle"}
        }"#;
        let metadata: AssetMetadata = serde_json::from_str(raw).unwrap();

        assert_eq!(metadata.exif.iso, Some(200.0));
        assert_eq!(
            metadata.exif.shutter_speed,
            Some(ShutterSpeed::Text("1/250".to_string()))
        );
        assert_eq!(metadata.exif.gps.unwrap().latitude, Some(-16.5));
        assert_eq!(metadata.xmp.keywords, vec!["reef", "turtle"]);
    }

    #[test]
    fn test_empty_metadata() {
        let metadata: AssetMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(metadata, AssetMetadata::default());
    }

    #[test]
    fn test_page_envelope() {
        let page: Page<RemoteAsset> = serde_json::from_str(
            r#"{"resources":[{"id":"a1","captureDate":"2024-01-01"}],"links":{"next":{"after":"c2"}}}"#,
        )
        .unwrap();
        assert_eq!(page.resources[0].capture_date.as_deref(), Some("2024-01-01"));
        assert_eq!(page.links.next.unwrap().after.as_deref(), Some("c2"));

        let last: Page<RemoteAsset> = serde_json::from_str(r#"{"resources":[]}"#).unwrap();
        assert!(last.links.next.is_none());
    }

    #[test]
    fn test_rendition_size_names() {
        assert_eq!(RenditionSize::Thumbnail2x.as_str(), "thumbnail2x");
        assert_eq!(RenditionSize::Px2048.to_string(), "2048");
    }
}
