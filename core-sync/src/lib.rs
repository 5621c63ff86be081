//! # Photo Sync Engine
//!
//! Idempotent ingestion of remote catalog albums.
//!
//! ## Overview
//!
//! For each album the engine:
//! - Enumerates every asset through a [`PhotoCatalog`](provider_lightroom::PhotoCatalog)
//! - Claims each asset atomically so concurrent syncs never ingest it twice
//! - Downloads metadata and a thumbnail into the object store
//! - Persists Asset, Album and `IN_ALBUM` records into the entity store
//! - Caches rendition URLs and records a `SyncLog` per run
//!
//! ## Components
//!
//! - **Orchestrator** (`orchestrator`): album and asset workflows, auxiliary reads
//! - **Repository** (`repository`): record mapping onto the entity store
//! - **Metadata Processor** (`metadata_processor`): EXIF/XMP normalization
//! - **Models** (`models`): persisted and returned records

pub mod error;
pub mod metadata_processor;
pub mod models;
pub mod orchestrator;
pub mod repository;

pub use error::{Result, SyncError};
pub use metadata_processor::{AlbumContext, MetadataProcessor};
pub use models::{
    AssetRecord, CameraInfo, IdentificationAsset, RenditionBundle, SyncReport, SyncState,
    SyncedAlbum,
};
pub use orchestrator::{identification_key, thumbnail_key, OrchestratorConfig, SyncOrchestrator};
pub use repository::{AssetRepository, GraphAssetRepository};
pub use tokio_util::sync::CancellationToken;
