//! # Asset Repository
//!
//! Maps Asset, Album and SyncLog records onto the graph-shaped
//! [`EntityStore`].
//!
//! ## Layout
//!
//! - `AssetClaim` nodes keyed by `lightroom_id` with `sync_state` and, while
//!   claimed, `claim_expires_at` (Unix milliseconds)
//! - `Asset` nodes keyed by `lightroom_id`, carrying the [`AssetRecord`]
//!   attributes; written only once ingestion succeeded
//! - `Album` nodes keyed by `lightroom_id` with a `name`
//! - one `IN_ALBUM` edge per Asset
//! - `SyncLog` nodes keyed by a random `id`

use async_trait::async_trait;
use bridge_traits::entity::{
    AttrPredicate, Attributes, EntityStore, NodeRef, OrderBy, WriteGuard,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{AssetRecord, SyncReport, SyncState, SyncedAlbum};

pub const ASSET_LABEL: &str = "Asset";
pub const CLAIM_LABEL: &str = "AssetClaim";
pub const ALBUM_LABEL: &str = "Album";
pub const SYNC_LOG_LABEL: &str = "SyncLog";
pub const IN_ALBUM: &str = "IN_ALBUM";

const KEY_FIELD: &str = "lightroom_id";
const SYNC_STATE: &str = "sync_state";
const CLAIM_EXPIRES_AT: &str = "claim_expires_at";

/// Persistence operations needed by the sync orchestrator.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Atomically claim an asset for ingestion.
    ///
    /// Succeeds when the asset is unknown, previously failed, or its pending
    /// claim expired before `now`. Returns `false` when another writer holds
    /// it or it is already synced.
    async fn claim_asset(
        &self,
        asset_id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool>;

    /// Release a claim after a failed ingestion.
    async fn mark_failed(&self, asset_id: &str) -> Result<()>;

    /// Store the full record, link it to its album and mark it synced.
    async fn save_asset(&self, record: &AssetRecord) -> Result<()>;

    /// A synced asset by provider id.
    async fn find_asset(&self, asset_id: &str) -> Result<Option<AssetRecord>>;

    /// Albums with their synced asset counts, ordered by name.
    async fn list_synced_albums(&self) -> Result<Vec<SyncedAlbum>>;

    /// Synced assets of one album, newest capture date first.
    async fn list_album_assets(&self, album_id: &str) -> Result<Vec<AssetRecord>>;

    /// Append a sync report; returns the new log id.
    async fn append_sync_log(&self, report: &SyncReport) -> Result<String>;
}

/// [`AssetRepository`] over any [`EntityStore`].
pub struct GraphAssetRepository {
    store: Arc<dyn EntityStore>,
}

impl GraphAssetRepository {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    fn asset_ref(asset_id: &str) -> NodeRef {
        NodeRef::new(ASSET_LABEL, KEY_FIELD, asset_id)
    }

    fn claim_ref(asset_id: &str) -> NodeRef {
        NodeRef::new(CLAIM_LABEL, KEY_FIELD, asset_id)
    }

    fn album_ref(album_id: &str) -> NodeRef {
        NodeRef::new(ALBUM_LABEL, KEY_FIELD, album_id)
    }

    fn synced() -> AttrPredicate {
        AttrPredicate::eq(SYNC_STATE, SyncState::Synced.as_str())
    }
}

fn to_attributes<T: Serialize>(value: &T) -> Result<Attributes> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SyncError::Storage(
            bridge_traits::error::BridgeError::InvalidInput(format!(
                "Expected an object, got {}",
                other
            )),
        )),
    }
}

#[async_trait]
impl AssetRepository for GraphAssetRepository {
    async fn claim_asset(
        &self,
        asset_id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool> {
        let mut attributes = Attributes::new();
        attributes.insert(SYNC_STATE.into(), SyncState::Pending.as_str().into());
        attributes.insert(CLAIM_EXPIRES_AT.into(), lease_until.timestamp_millis().into());

        let guard = WriteGuard::IfAbsentOrAny(vec![
            AttrPredicate::eq(SYNC_STATE, SyncState::Failed.as_str()),
            AttrPredicate::lt(CLAIM_EXPIRES_AT, now.timestamp_millis()),
        ]);

        let outcome = self
            .store
            .merge_node(&Self::claim_ref(asset_id), attributes, guard)
            .await?;
        debug!(asset_id, ?outcome, "Claim attempt");
        Ok(outcome.is_written())
    }

    async fn mark_failed(&self, asset_id: &str) -> Result<()> {
        let mut attributes = Attributes::new();
        attributes.insert(SYNC_STATE.into(), SyncState::Failed.as_str().into());
        attributes.insert(CLAIM_EXPIRES_AT.into(), Value::Null);

        self.store
            .merge_node(&Self::claim_ref(asset_id), attributes, WriteGuard::Always)
            .await?;
        Ok(())
    }

    async fn save_asset(&self, record: &AssetRecord) -> Result<()> {
        let mut attributes = to_attributes(record)?;
        attributes.insert(SYNC_STATE.into(), SyncState::Synced.as_str().into());

        let asset = Self::asset_ref(&record.lightroom_id);
        let album = Self::album_ref(&record.album_id);

        self.store
            .merge_node(&asset, attributes, WriteGuard::Always)
            .await?;

        let mut album_attributes = Attributes::new();
        album_attributes.insert("name".into(), record.album_name.clone().into());
        self.store
            .merge_node(&album, album_attributes, WriteGuard::Always)
            .await?;

        self.store.merge_edge(&asset, IN_ALBUM, &album).await?;

        let mut claim = Attributes::new();
        claim.insert(SYNC_STATE.into(), SyncState::Synced.as_str().into());
        claim.insert(CLAIM_EXPIRES_AT.into(), Value::Null);
        self.store
            .merge_node(
                &Self::claim_ref(&record.lightroom_id),
                claim,
                WriteGuard::Always,
            )
            .await?;
        Ok(())
    }

    async fn find_asset(&self, asset_id: &str) -> Result<Option<AssetRecord>> {
        let Some(node) = self.store.find_node(&Self::asset_ref(asset_id)).await? else {
            return Ok(None);
        };

        if node.get_str(SYNC_STATE) != Some(SyncState::Synced.as_str()) {
            debug!(asset_id, state = ?node.get_str(SYNC_STATE), "Asset not synced yet");
            return Ok(None);
        }

        Ok(Some(node.decode()?))
    }

    async fn list_synced_albums(&self) -> Result<Vec<SyncedAlbum>> {
        let counts = self
            .store
            .count_related(ALBUM_LABEL, IN_ALBUM, &[Self::synced()])
            .await?;

        let mut albums: Vec<SyncedAlbum> = counts
            .into_iter()
            .map(|related| SyncedAlbum {
                name: related
                    .node
                    .get_str("name")
                    .unwrap_or("Untitled Album")
                    .to_string(),
                id: related.node.node.key,
                photo_count: related.count,
            })
            .collect();
        albums.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(albums)
    }

    async fn list_album_assets(&self, album_id: &str) -> Result<Vec<AssetRecord>> {
        let nodes = self
            .store
            .list_nodes(
                ASSET_LABEL,
                &[AttrPredicate::eq("album_id", album_id), Self::synced()],
                Some(&OrderBy::desc("capture_date")),
                None,
            )
            .await?;

        let mut assets = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node.decode::<AssetRecord>() {
                Ok(record) => assets.push(record),
                Err(e) => warn!(asset_id = %node.node.key, error = %e, "Skipping unreadable asset"),
            }
        }
        Ok(assets)
    }

    async fn append_sync_log(&self, report: &SyncReport) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let attributes = to_attributes(report)?;

        self.store
            .merge_node(
                &NodeRef::new(SYNC_LOG_LABEL, "id", id.as_str()),
                attributes,
                WriteGuard::IfAbsent,
            )
            .await?;
        Ok(id)
    }
}
