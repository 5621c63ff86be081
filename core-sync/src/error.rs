use bridge_traits::error::BridgeError;
use provider_lightroom::LightroomError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// One asset could not be ingested; the album sync carries on.
    #[error("Failed to sync asset {asset_id}: {source}")]
    AssetSync {
        asset_id: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Provider error: {0}")]
    Provider(#[from] LightroomError),

    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn asset(asset_id: impl Into<String>, source: SyncError) -> Self {
        SyncError::AssetSync {
            asset_id: asset_id.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
