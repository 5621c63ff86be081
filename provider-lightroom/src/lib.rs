//! # Lightroom Provider
//!
//! Read-only client for the Adobe Lightroom REST API.
//!
//! ## Overview
//!
//! - [`CatalogClient`]: typed access to the account, catalog, albums, assets,
//!   metadata and renditions, with retry on throttling and server errors
//! - [`PageCursor`] / [`collect_all`]: `links.next.after` pagination with
//!   loop detection
//! - [`CatalogClientFactory`]: binds a shared HTTP client to a token set
//! - [`PhotoCatalog`]: the subset of the API the sync engine depends on

pub mod catalog;
pub mod connector;
pub mod error;
pub mod factory;
pub mod pagination;
pub mod types;

pub use catalog::PhotoCatalog;
pub use connector::{CatalogClient, CatalogClientConfig};
pub use error::{LightroomError, Result};
pub use factory::CatalogClientFactory;
pub use pagination::{collect_all, PageCursor};
pub use types::{
    Account, Album, AssetMetadata, Catalog, Exif, Gps, Links, NextLink, Page, RemoteAsset,
    Rendition, RenditionSize, ShutterSpeed, Xmp,
};
