//! Game catalog service for ludex
//!
//! Holds every system's games and folders in one arena, keeps them in sync
//! with directory and store scans, and persists user edits to per-system
//! gamelist documents with a crash-recovery log.

mod catalog;
mod filter;
mod gamelist;
mod media;
mod metadata;
mod names;
mod persistence;
mod reconcile;
mod recovery;
mod scanner;
mod store;
mod store_scanner;
mod system;
mod tree;

pub use catalog::{Catalog, CatalogUpdate, ScrapeTarget, UpdateSender};
pub use filter::{FilterContext, FilterIndex, FilterState, FilterType, sort_entries};
pub use gamelist::{GamelistDocument, GamelistField, GamelistNode, NodeKind, write_game_info};
pub use media::{MediaKind, MediaResolver, MediaSource};
pub use metadata::{
    MetadataKey, MetadataScope, MetadataStore, MetadataType, normalize_date, normalize_value,
};
pub use names::{ArcadeNames, normalize_title};
pub use persistence::{LoadReport, SaveReport};
pub use reconcile::{ReconcileReport, reconcile};
pub use recovery::RecoveryLog;
pub use scanner::{DirectoryScanner, ScanConfig, ScanResult};
pub use store::{EntryStatus, StoreKind, StoreRef, normalize_path, parse_store_path};
pub use store_scanner::{EpicScanner, InstalledTitle, ManualScanner, SteamScanner, StoreScanner};
pub use system::{GameCounts, System, SystemId};
pub use tree::{CatalogTree, Entry, EntryId, EntryType, FilesRecursive, TypeMask};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Scan error: {0}")]
    ScanError(String),

    #[error("System not found: {0}")]
    SystemNotFound(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Gamelist error: {0}")]
    Gamelist(#[from] GamelistError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors of the gamelist document layer
#[derive(Debug, Error)]
pub enum GamelistError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("Malformed gamelist: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
