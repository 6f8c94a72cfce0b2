//! Catalog-wide browsing and persistence policies

use serde::{Deserialize, Serialize};

/// Field used by the configured sort comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Display name (sort name when set)
    #[default]
    Name,
    /// Release date
    ReleaseDate,
    /// User or scraped rating
    Rating,
    /// Last time the game was launched
    LastPlayed,
    /// Number of launches
    PlayCount,
    /// Owning system short name, then name
    System,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Sort configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SortSettings {
    #[serde(default)]
    pub field: SortField,

    #[serde(default)]
    pub direction: SortDirection,
}

/// Catalog-wide policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Show games flagged hidden
    #[serde(default)]
    pub show_hidden_files: bool,

    /// Only show games flagged as kid games
    #[serde(default)]
    pub kid_mode: bool,

    /// Put favorites before everything else
    #[serde(default = "default_true")]
    pub favorites_first: bool,

    /// Put folders before games
    #[serde(default = "default_true")]
    pub folders_first: bool,

    /// Comparator used for ordering
    #[serde(default)]
    pub sort: SortSettings,

    /// Hide systems that ended up with no games
    #[serde(default = "default_true")]
    pub hide_empty_systems: bool,

    /// Drop physical gamelist entries whose file no longer exists
    #[serde(default = "default_true")]
    pub check_missing_files: bool,

    /// Flush dirty gamelists when the catalog shuts down
    #[serde(default = "default_true")]
    pub save_gamelists_on_exit: bool,

    /// Write recovery fragments while the session runs
    #[serde(default = "default_true")]
    pub recovery_log: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            show_hidden_files: false,
            kid_mode: false,
            favorites_first: true,
            folders_first: true,
            sort: SortSettings::default(),
            hide_empty_systems: true,
            check_missing_files: true,
            save_gamelists_on_exit: true,
            recovery_log: true,
        }
    }
}
