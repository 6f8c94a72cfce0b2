//! Store installation scanners
//!
//! Each scanner reports what a store back end has installed right now.
//! Results are plain values so scans can run on worker threads and be
//! handed to the catalog owner afterwards.

use crate::LibraryError;
use crate::store::StoreKind;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One installed title as reported by a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledTitle {
    /// Stable store identifier; `None` when the store cannot report one
    pub store_id: Option<String>,
    pub title: String,
    pub install_dir: Option<PathBuf>,
    /// Store protocol URL or command starting the title
    pub launch_command: Option<String>,
    pub namespace: Option<String>,
    pub catalog_id: Option<String>,
}

impl InstalledTitle {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            store_id: None,
            title: title.into(),
            install_dir: None,
            launch_command: None,
            namespace: None,
            catalog_id: None,
        }
    }

    pub fn with_store_id(mut self, id: impl Into<String>) -> Self {
        self.store_id = Some(id.into());
        self
    }

    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    pub fn with_launch_command(mut self, command: impl Into<String>) -> Self {
        self.launch_command = Some(command.into());
        self
    }

    pub fn with_catalog(mut self, namespace: impl Into<String>, catalog_id: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self.catalog_id = Some(catalog_id.into());
        self
    }
}

/// Capability every store back end offers to reconciliation
pub trait StoreScanner: Send {
    fn store(&self) -> StoreKind;

    /// Titles installed right now
    fn scan(&self) -> Result<Vec<InstalledTitle>, LibraryError>;
}

/// Steam: `steamapps/appmanifest_*.acf` in each library folder
#[derive(Debug, Clone)]
pub struct SteamScanner {
    libraries: Vec<PathBuf>,
}

/// `StateFlags` bit set once an app is fully installed
const STEAM_STATE_FULLY_INSTALLED: u32 = 4;

impl SteamScanner {
    pub fn new(libraries: Vec<PathBuf>) -> Self {
        Self { libraries }
    }

    fn scan_library(&self, library: &Path, titles: &mut Vec<InstalledTitle>) {
        let steamapps = library.join("steamapps");
        let entries = match fs::read_dir(&steamapps) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot read Steam library {}: {}", steamapps.display(), e);
                return;
            }
        };

        let mut manifests: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("appmanifest_") && n.ends_with(".acf"))
            })
            .collect();
        manifests.sort();

        for manifest in manifests {
            let content = match fs::read_to_string(&manifest) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Cannot read {}: {}", manifest.display(), e);
                    continue;
                }
            };
            if let Some(title) = parse_app_manifest(&content, &steamapps) {
                titles.push(title);
            }
        }
    }
}

impl StoreScanner for SteamScanner {
    fn store(&self) -> StoreKind {
        StoreKind::Steam
    }

    fn scan(&self) -> Result<Vec<InstalledTitle>, LibraryError> {
        let mut titles = Vec::new();
        for library in &self.libraries {
            self.scan_library(library, &mut titles);
        }
        tracing::info!("Steam: {} installed apps", titles.len());
        Ok(titles)
    }
}

/// Read the top-level `"key" "value"` pairs of an app manifest
fn parse_app_manifest(content: &str, steamapps: &Path) -> Option<InstalledTitle> {
    let mut appid = None;
    let mut name = None;
    let mut installdir = None;
    let mut state_flags = 0u32;

    for line in content.lines() {
        let mut parts = line.split('"');
        let (Some(key), Some(value)) = (parts.nth(1), parts.nth(1)) else {
            continue;
        };
        match key.to_lowercase().as_str() {
            "appid" => appid = Some(value.to_string()),
            "name" => name = Some(value.to_string()),
            "installdir" => installdir = Some(value.to_string()),
            "stateflags" => state_flags = value.parse().unwrap_or(0),
            _ => {}
        }
    }

    let appid = appid?;
    if state_flags & STEAM_STATE_FULLY_INSTALLED == 0 {
        tracing::debug!("Skipping Steam app {} (not fully installed)", appid);
        return None;
    }

    let mut title = InstalledTitle::new(name.unwrap_or_else(|| appid.clone()))
        .with_launch_command(format!("steam://rungameid/{}", appid))
        .with_store_id(appid);
    if let Some(dir) = installdir {
        title = title.with_install_dir(steamapps.join("common").join(dir));
    }
    Some(title)
}

/// Epic launcher: `*.item` JSON manifests
#[derive(Debug, Clone)]
pub struct EpicScanner {
    manifest_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EpicManifest {
    #[serde(default)]
    display_name: String,
    app_name: String,
    #[serde(default)]
    install_location: Option<PathBuf>,
    #[serde(default)]
    catalog_namespace: Option<String>,
    #[serde(default)]
    catalog_item_id: Option<String>,
    #[serde(rename = "bIsIncompleteInstall", default)]
    incomplete_install: bool,
}

impl EpicScanner {
    pub fn new(manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_dir: manifest_dir.into(),
        }
    }

    fn read_manifest(path: &Path) -> Result<Option<InstalledTitle>, LibraryError> {
        let content = fs::read_to_string(path)?;
        let manifest: EpicManifest = serde_json::from_str(&content)?;
        if manifest.incomplete_install {
            return Ok(None);
        }

        let display_name = if manifest.display_name.is_empty() {
            manifest.app_name.clone()
        } else {
            manifest.display_name
        };
        let mut title = InstalledTitle::new(display_name).with_store_id(&manifest.app_name);

        if let (Some(ns), Some(catalog)) = (manifest.catalog_namespace, manifest.catalog_item_id) {
            title = title
                .with_launch_command(format!(
                    "com.epicgames.launcher://apps/{}%3A{}%3A{}?action=launch&silent=true",
                    ns, catalog, manifest.app_name
                ))
                .with_catalog(ns, catalog);
        }
        if let Some(dir) = manifest.install_location {
            title = title.with_install_dir(dir);
        }
        Ok(Some(title))
    }
}

impl StoreScanner for EpicScanner {
    fn store(&self) -> StoreKind {
        StoreKind::Epic
    }

    fn scan(&self) -> Result<Vec<InstalledTitle>, LibraryError> {
        let entries = fs::read_dir(&self.manifest_dir).map_err(|e| {
            LibraryError::ScanError(format!("{}: {}", self.manifest_dir.display(), e))
        })?;

        let mut manifests: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "item"))
            .collect();
        manifests.sort();

        let mut titles = Vec::new();
        for manifest in manifests {
            match Self::read_manifest(&manifest) {
                Ok(Some(title)) => titles.push(title),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping Epic manifest {}: {}", manifest.display(), e),
            }
        }
        tracing::info!("Epic: {} installed apps", titles.len());
        Ok(titles)
    }
}

/// Fixed result list, for stores scanned elsewhere
#[derive(Debug, Clone)]
pub struct ManualScanner {
    store: StoreKind,
    titles: Vec<InstalledTitle>,
}

impl ManualScanner {
    pub fn new(store: StoreKind, titles: Vec<InstalledTitle>) -> Self {
        Self { store, titles }
    }
}

impl StoreScanner for ManualScanner {
    fn store(&self) -> StoreKind {
        self.store
    }

    fn scan(&self) -> Result<Vec<InstalledTitle>, LibraryError> {
        Ok(self.titles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#""AppState"
{
	"appid"		"440"
	"Universe"		"1"
	"name"		"Team Fortress 2"
	"StateFlags"		"4"
	"installdir"		"Team Fortress 2"
	"UserConfig"
	{
		"language"		"english"
	}
}
"#;

    #[test]
    fn test_parse_app_manifest() {
        let title = parse_app_manifest(MANIFEST, Path::new("/lib/steamapps")).unwrap();
        assert_eq!(title.store_id.as_deref(), Some("440"));
        assert_eq!(title.title, "Team Fortress 2");
        assert_eq!(
            title.install_dir,
            Some(PathBuf::from("/lib/steamapps/common/Team Fortress 2"))
        );
        assert_eq!(title.launch_command.as_deref(), Some("steam://rungameid/440"));
    }

    #[test]
    fn test_partial_steam_install_skipped() {
        let updating = MANIFEST.replace("\"StateFlags\"\t\t\"4\"", "\"StateFlags\"\t\t\"1026\"");
        assert!(parse_app_manifest(&updating, Path::new("/lib/steamapps")).is_none());
    }

    #[test]
    fn test_steam_scanner_reads_libraries() {
        let dir = TempDir::new().unwrap();
        let steamapps = dir.path().join("steamapps");
        fs::create_dir_all(&steamapps).unwrap();
        fs::write(steamapps.join("appmanifest_440.acf"), MANIFEST).unwrap();
        fs::write(steamapps.join("libraryfolders.vdf"), "\"libraryfolders\" {}").unwrap();

        let scanner = SteamScanner::new(vec![dir.path().to_path_buf(), PathBuf::from("/nope")]);
        let titles = scanner.scan().unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(scanner.store(), StoreKind::Steam);
    }

    #[test]
    fn test_epic_scanner() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("A1.item"),
            r#"{
                "DisplayName": "Celeste",
                "AppName": "Salt",
                "InstallLocation": "/games/Celeste",
                "CatalogNamespace": "ns1",
                "CatalogItemId": "cat1",
                "bIsIncompleteInstall": false
            }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("B2.item"),
            r#"{"DisplayName": "Half Done", "AppName": "Half", "bIsIncompleteInstall": true}"#,
        )
        .unwrap();
        fs::write(dir.path().join("C3.item"), "not json").unwrap();

        let titles = EpicScanner::new(dir.path()).scan().unwrap();
        assert_eq!(titles.len(), 1);
        let celeste = &titles[0];
        assert_eq!(celeste.store_id.as_deref(), Some("Salt"));
        assert_eq!(celeste.namespace.as_deref(), Some("ns1"));
        assert_eq!(
            celeste.launch_command.as_deref(),
            Some("com.epicgames.launcher://apps/ns1%3Acat1%3ASalt?action=launch&silent=true")
        );
    }

    #[test]
    fn test_epic_missing_dir_is_error() {
        let result = EpicScanner::new("/nonexistent/epic").scan();
        assert!(matches!(result, Err(LibraryError::ScanError(_))));
    }
}
