//! The catalog service
//!
//! `Catalog` owns the entry arena and every system. It is not thread safe:
//! scanners and metadata fetchers run elsewhere and hand their results over
//! through an [`UpdateSender`]; the owner applies them with
//! [`Catalog::apply_pending`].

use crate::filter::{FilterState, sort_entries};
use crate::gamelist::write_game_info;
use crate::media::{MediaKind, MediaResolver, MediaSource};
use crate::metadata::{MetadataKey, MetadataStore};
use crate::names::ArcadeNames;
use crate::persistence::{self, LoadReport, SaveReport};
use crate::reconcile::{ReconcileReport, reconcile};
use crate::scanner::{DirectoryScanner, ScanResult};
use crate::store::EntryStatus;
use crate::store_scanner::InstalledTitle;
use crate::system::{GameCounts, System, SystemId};
use crate::tree::{CatalogTree, Entry, EntryId, EntryType, TypeMask};
use crate::LibraryError;
use ludex_config::{CatalogSettings, LudexConfig, PathSettings, SystemConfig};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender, channel};

/// Results produced off the owning thread
#[derive(Debug, Clone)]
pub enum CatalogUpdate {
    /// A store installation scan finished
    StoreScanned {
        system: SystemId,
        titles: Vec<InstalledTitle>,
    },
    /// A metadata fetch finished for the entry at `path`
    MetadataFetched {
        system: SystemId,
        path: String,
        fields: Vec<(MetadataKey, String)>,
    },
    /// A scan could not run
    ScanFailed { system: SystemId, error: String },
}

/// Cloneable handle for sending updates to the catalog owner
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: Sender<CatalogUpdate>,
}

impl UpdateSender {
    /// Queue an update; false once the catalog is gone
    pub fn send(&self, update: CatalogUpdate) -> bool {
        self.tx.send(update).is_ok()
    }
}

/// What a metadata fetcher needs to know about a game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTarget {
    pub system: SystemId,
    pub system_name: String,
    pub path: String,
    pub name: String,
    pub store_id: Option<String>,
    pub namespace: Option<String>,
    pub catalog_id: Option<String>,
    pub is_virtual: bool,
    pub is_installed: bool,
}

/// Every system and entry of the library
pub struct Catalog {
    settings: CatalogSettings,
    paths: PathSettings,
    tree: CatalogTree,
    systems: BTreeMap<SystemId, System>,
    next_system: u32,
    arcade_names: ArcadeNames,
    tx: Sender<CatalogUpdate>,
    rx: Receiver<CatalogUpdate>,
}

impl Catalog {
    pub fn new(settings: CatalogSettings, paths: PathSettings) -> Self {
        let arcade_names = match &paths.arcade_names {
            Some(path) => ArcadeNames::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load arcade names from {}: {}", path.display(), e);
                ArcadeNames::new()
            }),
            None => ArcadeNames::new(),
        };

        let (tx, rx) = channel();
        Self {
            settings,
            paths,
            tree: CatalogTree::new(),
            systems: BTreeMap::new(),
            next_system: 0,
            arcade_names,
            tx,
            rx,
        }
    }

    /// Catalog with every configured system added
    pub fn from_config(config: &LudexConfig) -> Self {
        let mut catalog = Self::new(config.catalog.clone(), config.paths.clone());
        for system in config.systems.values() {
            if let Err(e) = catalog.add_system(system.clone()) {
                tracing::warn!("Skipping system '{}': {}", system.short_name, e);
            }
        }
        catalog
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut CatalogSettings {
        &mut self.settings
    }

    pub fn tree(&self) -> &CatalogTree {
        &self.tree
    }

    pub fn set_arcade_names(&mut self, names: ArcadeNames) {
        self.arcade_names = names;
    }

    // ---------------------------------------------------------------------
    // Systems
    // ---------------------------------------------------------------------

    /// Register a system and create its root folder
    pub fn add_system(&mut self, config: SystemConfig) -> Result<SystemId, LibraryError> {
        if self.system_by_name(&config.short_name).is_some() {
            return Err(LibraryError::DuplicateEntry(config.short_name));
        }

        let id = SystemId(self.next_system);
        self.next_system += 1;

        let start_path = config.resolved_start_path(&self.paths.roms_dir);
        let root = self.tree.create_folder(id, &start_path, true, false);
        let system = System::new(id, config, &self.paths, root);
        tracing::debug!("Added system '{}' at {}", system.name(), start_path.display());
        self.systems.insert(id, system);
        Ok(id)
    }

    /// Drop a system and every entry it owns
    pub fn remove_system(&mut self, id: SystemId) -> Result<(), LibraryError> {
        let system = self
            .systems
            .remove(&id)
            .ok_or_else(|| LibraryError::SystemNotFound(id.to_string()))?;
        self.tree.destroy(system.root());
        tracing::info!("Removed system '{}'", system.name());
        Ok(())
    }

    pub fn system(&self, id: SystemId) -> Option<&System> {
        self.systems.get(&id)
    }

    pub fn system_by_name(&self, name: &str) -> Option<SystemId> {
        self.systems
            .values()
            .find(|s| s.name() == name)
            .map(|s| s.id())
    }

    pub fn systems(&self) -> impl Iterator<Item = &System> {
        self.systems.values()
    }

    /// Systems to show, skipping empty ones when configured
    pub fn visible_systems(&mut self) -> Vec<SystemId> {
        let ids: Vec<SystemId> = self.systems.keys().copied().collect();
        ids.into_iter()
            .filter(|id| !self.settings.hide_empty_systems || self.game_counts(*id).total > 0)
            .collect()
    }

    fn require(&self, id: SystemId) -> Result<&System, LibraryError> {
        self.systems
            .get(&id)
            .ok_or_else(|| LibraryError::SystemNotFound(id.to_string()))
    }

    fn system_name(&self, id: SystemId) -> String {
        self.systems
            .get(&id)
            .map(|s| s.full_name().to_string())
            .unwrap_or_default()
    }

    // ---------------------------------------------------------------------
    // Entries
    // ---------------------------------------------------------------------

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.tree.get(id)
    }

    /// Scan a physical system's directory into its tree
    pub fn populate_system(&mut self, id: SystemId) -> Result<ScanResult, LibraryError> {
        let system = self.require(id)?;
        if system.is_store() {
            return Ok(ScanResult::default());
        }
        let scanner = DirectoryScanner::for_system(system.config());
        let root = system.root();
        let start_path = system.start_path().to_path_buf();
        scanner.scan(&mut self.tree, id, root, &start_path)
    }

    /// Locate an entry, creating it and its parent folders when missing
    pub fn find_or_create_file(
        &mut self,
        id: SystemId,
        status: EntryStatus,
        entry_type: EntryType,
    ) -> Option<EntryId> {
        let system = self.systems.get(&id)?;
        self.tree
            .find_or_create_file(id, system.root(), system.start_path(), status, entry_type)
    }

    /// Find a game by its path string within a system
    pub fn find_game(&self, id: SystemId, path: &str) -> Option<EntryId> {
        let system = self.systems.get(&id)?;
        let status = match EntryStatus::parse(path) {
            EntryStatus::Physical(p) if p.is_relative() => {
                EntryStatus::physical(system.start_path().join(p))
            }
            other => other,
        };
        self.tree.lookup(id, &status.lookup_key())
    }

    /// Name to show: explicit name, arcade title, or file stem
    pub fn display_name(&self, id: EntryId) -> String {
        let Some(entry) = self.tree.get(id) else {
            return String::new();
        };
        if entry.is_game()
            && entry.metadata().get(MetadataKey::Name).is_empty()
            && self
                .systems
                .get(&entry.system())
                .is_some_and(|s| s.config().arcade)
            && let Some(real) = self.arcade_names.lookup(&entry.stem())
        {
            return real.to_string();
        }
        entry.display_name()
    }

    /// Edit an entry's metadata; a real change is written to the recovery log
    pub fn edit_metadata<F>(&mut self, id: EntryId, edit: F) -> Result<bool, LibraryError>
    where
        F: FnOnce(&mut MetadataStore),
    {
        let before = self.snapshot(id)?;
        if let Some(md) = self.tree.metadata_mut(id) {
            edit(md);
        }
        let changed = self.snapshot(id)? != before;

        if changed && self.settings.recovery_log {
            let system_id = self
                .tree
                .get(id)
                .map(|e| e.system())
                .ok_or_else(|| LibraryError::EntryNotFound(format!("{:?}", id)))?;
            if let Some(system) = self.systems.get(&system_id) {
                persistence::write_recovery(&self.tree, system, id);
            }
        }
        Ok(changed)
    }

    fn snapshot(&self, id: EntryId) -> Result<Vec<(MetadataKey, String)>, LibraryError> {
        let entry = self
            .tree
            .get(id)
            .ok_or_else(|| LibraryError::EntryNotFound(format!("{:?}", id)))?;
        Ok(entry
            .metadata()
            .non_default_fields()
            .map(|(k, v)| (k, v.to_string()))
            .collect())
    }

    /// Delete an entry (and an owned subtree); its gamelist nodes go on the next save
    pub fn remove_entry(&mut self, id: EntryId) -> Result<(), LibraryError> {
        let entry = self
            .tree
            .get(id)
            .ok_or_else(|| LibraryError::EntryNotFound(format!("{:?}", id)))?;
        let system_id = entry.system();
        let system = self
            .systems
            .get_mut(&system_id)
            .ok_or_else(|| LibraryError::SystemNotFound(system_id.to_string()))?;
        if system.root() == id {
            return Err(LibraryError::EntryNotFound(
                "a system root cannot be removed".to_string(),
            ));
        }

        let mut keys = vec![persistence::fragment_key(entry)];
        if entry.owns_children() {
            keys.extend(
                self.tree
                    .files_recursive(id, TypeMask::ALL, None, true)
                    .filter_map(|e| self.tree.get(e))
                    .map(persistence::fragment_key),
            );
        }
        for key in keys {
            system.recovery().remove(&key);
            system.remember_removed(key);
        }

        self.tree.destroy(id);
        Ok(())
    }

    /// Resolve media for an entry, caching discoveries of cacheable kinds
    pub fn media_path(&mut self, id: EntryId, kind: MediaKind) -> Option<String> {
        let entry = self.tree.get(id)?;
        let system = self.systems.get(&entry.system())?;
        let (path, source) = MediaResolver::new(system.config()).resolve(entry, kind)?;

        if source == MediaSource::Discovered && kind.caches_discovery() {
            self.tree.cache_metadata(id, kind.key(), &path);
        }
        Some(path)
    }

    /// Metadata-fill view of a game
    pub fn scrape_target(&self, id: EntryId) -> Option<ScrapeTarget> {
        let entry = self.tree.get(id)?;
        if !entry.is_game() {
            return None;
        }
        let md = entry.metadata();
        let non_empty = |key| {
            let value = md.get(key);
            (!value.is_empty()).then(|| value.to_string())
        };

        Some(ScrapeTarget {
            system: entry.system(),
            system_name: self
                .systems
                .get(&entry.system())
                .map(|s| s.name().to_string())
                .unwrap_or_default(),
            path: entry.path_string(),
            name: self.display_name(id),
            store_id: non_empty(MetadataKey::StoreId)
                .or_else(|| entry.status().store_ref().map(|r| r.id.clone())),
            namespace: non_empty(MetadataKey::StoreNamespace),
            catalog_id: non_empty(MetadataKey::StoreCatalogId),
            is_virtual: entry.status().is_virtual(),
            is_installed: !entry.status().is_virtual(),
        })
    }

    /// Export one game for the launch command's `%GAMEINFOXML%`
    pub fn write_game_info(&self, id: EntryId, path: &Path) -> Result<(), LibraryError> {
        let entry = self
            .tree
            .get(id)
            .ok_or_else(|| LibraryError::EntryNotFound(format!("{:?}", id)))?;
        let system = self.require(entry.system())?;

        // Absolute paths: the reader does not know the system root
        let node = persistence::node_for_entry(entry, Path::new(""), true)
            .ok_or_else(|| LibraryError::EntryNotFound(entry.path_string()))?;
        write_game_info(path, system.name(), system.full_name(), &node)?;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Views
    // ---------------------------------------------------------------------

    pub fn game_counts(&mut self, id: SystemId) -> GameCounts {
        match self.systems.get_mut(&id) {
            Some(system) => system.game_counts(&self.tree),
            None => GameCounts::default(),
        }
    }

    pub fn filter_state_mut(&mut self, id: SystemId) -> Option<&mut FilterState> {
        self.systems.get_mut(&id).map(|s| s.filter_state_mut())
    }

    /// Every displayed game of a system, in display order
    pub fn visible_games(&mut self, id: SystemId) -> Vec<EntryId> {
        let Some(system) = self.systems.get_mut(&id) else {
            return Vec::new();
        };
        system.filter_index(&self.tree);

        let system = &self.systems[&id];
        let ctx = system.filter_context(&self.settings);
        let mut ids: Vec<EntryId> = self
            .tree
            .files_recursive(system.root(), TypeMask::GAME, Some(ctx), false)
            .collect();
        let index = system.cached_index().filter(|i| i.is_active());
        sort_entries(&self.tree, &mut ids, &self.settings, index, &|s| self.system_name(s));
        ids
    }

    /// Displayed children of a folder, in display order
    pub fn sorted_children(&mut self, folder: EntryId) -> Vec<EntryId> {
        let Some(system_id) = self.tree.get(folder).map(|e| e.system()) else {
            return Vec::new();
        };
        let Some(system) = self.systems.get_mut(&system_id) else {
            return Vec::new();
        };
        system.filter_index(&self.tree);

        let system = &self.systems[&system_id];
        let ctx = system.filter_context(&self.settings);
        let children = self.tree.get(folder).map(|e| e.children()).unwrap_or(&[]);
        let mut ids: Vec<EntryId> = children
            .iter()
            .copied()
            .filter(|c| self.tree.get(*c).is_some_and(|e| ctx.is_displayed(*c, e)))
            .collect();
        let index = system.cached_index().filter(|i| i.is_active());
        sort_entries(&self.tree, &mut ids, &self.settings, index, &|s| self.system_name(s));
        ids
    }

    // ---------------------------------------------------------------------
    // Store reconciliation and updates
    // ---------------------------------------------------------------------

    /// Merge a store scan into a store system
    pub fn reconcile_store(
        &mut self,
        id: SystemId,
        titles: Vec<InstalledTitle>,
    ) -> Result<ReconcileReport, LibraryError> {
        let system = self.require(id)?;
        let Some(store) = system.store() else {
            return Err(LibraryError::ScanError(format!(
                "'{}' is not a store system",
                system.name()
            )));
        };
        let root = system.root();
        let report = reconcile(&mut self.tree, id, root, store, titles);

        if self.settings.recovery_log
            && let Some(system) = self.systems.get(&id)
        {
            for entry in &report.changed {
                persistence::write_recovery(&self.tree, system, *entry);
            }
        }
        Ok(report)
    }

    pub fn update_sender(&self) -> UpdateSender {
        UpdateSender {
            tx: self.tx.clone(),
        }
    }

    /// Apply every queued update; returns how many were applied
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.rx.try_recv() {
            self.apply(update);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, update: CatalogUpdate) {
        match update {
            CatalogUpdate::StoreScanned { system, titles } => {
                if let Err(e) = self.reconcile_store(system, titles) {
                    tracing::warn!("Store scan for {} not applied: {}", system, e);
                }
            }
            CatalogUpdate::MetadataFetched {
                system,
                path,
                fields,
            } => {
                let Some(id) = self.find_game(system, &path) else {
                    tracing::warn!("Fetched metadata for unknown game '{}'", path);
                    return;
                };
                let result = self.edit_metadata(id, |md| {
                    for (key, value) in &fields {
                        md.set(*key, value);
                    }
                });
                if let Err(e) = result {
                    tracing::warn!("Fetched metadata for '{}' not applied: {}", path, e);
                }
            }
            CatalogUpdate::ScanFailed { system, error } => {
                tracing::error!("Scan of {} failed: {}", self.system_name(system), error);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Scan (physical systems) and load the gamelist of one system
    pub fn load_system(&mut self, id: SystemId) -> Result<LoadReport, LibraryError> {
        let system = self.require(id)?;
        if !system.is_store() && system.start_path().is_dir() {
            if let Err(e) = self.populate_system(id) {
                tracing::warn!("Directory scan failed: {}", e);
            }
        }

        let system = self
            .systems
            .get(&id)
            .ok_or_else(|| LibraryError::SystemNotFound(id.to_string()))?;
        Ok(persistence::load_gamelist(&mut self.tree, system, &self.settings))
    }

    /// Load every system; one failing system does not stop the others
    pub fn load_gamelists(&mut self) -> Vec<(SystemId, LoadReport)> {
        let ids: Vec<SystemId> = self.systems.keys().copied().collect();
        let mut reports = Vec::new();
        for id in ids {
            match self.load_system(id) {
                Ok(report) => reports.push((id, report)),
                Err(e) => tracing::error!("Failed to load {}: {}", self.system_name(id), e),
            }
        }
        reports
    }

    pub fn save_system(&mut self, id: SystemId) -> Result<SaveReport, LibraryError> {
        let system = self
            .systems
            .get_mut(&id)
            .ok_or_else(|| LibraryError::SystemNotFound(id.to_string()))?;
        persistence::save_gamelist(&mut self.tree, system)
    }

    /// Save every system; returns the number of failures
    pub fn save_gamelists(&mut self) -> usize {
        let ids: Vec<SystemId> = self.systems.keys().copied().collect();
        let mut failures = 0;
        for id in ids {
            if let Err(e) = self.save_system(id) {
                tracing::error!("Failed to save gamelist of {}: {}", self.system_name(id), e);
                failures += 1;
            }
        }
        failures
    }

    /// Orderly shutdown: flush gamelists if configured
    pub fn shutdown(mut self) -> usize {
        self.apply_pending();
        if self.settings.save_gamelists_on_exit {
            self.save_gamelists()
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreKind, StoreRef};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct TestEnv {
        #[allow(dead_code)]
        temp_dir: TempDir,
        catalog: Catalog,
        nes: SystemId,
        steam: SystemId,
        roms: PathBuf,
    }

    impl TestEnv {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let roms = temp_dir.path().join("roms");
            std::fs::create_dir_all(roms.join("nes")).unwrap();

            let mut paths = PathSettings::default();
            paths.roms_dir = roms.clone();
            paths.recovery_dir = temp_dir.path().join("recovery");

            let mut catalog = Catalog::new(CatalogSettings::default(), paths);
            let nes = catalog
                .add_system(SystemConfig::new("nes", roms.join("nes")).with_extensions(&["nes"]))
                .unwrap();
            let mut steam = SystemConfig::new("steam", roms.join("steam")).with_store("steam");
            steam.start_path = None;
            let steam = catalog.add_system(steam).unwrap();

            Self {
                temp_dir,
                catalog,
                nes,
                steam,
                roms,
            }
        }

        fn rom(&self, name: &str) -> PathBuf {
            let path = self.roms.join("nes").join(name);
            std::fs::write(&path, b"rom").unwrap();
            path
        }
    }

    #[test]
    fn test_duplicate_system_rejected() {
        let mut env = TestEnv::new();
        let result = env.catalog.add_system(SystemConfig::new("nes", "/elsewhere"));
        assert!(matches!(result, Err(LibraryError::DuplicateEntry(_))));
        assert_eq!(env.catalog.system_by_name("steam"), Some(env.steam));
    }

    #[test]
    fn test_edit_metadata_writes_recovery_fragment() {
        let mut env = TestEnv::new();
        env.rom("a.nes");
        env.catalog.populate_system(env.nes).unwrap();
        let game = env.catalog.find_game(env.nes, "./a.nes").unwrap();

        let changed = env
            .catalog
            .edit_metadata(game, |md| {
                md.set(MetadataKey::Favorite, "true");
            })
            .unwrap();
        assert!(changed);
        assert_eq!(env.catalog.system(env.nes).unwrap().recovery().len(), 1);

        // No-op edit writes nothing new
        let changed = env
            .catalog
            .edit_metadata(game, |md| {
                md.set(MetadataKey::Favorite, "true");
            })
            .unwrap();
        assert!(!changed);
    }

    #[test]
    fn test_remove_entry_forgets_node_on_save() {
        let mut env = TestEnv::new();
        env.rom("a.nes");
        env.rom("b.nes");
        env.catalog.populate_system(env.nes).unwrap();

        for path in ["./a.nes", "./b.nes"] {
            let id = env.catalog.find_game(env.nes, path).unwrap();
            env.catalog
                .edit_metadata(id, |md| {
                    md.set(MetadataKey::PlayCount, "2");
                })
                .unwrap();
        }
        env.catalog.save_system(env.nes).unwrap();

        let a = env.catalog.find_game(env.nes, "./a.nes").unwrap();
        env.catalog.remove_entry(a).unwrap();
        assert!(env.catalog.entry(a).is_none());

        let report = env.catalog.save_system(env.nes).unwrap();
        assert_eq!(report.removed, 1);

        let doc = crate::gamelist::GamelistDocument::read(
            env.catalog.system(env.nes).unwrap().gamelist_path(),
        )
        .unwrap();
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.nodes[0].path(), Some("./b.nes"));
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut env = TestEnv::new();
        let root = env.catalog.system(env.nes).unwrap().root();
        assert!(env.catalog.remove_entry(root).is_err());
    }

    #[test]
    fn test_updates_through_channel() {
        let mut env = TestEnv::new();
        let sender = env.catalog.update_sender();
        let steam = env.steam;

        let worker = std::thread::spawn(move || {
            sender.send(CatalogUpdate::StoreScanned {
                system: steam,
                titles: vec![InstalledTitle::new("Portal").with_store_id("400")],
            });
            sender.send(CatalogUpdate::MetadataFetched {
                system: steam,
                path: "steam:/installed/400".to_string(),
                fields: vec![(MetadataKey::Developer, "Valve".to_string())],
            });
            sender.send(CatalogUpdate::ScanFailed {
                system: steam,
                error: "offline".to_string(),
            });
        });
        worker.join().unwrap();

        assert_eq!(env.catalog.apply_pending(), 3);
        let game = env.catalog.find_game(steam, "steam:/virtual/400").unwrap();
        let entry = env.catalog.entry(game).unwrap();
        assert!(entry.status().is_installed());
        assert_eq!(entry.metadata().get(MetadataKey::Developer), "Valve");
    }

    #[test]
    fn test_scrape_target() {
        let mut env = TestEnv::new();
        let id = env
            .catalog
            .find_or_create_file(
                env.steam,
                EntryStatus::Virtual(StoreRef::new(StoreKind::Steam, "70")),
                EntryType::Game,
            )
            .unwrap();

        let target = env.catalog.scrape_target(id).unwrap();
        assert_eq!(target.store_id.as_deref(), Some("70"));
        assert!(target.is_virtual);
        assert!(!target.is_installed);
        assert_eq!(target.path, "steam:/virtual/70");
        assert_eq!(target.system_name, "steam");
    }

    #[test]
    fn test_arcade_display_names() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = PathSettings::default();
        paths.recovery_dir = temp_dir.path().join("recovery");
        let mut catalog = Catalog::new(CatalogSettings::default(), paths);
        let mut config = SystemConfig::new("mame", temp_dir.path()).with_extensions(&["zip"]);
        config.arcade = true;
        let mame = catalog.add_system(config).unwrap();

        let mut names = ArcadeNames::new();
        names.insert("pacman", "Pac-Man");
        catalog.set_arcade_names(names);

        let id = catalog
            .find_or_create_file(
                mame,
                EntryStatus::physical(temp_dir.path().join("pacman.zip")),
                EntryType::Game,
            )
            .unwrap();
        assert_eq!(catalog.display_name(id), "Pac-Man");

        catalog
            .edit_metadata(id, |md| {
                md.set(MetadataKey::Name, "Puck Man");
            })
            .unwrap();
        assert_eq!(catalog.display_name(id), "Puck Man");
    }

    #[test]
    fn test_media_discovery_is_cached_quietly() {
        let mut env = TestEnv::new();
        let rom = env.rom("zelda.nes");
        let image = env.roms.join("nes").join("zelda-image.png");
        std::fs::write(&image, b"png").unwrap();
        env.catalog.populate_system(env.nes).unwrap();
        let id = env.catalog.find_game(env.nes, &rom.to_string_lossy()).unwrap();

        let path = env.catalog.media_path(id, MediaKind::Image).unwrap();
        assert_eq!(path, image.to_string_lossy());

        let entry = env.catalog.entry(id).unwrap();
        assert_eq!(entry.metadata().get(MetadataKey::Image), image.to_string_lossy());
        assert!(!entry.metadata().was_changed());
    }

    #[test]
    fn test_visible_games_sorted_and_filtered() {
        let mut env = TestEnv::new();
        for name in ["c.nes", "a.nes", "b.nes"] {
            env.rom(name);
        }
        env.catalog.populate_system(env.nes).unwrap();
        let b = env.catalog.find_game(env.nes, "./b.nes").unwrap();
        env.catalog
            .edit_metadata(b, |md| {
                md.set(MetadataKey::Hidden, "true");
            })
            .unwrap();

        let names: Vec<String> = env
            .catalog
            .visible_games(env.nes)
            .into_iter()
            .map(|id| env.catalog.display_name(id))
            .collect();
        assert_eq!(names, vec!["a", "c"]);

        env.catalog
            .filter_state_mut(env.nes)
            .unwrap()
            .set_text("c");
        let filtered = env.catalog.visible_games(env.nes);
        assert_eq!(filtered.len(), 1);

        let counts = env.catalog.game_counts(env.nes);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.hidden, 1);
    }
}
