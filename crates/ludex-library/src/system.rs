//! A system: one platform or store with its own subtree

use crate::filter::{FilterContext, FilterIndex, FilterState};
use crate::metadata::MetadataKey;
use crate::recovery::RecoveryLog;
use crate::store::StoreKind;
use crate::tree::{CatalogTree, EntryId, TypeMask};
use ludex_config::{CatalogSettings, PathSettings, SystemConfig};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Handle to a system inside a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u32);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// Game count summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameCounts {
    /// Games that are not hidden
    pub total: usize,
    pub favorites: usize,
    pub hidden: usize,
    /// Games launched at least once
    pub played: usize,
}

/// One system of the catalog
#[derive(Debug)]
pub struct System {
    id: SystemId,
    config: SystemConfig,
    start_path: PathBuf,
    gamelist_path: PathBuf,
    recovery: RecoveryLog,
    root: EntryId,
    store: Option<StoreKind>,
    filter_state: FilterState,
    index: Option<FilterIndex>,
    counts: Option<(u64, GameCounts)>,
    removed_keys: BTreeSet<String>,
}

impl System {
    pub(crate) fn new(
        id: SystemId,
        config: SystemConfig,
        paths: &PathSettings,
        root: EntryId,
    ) -> Self {
        let start_path = config.resolved_start_path(&paths.roms_dir);
        let gamelist_path = paths.gamelist_path(&config.short_name, &start_path);
        let recovery = RecoveryLog::new(paths.recovery_path(&config.short_name));
        let store = config.store.as_deref().and_then(|name| {
            let kind = StoreKind::from_scheme(name);
            if kind.is_none() {
                tracing::warn!(
                    "System '{}' names unknown store '{}'",
                    config.short_name,
                    name
                );
            }
            kind
        });

        Self {
            id,
            config,
            start_path,
            gamelist_path,
            recovery,
            root,
            store,
            filter_state: FilterState::new(),
            index: None,
            counts: None,
            removed_keys: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    /// Short name ("nes")
    pub fn name(&self) -> &str {
        &self.config.short_name
    }

    /// Display name ("Nintendo Entertainment System")
    pub fn full_name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn start_path(&self) -> &Path {
        &self.start_path
    }

    pub fn gamelist_path(&self) -> &Path {
        &self.gamelist_path
    }

    pub fn recovery(&self) -> &RecoveryLog {
        &self.recovery
    }

    pub fn root(&self) -> EntryId {
        self.root
    }

    pub fn store(&self) -> Option<StoreKind> {
        self.store
    }

    pub fn is_store(&self) -> bool {
        self.config.is_store()
    }

    pub fn filter_state(&self) -> &FilterState {
        &self.filter_state
    }

    pub fn filter_state_mut(&mut self) -> &mut FilterState {
        &mut self.filter_state
    }

    /// Keys whose gamelist nodes must be dropped on the next save
    pub fn removed_keys(&self) -> &BTreeSet<String> {
        &self.removed_keys
    }

    pub(crate) fn remember_removed(&mut self, key: String) {
        self.removed_keys.insert(key);
    }

    pub(crate) fn forget_removed(&mut self) {
        self.removed_keys.clear();
    }

    /// Filter index, rebuilt if the tree or the filter state moved on
    pub fn filter_index(&mut self, tree: &CatalogTree) -> &FilterIndex {
        let revision = tree.revision(self.id);
        let stale = self
            .index
            .as_ref()
            .is_none_or(|i| i.is_stale(revision, &self.filter_state));
        if stale {
            self.index = None;
        }
        self.index.get_or_insert_with(|| {
            FilterIndex::build(tree, self.root, &self.filter_state, revision)
        })
    }

    /// Cached index, if one has been built
    pub fn cached_index(&self) -> Option<&FilterIndex> {
        self.index.as_ref()
    }

    /// Display policy for this system's entries
    pub fn filter_context<'a>(&'a self, settings: &CatalogSettings) -> FilterContext<'a> {
        let ctx = FilterContext::new(settings, &self.config.hidden_extensions);
        match &self.index {
            Some(index) if index.is_active() => ctx.with_index(index),
            _ => ctx,
        }
    }

    /// Game counts, recomputed when the tree changed
    pub fn game_counts(&mut self, tree: &CatalogTree) -> GameCounts {
        let revision = tree.revision(self.id);
        if let Some((cached_at, counts)) = self.counts
            && cached_at == revision
        {
            return counts;
        }

        let mut counts = GameCounts::default();
        for id in tree.files_recursive(self.root, TypeMask::GAME, None, true) {
            let Some(entry) = tree.get(id) else { continue };
            let md = entry.metadata();
            if md.get_bool(MetadataKey::Hidden) {
                counts.hidden += 1;
                continue;
            }
            counts.total += 1;
            if md.get_bool(MetadataKey::Favorite) {
                counts.favorites += 1;
            }
            if md.get_int(MetadataKey::PlayCount) > 0 {
                counts.played += 1;
            }
        }

        self.counts = Some((revision, counts));
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntryStatus;

    fn system(tree: &mut CatalogTree) -> System {
        let id = SystemId(3);
        let root = tree.create_folder(id, "/roms/gba", true, false);
        let config = SystemConfig::new("gba", "/roms/gba").with_extensions(&["gba"]);
        let mut paths = PathSettings::default();
        paths.recovery_dir = PathBuf::from("/tmp/ludex-recovery");
        System::new(id, config, &paths, root)
    }

    #[test]
    fn test_paths_resolved_from_config() {
        let mut tree = CatalogTree::new();
        let sys = system(&mut tree);
        assert_eq!(sys.start_path(), Path::new("/roms/gba"));
        assert_eq!(sys.gamelist_path(), Path::new("/roms/gba/gamelist.xml"));
        assert_eq!(sys.recovery().dir(), Path::new("/tmp/ludex-recovery/gba"));
        assert!(sys.store().is_none());
    }

    #[test]
    fn test_game_counts_follow_revisions() {
        let mut tree = CatalogTree::new();
        let mut sys = system(&mut tree);
        let root = sys.root();

        for (file, fav) in [("a.gba", true), ("b.gba", false)] {
            let id = tree
                .create_game(sys.id(), EntryStatus::physical(format!("/roms/gba/{}", file)))
                .unwrap();
            tree.add_child(root, id, true);
            if fav {
                tree.metadata_mut(id).unwrap().set(MetadataKey::Favorite, "true");
            }
        }

        let counts = sys.game_counts(&tree);
        assert_eq!(counts.total, 2);
        assert_eq!(counts.favorites, 1);

        let hidden = tree.lookup(sys.id(), "/roms/gba/b.gba").unwrap();
        tree.metadata_mut(hidden).unwrap().set(MetadataKey::Hidden, "true");

        let counts = sys.game_counts(&tree);
        assert_eq!(counts.total, 1);
        assert_eq!(counts.hidden, 1);
    }

    #[test]
    fn test_filter_index_rebuilt_on_state_change() {
        let mut tree = CatalogTree::new();
        let mut sys = system(&mut tree);
        assert!(!sys.filter_index(&tree).is_active());

        sys.filter_state_mut().set_text("zelda");
        assert!(sys.filter_index(&tree).is_active());
    }
}
