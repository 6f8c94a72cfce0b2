//! Loading and saving a system's gamelist
//!
//! Load builds entries from the canonical document, then replays recovery
//! fragments that were written against the same document. Save re-reads the
//! document, replaces the nodes of dirty entries and writes it back through
//! a temporary file. Dirty flags and recovery fragments are only cleared
//! after the write succeeded.

use crate::LibraryError;
use crate::gamelist::{GamelistDocument, GamelistField, GamelistNode, NodeKind};
use crate::metadata::{MetadataKey, MetadataScope, MetadataStore, MetadataType};
use crate::store::{EntryStatus, normalize_path};
use crate::system::System;
use crate::tree::{CatalogTree, Entry, EntryId, EntryType};
use ludex_config::CatalogSettings;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Outcome of loading one gamelist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub games: usize,
    pub folders: usize,
    /// Physical entries dropped because their file is gone
    pub missing: usize,
    /// Entries restored from recovery fragments
    pub replayed: usize,
    /// The canonical document could not be parsed
    pub parse_failed: bool,
}

/// Outcome of saving one gamelist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Nodes written for dirty entries
    pub written: usize,
    /// Existing nodes dropped (replaced or removed)
    pub removed: usize,
    /// Nothing was dirty; the document was not touched
    pub unchanged: bool,
}

/// Byte size of the canonical document, 0 if absent
pub(crate) fn document_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Resolve a document path against the system root
fn resolve_path(text: &str, start_path: &Path) -> EntryStatus {
    match EntryStatus::parse(text) {
        EntryStatus::Physical(p) => {
            if p.is_absolute() {
                EntryStatus::physical(p)
            } else {
                EntryStatus::physical(start_path.join(p))
            }
        }
        store => store,
    }
}

/// Document form of a physical path: `./relative` below the root, else absolute
fn relativize(path: &Path, start_path: &Path) -> String {
    let path = normalize_path(path);
    if start_path.as_os_str().is_empty() {
        return path.to_string_lossy().to_string();
    }
    match path.strip_prefix(normalize_path(start_path)) {
        Ok(rel) if !rel.as_os_str().is_empty() => {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            format!("./{}", parts.join("/"))
        }
        _ => path.to_string_lossy().to_string(),
    }
}

fn absolutize_value(value: &str, start_path: &Path) -> String {
    match value.strip_prefix("./") {
        Some(rest) => normalize_path(&start_path.join(rest))
            .to_string_lossy()
            .to_string(),
        None => value.to_string(),
    }
}

fn relativize_value(value: &str, start_path: &Path) -> String {
    let path = Path::new(value);
    if path.is_absolute() && path.starts_with(start_path) {
        relativize(path, start_path)
    } else {
        value.to_string()
    }
}

/// Key matching document nodes to entries, tagged by kind
fn node_key(kind: EntryType, key: String) -> (bool, String) {
    (kind == EntryType::Folder, key)
}

/// Serialize an entry.
///
/// Returns `None` when the entry carries nothing beyond its default name,
/// unless `always` is set.
pub(crate) fn node_for_entry(
    entry: &Entry,
    start_path: &Path,
    always: bool,
) -> Option<GamelistNode> {
    let kind = if entry.is_folder() {
        NodeKind::Folder
    } else {
        NodeKind::Game
    };
    let mut node = GamelistNode::new(kind);

    let default_name = entry.default_name();
    for (key, value) in entry.metadata().non_default_fields() {
        if key == MetadataKey::Name && value == default_name {
            continue;
        }
        let value = if key.value_type() == MetadataType::Path {
            relativize_value(value, start_path)
        } else {
            value.to_string()
        };
        node.set_field(key.tag(), value);
    }

    if node.fields.is_empty() && !always {
        return None;
    }

    let path = match entry.status() {
        EntryStatus::Physical(p) => relativize(p, start_path),
        store => store.to_path_string(),
    };
    node.fields.insert(0, GamelistField::new("path", path));
    Some(node)
}

/// Metadata carried by a node, with path values resolved
fn node_metadata(node: &GamelistNode, scope: MetadataScope, start_path: &Path) -> MetadataStore {
    let mut md = MetadataStore::new(scope);
    for field in &node.fields {
        let Some(key) = MetadataKey::from_tag(&field.tag) else {
            continue;
        };
        if !scope.supports(key) {
            continue;
        }
        let value = if key.value_type() == MetadataType::Path {
            absolutize_value(&field.text, start_path)
        } else {
            field.text.clone()
        };
        md.set_quiet(key, &value);
    }
    md
}

enum NodeTarget {
    Entry(EntryId, EntryStatus),
    /// Physical file no longer on disk
    Missing,
    Skipped,
}

/// Find or create the entry a node describes
fn entry_for_node(
    tree: &mut CatalogTree,
    system: &System,
    node: &GamelistNode,
    settings: &CatalogSettings,
) -> NodeTarget {
    let entry_type = match node.kind {
        NodeKind::Game => EntryType::Game,
        NodeKind::Folder => EntryType::Folder,
        NodeKind::Other(_) => return NodeTarget::Skipped,
    };
    let Some(path) = node.path().filter(|p| !p.is_empty()) else {
        tracing::warn!("{}: gamelist node without a path", system.name());
        return NodeTarget::Skipped;
    };

    let status = resolve_path(path, system.start_path());
    if let Some(physical) = status.physical_path()
        && settings.check_missing_files
        && !physical.exists()
    {
        tracing::debug!("{}: '{}' no longer exists", system.name(), physical.display());
        return NodeTarget::Missing;
    }

    match tree.find_or_create_file(
        system.id(),
        system.root(),
        system.start_path(),
        status.clone(),
        entry_type,
    ) {
        Some(id) => NodeTarget::Entry(id, status),
        None => NodeTarget::Skipped,
    }
}

/// Populate a system from its gamelist and recovery fragments
pub(crate) fn load_gamelist(
    tree: &mut CatalogTree,
    system: &System,
    settings: &CatalogSettings,
) -> LoadReport {
    let mut report = LoadReport::default();
    let path = system.gamelist_path();
    let parent_size = document_size(path);

    let doc = if path.exists() {
        match GamelistDocument::read(path) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!("Failed to parse {}: {}", path.display(), e);
                report.parse_failed = true;
                GamelistDocument::new()
            }
        }
    } else {
        GamelistDocument::new()
    };

    for node in &doc.nodes {
        let id = match entry_for_node(tree, system, node, settings) {
            NodeTarget::Entry(id, _) => id,
            NodeTarget::Missing => {
                report.missing += 1;
                continue;
            }
            NodeTarget::Skipped => continue,
        };
        let Some(entry) = tree.get(id) else { continue };
        let scope = entry.metadata().scope();
        let is_folder = entry.is_folder();

        let md = node_metadata(node, scope, system.start_path());
        for (key, value) in md.non_default_fields() {
            // Install state follows the entry's status
            if matches!(key, MetadataKey::Virtual | MetadataKey::Installed) {
                continue;
            }
            tree.cache_metadata(id, key, value);
        }

        if is_folder {
            report.folders += 1;
        } else {
            report.games += 1;
        }
    }

    for node in system.recovery().read_fragments(parent_size) {
        let NodeTarget::Entry(id, status) = entry_for_node(tree, system, &node, settings) else {
            continue;
        };
        if tree.get(id).is_some_and(|e| e.status() != &status)
            && let Err(e) = tree.set_status(id, status)
        {
            tracing::warn!("{}: cannot restore entry status: {}", system.name(), e);
            continue;
        }

        let Some(scope) = tree.get(id).map(|e| e.metadata().scope()) else {
            continue;
        };
        let incoming = node_metadata(&node, scope, system.start_path());
        if let Some(md) = tree.metadata_mut(id) {
            md.import_changes(&incoming);
            md.mark_changed();
        }
        report.replayed += 1;
    }

    tracing::info!(
        "{}: loaded {} games, {} folders ({} missing, {} recovered)",
        system.name(),
        report.games,
        report.folders,
        report.missing,
        report.replayed
    );
    report
}

/// Write a recovery fragment for one entry; failures are logged
pub(crate) fn write_recovery(tree: &CatalogTree, system: &System, id: EntryId) {
    let Some(entry) = tree.get(id) else { return };
    let Some(node) = node_for_entry(entry, system.start_path(), true) else {
        return;
    };
    let key = fragment_key(entry);
    let parent_size = document_size(system.gamelist_path());
    if let Err(e) = system.recovery().write_fragment(&key, parent_size, &node) {
        tracing::warn!("{}: failed to write recovery fragment: {}", system.name(), e);
    }
}

/// Key of an entry's recovery fragment and removal record
pub(crate) fn fragment_key(entry: &Entry) -> String {
    entry_key(entry.entry_type(), entry.lookup_key())
}

fn entry_key(kind: EntryType, key: String) -> String {
    match kind {
        EntryType::Folder => format!("folder:{}", key),
        EntryType::Game => key,
    }
}

/// Flush dirty entries of a system into its canonical gamelist
pub(crate) fn save_gamelist(
    tree: &mut CatalogTree,
    system: &mut System,
) -> Result<SaveReport, LibraryError> {
    let root = system.root();
    let mut dirty: Vec<(String, EntryId)> = tree
        .entries_of(system.id())
        .filter(|(id, e)| *id != root && e.metadata().was_changed())
        .map(|(id, e)| (e.path_string(), id))
        .collect();
    dirty.sort();

    if dirty.is_empty() && system.removed_keys().is_empty() {
        if let Err(e) = system.recovery().clear() {
            tracing::warn!("{}: failed to clear recovery log: {}", system.name(), e);
        }
        return Ok(SaveReport {
            unchanged: true,
            ..Default::default()
        });
    }

    let path = system.gamelist_path().to_path_buf();
    let mut doc = read_for_update(&path);
    let start_path = system.start_path().to_path_buf();

    let mut replaced: HashSet<(bool, String)> = HashSet::new();
    for (_, id) in &dirty {
        if let Some(entry) = tree.get(*id) {
            replaced.insert(node_key(entry.entry_type(), entry.lookup_key()));
        }
    }
    let removed_keys = system.removed_keys().clone();

    let before = doc.nodes.len();
    doc.nodes.retain(|node| {
        let kind = match node.kind {
            NodeKind::Game => EntryType::Game,
            NodeKind::Folder => EntryType::Folder,
            NodeKind::Other(_) => return true,
        };
        let Some(text) = node.path() else { return true };
        let key = resolve_path(text, &start_path).lookup_key();
        if removed_keys.contains(&entry_key(kind, key.clone())) {
            return false;
        }
        !replaced.contains(&node_key(kind, key))
    });
    let mut report = SaveReport {
        removed: before - doc.nodes.len(),
        ..Default::default()
    };

    for (_, id) in &dirty {
        let Some(entry) = tree.get(*id) else { continue };
        if let Some(node) = node_for_entry(entry, &start_path, false) {
            doc.nodes.push(node);
            report.written += 1;
        }
    }

    doc.write_atomic(&path)?;

    for (_, id) in &dirty {
        tree.reset_changed(*id);
    }
    system.forget_removed();
    if let Err(e) = system.recovery().clear() {
        tracing::warn!("{}: failed to clear recovery log: {}", system.name(), e);
    }

    tracing::info!(
        "{}: saved {} ({} written, {} replaced or removed)",
        system.name(),
        path.display(),
        report.written,
        report.removed
    );
    Ok(report)
}

/// Current document, or an empty one; an unreadable file is kept aside
fn read_for_update(path: &Path) -> GamelistDocument {
    if !path.exists() {
        return GamelistDocument::new();
    }
    match GamelistDocument::read(path) {
        Ok(doc) => doc,
        Err(e) => {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".corrupt");
            let backup = PathBuf::from(backup);
            tracing::error!(
                "Cannot parse {} ({}); keeping a copy at {}",
                path.display(),
                e,
                backup.display()
            );
            if let Err(e) = std::fs::copy(path, &backup) {
                tracing::warn!("Failed to back up {}: {}", path.display(), e);
            }
            GamelistDocument::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relativize() {
        let root = Path::new("/roms/nes");
        assert_eq!(relativize(Path::new("/roms/nes/a.nes"), root), "./a.nes");
        assert_eq!(relativize(Path::new("/roms/nes/sub/b.nes"), root), "./sub/b.nes");
        assert_eq!(relativize(Path::new("/other/c.nes"), root), "/other/c.nes");
    }

    #[test]
    fn test_resolve_path() {
        let root = Path::new("/roms/nes");
        assert_eq!(
            resolve_path("./sub/../a.nes", root),
            EntryStatus::physical("/roms/nes/a.nes")
        );
        assert_eq!(
            resolve_path("/abs/b.nes", root),
            EntryStatus::physical("/abs/b.nes")
        );
        assert!(resolve_path("steam:/installed/42", root).is_installed());
    }

    #[test]
    fn test_media_values_round_trip() {
        let root = Path::new("/roms/nes");
        let stored = absolutize_value("./images/a-image.png", root);
        assert_eq!(stored, "/roms/nes/images/a-image.png");
        assert_eq!(relativize_value(&stored, root), "./images/a-image.png");
        assert_eq!(
            relativize_value("https://example.com/a.png", root),
            "https://example.com/a.png"
        );
    }

    #[test]
    fn test_node_omits_default_name() {
        let mut tree = CatalogTree::new();
        let sys = crate::system::SystemId(0);
        let id = tree
            .create_game(sys, EntryStatus::physical("/roms/nes/mario.nes"))
            .unwrap();
        let root = Path::new("/roms/nes");

        tree.metadata_mut(id).unwrap().set(MetadataKey::Name, "mario");
        assert!(node_for_entry(tree.get(id).unwrap(), root, false).is_none());

        let forced = node_for_entry(tree.get(id).unwrap(), root, true).unwrap();
        assert_eq!(forced.path(), Some("./mario.nes"));
        assert_eq!(forced.fields.len(), 1);

        tree.metadata_mut(id).unwrap().set(MetadataKey::Favorite, "true");
        let node = node_for_entry(tree.get(id).unwrap(), root, false).unwrap();
        assert_eq!(node.fields[0].tag, "path");
        assert_eq!(node.field("favorite"), Some("true"));
        assert_eq!(node.field("name"), None);
    }
}
