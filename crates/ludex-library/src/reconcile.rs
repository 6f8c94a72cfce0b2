//! Merge store scan results into a store system's tree
//!
//! Existing entries (usually loaded from the gamelist) are matched against
//! what the store reports as installed. Matches become installed, the rest
//! become virtual, and unmatched scan results are created as new games.

use crate::metadata::MetadataKey;
use crate::names::normalize_title;
use crate::store::{EntryStatus, StoreKind, StoreRef};
use crate::store_scanner::InstalledTitle;
use crate::system::SystemId;
use crate::tree::{CatalogTree, EntryId, EntryType, TypeMask};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// What one reconciliation run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Existing entries confirmed installed
    pub installed: usize,
    /// Existing entries that flipped to virtual
    pub virtualized: usize,
    /// New entries created from scan results
    pub created: usize,
    /// Title matches that collided with an earlier match
    pub ambiguous: usize,
    /// Entries whose status or metadata changed
    pub changed: Vec<EntryId>,
}

/// Reconcile the games below `root` with a fresh installation scan
pub fn reconcile(
    tree: &mut CatalogTree,
    system: SystemId,
    root: EntryId,
    store: StoreKind,
    scanned: Vec<InstalledTitle>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut consumed = vec![false; scanned.len()];

    let mut by_id: HashMap<&str, usize> = HashMap::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();
    for (i, title) in scanned.iter().enumerate() {
        match &title.store_id {
            Some(id) => {
                if by_id.insert(id.as_str(), i).is_some() {
                    tracing::warn!("{}: scan reported id '{}' twice", store, id);
                }
            }
            None => {
                let key = normalize_title(&title.title);
                if by_title.contains_key(&key) {
                    tracing::warn!(
                        "{}: several installed titles normalize to '{}', keeping the first",
                        store,
                        key
                    );
                    report.ambiguous += 1;
                } else {
                    by_title.insert(key, i);
                }
            }
        }
    }

    let existing: Vec<EntryId> = tree
        .files_recursive(root, TypeMask::GAME, None, true)
        .collect();

    for id in existing {
        let Some(entry) = tree.get(id) else { continue };
        let Some(store_id) = entry_store_id(entry.metadata().get(MetadataKey::StoreId), entry.status(), store)
        else {
            continue;
        };

        let matched = by_id
            .get(store_id.as_str())
            .copied()
            .filter(|i| !consumed[*i])
            .or_else(|| {
                let key = normalize_title(&entry.display_name());
                let index = by_title.get(&key).copied()?;
                if consumed[index] {
                    tracing::warn!(
                        "{}: '{}' matches an installed title already claimed by another entry",
                        store,
                        entry.display_name()
                    );
                    return None;
                }
                Some(index)
            });

        let store_ref = StoreRef::new(store, store_id);
        match matched {
            Some(index) => {
                consumed[index] = true;
                if apply_installed(tree, id, store_ref, &scanned[index]) {
                    report.changed.push(id);
                }
                report.installed += 1;
            }
            None => {
                let flipped = match tree.set_status(id, EntryStatus::Virtual(store_ref)) {
                    Ok(flipped) => flipped,
                    Err(e) => {
                        tracing::warn!("{}: cannot mark entry virtual: {}", store, e);
                        continue;
                    }
                };
                // A title that is not installed has nothing to run
                let cleared = tree
                    .metadata_mut(id)
                    .is_some_and(|md| md.set(MetadataKey::Launch, ""));
                if flipped {
                    report.virtualized += 1;
                }
                if flipped || cleared {
                    report.changed.push(id);
                }
            }
        }
    }

    // Leftovers are new installs; ordered by id so repeated runs agree
    let leftovers: BTreeMap<String, usize> = scanned
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed[*i])
        .map(|(i, t)| {
            let id = t
                .store_id
                .clone()
                .unwrap_or_else(|| normalize_title(&t.title));
            (id, i)
        })
        .collect();

    for (store_id, index) in leftovers {
        if store_id.is_empty() {
            continue;
        }
        let status = EntryStatus::Installed(StoreRef::new(store, &store_id));
        let Some(id) = tree.find_or_create_file(system, root, Path::new(""), status.clone(), EntryType::Game)
        else {
            continue;
        };
        apply_installed(tree, id, StoreRef::new(store, store_id), &scanned[index]);
        report.changed.push(id);
        report.created += 1;
    }

    tracing::info!(
        "{}: {} installed, {} now virtual, {} new",
        store,
        report.installed,
        report.virtualized,
        report.created
    );
    report
}

/// Store id of an entry: explicit metadata first, else its status
fn entry_store_id(metadata_id: &str, status: &EntryStatus, store: StoreKind) -> Option<String> {
    match status.store_ref() {
        Some(r) if r.store != store => None,
        Some(r) if metadata_id.is_empty() => Some(r.id.clone()),
        Some(_) => Some(metadata_id.to_string()),
        None => None,
    }
}

/// Mark an entry installed and refresh it from the scan; true if anything changed
fn apply_installed(
    tree: &mut CatalogTree,
    id: EntryId,
    store_ref: StoreRef,
    title: &InstalledTitle,
) -> bool {
    let mut changed = match tree.set_status(id, EntryStatus::Installed(store_ref)) {
        Ok(changed) => changed,
        Err(e) => {
            tracing::warn!("Cannot mark '{}' installed: {}", title.title, e);
            return false;
        }
    };

    let Some(md) = tree.metadata_mut(id) else {
        return changed;
    };
    if !title.title.is_empty() {
        changed |= md.set(MetadataKey::Name, &title.title);
    }
    if let Some(launch) = &title.launch_command {
        changed |= md.set(MetadataKey::Launch, launch);
    }
    if let Some(ns) = &title.namespace {
        changed |= md.set(MetadataKey::StoreNamespace, ns);
    }
    if let Some(catalog) = &title.catalog_id {
        changed |= md.set(MetadataKey::StoreCatalogId, catalog);
    }
    changed
}
