//! Catalog tree: an arena of games and folders
//!
//! Entries are addressed by generational [`EntryId`] handles. Folders hold
//! child handles, every entry holds its parent handle. A folder either owns
//! its children (a system's real hierarchy) or merely references them
//! (collections over entries owned elsewhere); destroying a non-owning
//! folder never destroys its children.

use crate::filter::FilterContext;
use crate::metadata::{MetadataKey, MetadataScope, MetadataStore};
use crate::store::{EntryStatus, normalize_path};
use crate::system::SystemId;
use crate::LibraryError;
use std::collections::HashMap;
use std::path::Path;

/// Stable handle to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    index: u32,
    generation: u32,
}

/// Entry kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Game,
    Folder,
}

/// Set of entry types accepted by a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMask(u8);

impl TypeMask {
    pub const GAME: TypeMask = TypeMask(0b01);
    pub const FOLDER: TypeMask = TypeMask(0b10);
    pub const ALL: TypeMask = TypeMask(0b11);

    pub fn contains(self, entry_type: EntryType) -> bool {
        let bit = match entry_type {
            EntryType::Game => Self::GAME.0,
            EntryType::Folder => Self::FOLDER.0,
        };
        self.0 & bit != 0
    }
}

impl std::ops::BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FolderData {
    children: Vec<EntryId>,
    owns_children: bool,
    virtual_storage: bool,
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    Game,
    Folder(FolderData),
}

/// A game or folder
#[derive(Debug, Clone)]
pub struct Entry {
    system: SystemId,
    kind: EntryKind,
    status: EntryStatus,
    parent: Option<EntryId>,
    metadata: MetadataStore,
}

impl Entry {
    pub fn system(&self) -> SystemId {
        self.system
    }

    pub fn entry_type(&self) -> EntryType {
        match self.kind {
            EntryKind::Game => EntryType::Game,
            EntryKind::Folder(_) => EntryType::Folder,
        }
    }

    pub fn is_game(&self) -> bool {
        matches!(self.kind, EntryKind::Game)
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, EntryKind::Folder(_))
    }

    pub fn status(&self) -> &EntryStatus {
        &self.status
    }

    pub fn path_string(&self) -> String {
        self.status.to_path_string()
    }

    pub fn physical_path(&self) -> Option<&Path> {
        self.status.physical_path()
    }

    pub fn lookup_key(&self) -> String {
        self.status.lookup_key()
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn children(&self) -> &[EntryId] {
        match &self.kind {
            EntryKind::Folder(f) => &f.children,
            EntryKind::Game => &[],
        }
    }

    pub fn owns_children(&self) -> bool {
        matches!(&self.kind, EntryKind::Folder(f) if f.owns_children)
    }

    pub fn is_virtual_storage(&self) -> bool {
        matches!(&self.kind, EntryKind::Folder(f) if f.virtual_storage)
    }

    /// File name without extension; the store id for store titles
    pub fn stem(&self) -> String {
        match &self.status {
            EntryStatus::Physical(p) => {
                if self.is_folder() {
                    p.file_name()
                } else {
                    p.file_stem()
                }
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
            }
            EntryStatus::Installed(r) | EntryStatus::Virtual(r) => r.id.clone(),
        }
    }

    /// Lowercase file extension of a physical game
    pub fn extension(&self) -> Option<String> {
        if !self.is_game() {
            return None;
        }
        self.physical_path()
            .and_then(|p| p.extension())
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Name shown when the name field is empty
    pub fn default_name(&self) -> String {
        self.stem()
    }

    /// Explicit name, else the default name
    pub fn display_name(&self) -> String {
        let name = self.metadata.get(MetadataKey::Name);
        if name.is_empty() {
            self.default_name()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Arena holding every entry of every system
#[derive(Debug, Default)]
pub struct CatalogTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    keys: HashMap<(SystemId, String), EntryId>,
    revisions: HashMap<SystemId, u64>,
}

impl CatalogTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_ref())
    }

    fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.entry.as_mut())
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change counter for a system's entries; bumped on every mutation
    pub fn revision(&self, system: SystemId) -> u64 {
        self.revisions.get(&system).copied().unwrap_or(0)
    }

    fn touch(&mut self, system: SystemId) {
        *self.revisions.entry(system).or_insert(0) += 1;
    }

    fn insert(&mut self, entry: Entry) -> EntryId {
        let system = entry.system;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                EntryId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                EntryId {
                    index,
                    generation: 0,
                }
            }
        };
        self.touch(system);
        id
    }

    /// Create a detached folder
    pub fn create_folder(
        &mut self,
        system: SystemId,
        path: impl AsRef<Path>,
        owns_children: bool,
        virtual_storage: bool,
    ) -> EntryId {
        self.insert(Entry {
            system,
            kind: EntryKind::Folder(FolderData {
                children: Vec::new(),
                owns_children,
                virtual_storage,
            }),
            status: EntryStatus::physical(path),
            parent: None,
            metadata: MetadataStore::new(MetadataScope::Folder),
        })
    }

    /// Create a detached game; fails if the system already has one at this path
    pub fn create_game(
        &mut self,
        system: SystemId,
        status: EntryStatus,
    ) -> Result<EntryId, LibraryError> {
        let status = match status {
            EntryStatus::Physical(p) => EntryStatus::physical(p),
            other => other,
        };
        let key = (system, status.lookup_key());
        if self.keys.contains_key(&key) {
            return Err(LibraryError::DuplicateEntry(key.1));
        }

        let mut metadata = MetadataStore::new(MetadataScope::Game);
        sync_store_fields(&mut metadata, &status, false);

        let id = self.insert(Entry {
            system,
            kind: EntryKind::Game,
            status,
            parent: None,
            metadata,
        });
        self.keys.insert(key, id);
        Ok(id)
    }

    /// Game registered under `key` in `system`
    pub fn lookup(&self, system: SystemId, key: &str) -> Option<EntryId> {
        self.keys
            .get(&(system, key.to_string()))
            .copied()
            .filter(|id| self.contains(*id))
    }

    /// Append `child` to `folder`.
    ///
    /// With `assign_parent` the child's parent handle is set; this is refused
    /// when the child already belongs to another folder.
    pub fn add_child(&mut self, folder: EntryId, child: EntryId, assign_parent: bool) -> bool {
        let Some(child_entry) = self.get(child) else {
            tracing::error!("add_child: unknown child {:?}", child);
            return false;
        };
        if assign_parent
            && let Some(existing) = child_entry.parent
            && existing != folder
        {
            tracing::error!(
                "add_child: '{}' already has a parent",
                child_entry.path_string()
            );
            return false;
        }

        let Some(folder_entry) = self.get_mut(folder) else {
            tracing::error!("add_child: unknown folder {:?}", folder);
            return false;
        };
        let system = folder_entry.system;
        let EntryKind::Folder(data) = &mut folder_entry.kind else {
            tracing::error!("add_child: target is not a folder");
            return false;
        };
        if data.children.contains(&child) {
            tracing::warn!("add_child: entry is already a child of this folder");
            return false;
        }
        data.children.push(child);

        if assign_parent && let Some(child_entry) = self.get_mut(child) {
            child_entry.parent = Some(folder);
        }
        self.touch(system);
        true
    }

    /// Detach `child` from `folder`. Sibling order is not preserved.
    pub fn remove_child(&mut self, folder: EntryId, child: EntryId) {
        let Some(folder_entry) = self.get_mut(folder) else {
            tracing::error!("remove_child: unknown folder {:?}", folder);
            return;
        };
        let system = folder_entry.system;
        let position = match &mut folder_entry.kind {
            EntryKind::Folder(data) => data.children.iter().position(|c| *c == child),
            EntryKind::Game => None,
        };

        let Some(position) = position else {
            tracing::error!("remove_child: entry {:?} is not a child of {:?}", child, folder);
            debug_assert!(false, "remove_child called with a non-child");
            return;
        };

        if let EntryKind::Folder(data) = &mut folder_entry.kind {
            data.children.swap_remove(position);
        }

        if let Some(child_entry) = self.get_mut(child)
            && child_entry.parent == Some(folder)
        {
            child_entry.parent = None;
        }
        self.touch(system);
    }

    /// Empty a folder; owned children are destroyed
    pub fn clear(&mut self, folder: EntryId) {
        let Some(folder_entry) = self.get_mut(folder) else {
            return;
        };
        let system = folder_entry.system;
        let (children, owns) = match &mut folder_entry.kind {
            EntryKind::Folder(data) => (std::mem::take(&mut data.children), data.owns_children),
            EntryKind::Game => return,
        };

        for child in children {
            // Null the parent first so destroy does not detach again
            if let Some(entry) = self.get_mut(child)
                && (owns || entry.parent == Some(folder))
            {
                entry.parent = None;
            }
            if owns {
                self.destroy(child);
            }
        }
        self.touch(system);
    }

    /// Detach an entry from its parent and free it (and owned descendants)
    pub fn destroy(&mut self, id: EntryId) {
        let Some(entry) = self.get(id) else {
            return;
        };
        let parent = entry.parent;
        let system = entry.system;
        let key = entry.is_game().then(|| entry.lookup_key());

        if entry.is_folder() {
            self.clear(id);
        }
        if let Some(parent) = parent {
            self.remove_child(parent, id);
        }
        if let Some(key) = key
            && self.keys.get(&(system, key.clone())) == Some(&id)
        {
            self.keys.remove(&(system, key));
        }

        let slot = &mut self.slots[id.index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.touch(system);
    }

    /// Metadata access for mutation; counts as a change to the system
    pub fn metadata_mut(&mut self, id: EntryId) -> Option<&mut MetadataStore> {
        let system = self.get(id)?.system;
        self.touch(system);
        self.get_mut(id).map(|e| &mut e.metadata)
    }

    /// Store a value without dirtying the entry or counting as a change
    pub fn cache_metadata(&mut self, id: EntryId, key: MetadataKey, value: &str) {
        if let Some(entry) = self.get_mut(id) {
            entry.metadata.set_quiet(key, value);
        }
    }

    /// Clear the dirty flag without counting as a change
    pub fn reset_changed(&mut self, id: EntryId) {
        if let Some(entry) = self.get_mut(id) {
            entry.metadata.reset_changed_flag();
        }
    }

    /// Reclassify a game (installed <-> virtual, or a path rewrite).
    ///
    /// The status, the key index and the store metadata fields change
    /// together. Returns whether anything changed.
    pub fn set_status(&mut self, id: EntryId, status: EntryStatus) -> Result<bool, LibraryError> {
        let Some(entry) = self.get(id) else {
            return Err(LibraryError::EntryNotFound(format!("{:?}", id)));
        };
        let status = match status {
            EntryStatus::Physical(p) => EntryStatus::physical(p),
            other => other,
        };
        if entry.status == status {
            return Ok(false);
        }

        let system = entry.system;
        let is_game = entry.is_game();
        let old_key = entry.lookup_key();
        let new_key = status.lookup_key();

        if is_game && old_key != new_key {
            if let Some(other) = self.lookup(system, &new_key)
                && other != id
            {
                return Err(LibraryError::DuplicateEntry(new_key));
            }
            self.keys.remove(&(system, old_key));
            self.keys.insert((system, new_key), id);
        }

        if let Some(entry) = self.get_mut(id) {
            if is_game {
                sync_store_fields(&mut entry.metadata, &status, true);
            }
            entry.status = status;
        }
        self.touch(system);
        Ok(true)
    }

    /// Depth-first search for an exact path match below `folder`
    pub fn find_by_path(&self, folder: EntryId, path: &str) -> Option<EntryId> {
        for child in self.get(folder)?.children() {
            let Some(entry) = self.get(*child) else {
                continue;
            };
            if entry.path_string() == path {
                return Some(*child);
            }
            if entry.is_folder()
                && let Some(found) = self.find_by_path(*child, path)
            {
                return Some(found);
            }
        }
        None
    }

    /// Direct child folder of `folder` with the given path
    fn child_folder(&self, folder: EntryId, path: &Path) -> Option<EntryId> {
        self.get(folder)?.children().iter().copied().find(|c| {
            self.get(*c)
                .is_some_and(|e| e.is_folder() && e.physical_path() == Some(path))
        })
    }

    /// Locate an entry by location, creating it (and missing intermediate
    /// folders) under `root` when absent.
    ///
    /// Physical paths must lie below `start_path`; store titles are placed
    /// directly under the root.
    pub fn find_or_create_file(
        &mut self,
        system: SystemId,
        root: EntryId,
        start_path: &Path,
        status: EntryStatus,
        entry_type: EntryType,
    ) -> Option<EntryId> {
        let path = match status {
            EntryStatus::Physical(p) => normalize_path(&p),
            store_status => {
                if entry_type == EntryType::Folder {
                    tracing::warn!(
                        "Store identifier '{}' cannot be a folder",
                        store_status.to_path_string()
                    );
                    return None;
                }
                let key = store_status.lookup_key();
                if let Some(existing) = self.lookup(system, &key) {
                    return Some(existing);
                }
                let id = self.create_game(system, store_status).ok()?;
                self.add_child(root, id, true);
                return Some(id);
            }
        };

        let start_path = normalize_path(start_path);
        let Ok(relative) = path.strip_prefix(&start_path) else {
            tracing::warn!(
                "'{}' is outside of the system root '{}'",
                path.display(),
                start_path.display()
            );
            return None;
        };

        if entry_type == EntryType::Game
            && let Some(existing) = self.lookup(system, &path.to_string_lossy())
        {
            return Some(existing);
        }

        let components: Vec<_> = relative.components().collect();
        if components.is_empty() {
            return (entry_type == EntryType::Folder).then_some(root);
        }

        let mut folder = root;
        let mut current = start_path.clone();
        for component in &components[..components.len() - 1] {
            current.push(component.as_os_str());
            folder = match self.child_folder(folder, &current) {
                Some(existing) => existing,
                None => {
                    let created = self.create_folder(system, &current, true, false);
                    self.add_child(folder, created, true);
                    created
                }
            };
        }

        match entry_type {
            EntryType::Folder => {
                if let Some(existing) = self.child_folder(folder, &path) {
                    return Some(existing);
                }
                let created = self.create_folder(system, &path, true, false);
                self.add_child(folder, created, true);
                Some(created)
            }
            EntryType::Game => {
                let created = self
                    .create_game(system, EntryStatus::Physical(path))
                    .ok()?;
                self.add_child(folder, created, true);
                Some(created)
            }
        }
    }

    /// Lazily walk the subtree below `folder` in pre-order
    pub fn files_recursive<'a>(
        &'a self,
        folder: EntryId,
        mask: TypeMask,
        filter: Option<FilterContext<'a>>,
        include_virtual_storage: bool,
    ) -> FilesRecursive<'a> {
        FilesRecursive {
            tree: self,
            start: folder,
            stack: vec![(folder, 0)],
            mask,
            filter,
            include_virtual_storage,
        }
    }

    /// Every live entry belonging to `system`
    pub fn entries_of(&self, system: SystemId) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            let entry = slot.entry.as_ref()?;
            (entry.system == system).then_some((
                EntryId {
                    index: index as u32,
                    generation: slot.generation,
                },
                entry,
            ))
        })
    }

    /// Parent/child links agree in both directions for every owned entry
    pub fn check_integrity(&self) -> bool {
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(entry) = &slot.entry else { continue };
            let id = EntryId {
                index: index as u32,
                generation: slot.generation,
            };
            if let Some(parent) = entry.parent {
                let Some(parent_entry) = self.get(parent) else {
                    return false;
                };
                if parent_entry.children().iter().filter(|c| **c == id).count() != 1 {
                    return false;
                }
            }
            if entry.owns_children() {
                for child in entry.children() {
                    if self.get(*child).and_then(|c| c.parent) != Some(id) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

fn sync_store_fields(metadata: &mut MetadataStore, status: &EntryStatus, mark: bool) {
    let Some(store_ref) = status.store_ref() else {
        return;
    };
    let fields = [
        (MetadataKey::StoreId, store_ref.id.as_str()),
        (MetadataKey::Installed, if status.is_installed() { "true" } else { "false" }),
        (MetadataKey::Virtual, if status.is_virtual() { "true" } else { "false" }),
    ];
    for (key, value) in fields {
        if mark {
            metadata.set(key, value);
        } else {
            metadata.set_quiet(key, value);
        }
    }
}

/// Pre-order traversal produced by [`CatalogTree::files_recursive`].
///
/// Cloning yields an independent cursor; [`FilesRecursive::restart`] rewinds.
#[derive(Clone)]
pub struct FilesRecursive<'a> {
    tree: &'a CatalogTree,
    start: EntryId,
    stack: Vec<(EntryId, usize)>,
    mask: TypeMask,
    filter: Option<FilterContext<'a>>,
    include_virtual_storage: bool,
}

impl FilesRecursive<'_> {
    pub fn restart(&mut self) {
        self.stack.clear();
        self.stack.push((self.start, 0));
    }
}

impl Iterator for FilesRecursive<'_> {
    type Item = EntryId;

    fn next(&mut self) -> Option<EntryId> {
        loop {
            let (folder, index) = self.stack.last_mut()?;
            let Some(&child) = self
                .tree
                .get(*folder)
                .and_then(|f| f.children().get(*index))
            else {
                self.stack.pop();
                continue;
            };
            *index += 1;

            // Collections may still reference destroyed entries
            let Some(entry) = self.tree.get(child) else {
                continue;
            };

            let displayed = self
                .filter
                .as_ref()
                .is_none_or(|f| f.is_displayed(child, entry));

            match entry.entry_type() {
                EntryType::Folder => {
                    if !displayed {
                        continue;
                    }
                    self.stack.push((child, 0));
                    if self.mask.contains(EntryType::Folder)
                        && (self.include_virtual_storage || !entry.is_virtual_storage())
                    {
                        return Some(child);
                    }
                }
                EntryType::Game => {
                    if displayed && self.mask.contains(EntryType::Game) {
                        return Some(child);
                    }
                }
            }
        }
    }
}
