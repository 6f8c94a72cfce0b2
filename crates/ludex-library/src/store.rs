//! Store back ends and entry classification
//!
//! Games from third-party stores have no file on disk. They are addressed by
//! a scheme-prefixed identifier (`epic:/installed/<id>`, `steam:/virtual/<id>`)
//! derived from an explicit [`EntryStatus`].

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Supported store back ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKind {
    Steam,
    Epic,
    Gog,
    Amazon,
    Ea,
    Xbox,
}

impl StoreKind {
    pub const ALL: &'static [StoreKind] = &[
        StoreKind::Steam,
        StoreKind::Epic,
        StoreKind::Gog,
        StoreKind::Amazon,
        StoreKind::Ea,
        StoreKind::Xbox,
    ];

    /// Path scheme, also used as the config name
    pub fn scheme(self) -> &'static str {
        match self {
            StoreKind::Steam => "steam",
            StoreKind::Epic => "epic",
            StoreKind::Gog => "gog",
            StoreKind::Amazon => "amazon",
            StoreKind::Ea => "ea",
            StoreKind::Xbox => "xbox",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            StoreKind::Steam => "Steam",
            StoreKind::Epic => "Epic Games Store",
            StoreKind::Gog => "GOG",
            StoreKind::Amazon => "Amazon Games",
            StoreKind::Ea => "EA app",
            StoreKind::Xbox => "Xbox",
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        StoreKind::ALL
            .iter()
            .copied()
            .find(|s| s.scheme().eq_ignore_ascii_case(scheme))
    }

    pub fn installed_prefix(self) -> String {
        format!("{}:/installed/", self.scheme())
    }

    pub fn virtual_prefix(self) -> String {
        format!("{}:/virtual/", self.scheme())
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A title in a store's catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreRef {
    pub store: StoreKind,
    pub id: String,
}

impl StoreRef {
    pub fn new(store: StoreKind, id: impl Into<String>) -> Self {
        Self {
            store,
            id: id.into(),
        }
    }
}

/// Where an entry lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// A file or directory on disk
    Physical(PathBuf),
    /// A store title installed locally
    Installed(StoreRef),
    /// A store title known from the catalog but not installed
    Virtual(StoreRef),
}

impl EntryStatus {
    pub fn physical(path: impl AsRef<Path>) -> Self {
        EntryStatus::Physical(normalize_path(path.as_ref()))
    }

    /// Classify a path string from a gamelist or scanner.
    ///
    /// Relative physical paths are returned as given; resolving them against
    /// a system root is the caller's job.
    pub fn parse(path: &str) -> Self {
        match parse_store_path(path) {
            Some((store_ref, true)) => EntryStatus::Installed(store_ref),
            Some((store_ref, false)) => EntryStatus::Virtual(store_ref),
            None => EntryStatus::Physical(PathBuf::from(path)),
        }
    }

    pub fn store_ref(&self) -> Option<&StoreRef> {
        match self {
            EntryStatus::Physical(_) => None,
            EntryStatus::Installed(r) | EntryStatus::Virtual(r) => Some(r),
        }
    }

    pub fn physical_path(&self) -> Option<&Path> {
        match self {
            EntryStatus::Physical(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, EntryStatus::Physical(_))
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, EntryStatus::Installed(_))
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, EntryStatus::Virtual(_))
    }

    /// Display/persistence form of the entry's location
    pub fn to_path_string(&self) -> String {
        match self {
            EntryStatus::Physical(p) => p.to_string_lossy().to_string(),
            EntryStatus::Installed(r) => format!("{}{}", r.store.installed_prefix(), r.id),
            EntryStatus::Virtual(r) => format!("{}{}", r.store.virtual_prefix(), r.id),
        }
    }

    /// Key identifying the entry within its system.
    ///
    /// Store titles keep the same key whether installed or virtual, so a
    /// reclassified entry still matches its previous gamelist node.
    pub fn lookup_key(&self) -> String {
        match self {
            EntryStatus::Physical(p) => normalize_path(p).to_string_lossy().to_string(),
            EntryStatus::Installed(r) | EntryStatus::Virtual(r) => {
                format!("{}:/{}", r.store.scheme(), r.id)
            }
        }
    }
}

/// Split `<scheme>:/installed/<id>` / `<scheme>:/virtual/<id>` into its parts.
///
/// Legacy `<scheme>:/<id>` identifiers are read as virtual titles.
pub fn parse_store_path(path: &str) -> Option<(StoreRef, bool)> {
    let (scheme, rest) = path.split_once(":/")?;
    let store = StoreKind::from_scheme(scheme)?;
    let rest = rest.trim_start_matches('/');

    let (installed, id) = if let Some(id) = rest.strip_prefix("installed/") {
        (true, id)
    } else if let Some(id) = rest.strip_prefix("virtual/") {
        (false, id)
    } else {
        (false, rest)
    };

    if id.is_empty() {
        return None;
    }
    Some((StoreRef::new(store, id), installed))
}

/// Lexically normalize a path: drop `.` components and fold `..`
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_store_paths() {
        let status = EntryStatus::parse("epic:/installed/Fortnite");
        assert!(status.is_installed());
        assert_eq!(status.store_ref().unwrap().id, "Fortnite");
        assert_eq!(status.store_ref().unwrap().store, StoreKind::Epic);

        let status = EntryStatus::parse("steam:/virtual/42");
        assert!(status.is_virtual());
        assert_eq!(status.to_path_string(), "steam:/virtual/42");

        let legacy = EntryStatus::parse("gog:/1207658924");
        assert!(legacy.is_virtual());

        let physical = EntryStatus::parse("./mario.gba");
        assert!(physical.is_physical());

        // Unknown schemes and Windows drive letters are physical
        assert!(EntryStatus::parse("C:/games/foo.exe").is_physical());
        assert!(EntryStatus::parse("unknown:/x").is_physical());
    }

    #[test]
    fn test_lookup_key_ignores_install_state() {
        let a = EntryStatus::Installed(StoreRef::new(StoreKind::Steam, "7"));
        let b = EntryStatus::Virtual(StoreRef::new(StoreKind::Steam, "7"));
        assert_eq!(a.lookup_key(), b.lookup_key());
        assert_ne!(a.to_path_string(), b.to_path_string());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/roms/nes/./sub/../mario.nes")),
            PathBuf::from("/roms/nes/mario.nes")
        );
        assert_eq!(
            EntryStatus::physical("/roms//nes/./a.nes").lookup_key(),
            "/roms/nes/a.nes"
        );
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(StoreKind::Epic.installed_prefix(), "epic:/installed/");
        assert_eq!(StoreKind::Xbox.virtual_prefix(), "xbox:/virtual/");
        assert_eq!(StoreKind::from_scheme("STEAM"), Some(StoreKind::Steam));
    }
}
