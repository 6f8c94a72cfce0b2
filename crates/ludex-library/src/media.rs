//! Media path resolution
//!
//! Lookup order for each kind: explicit metadata value, a file named
//! `<stem>-<suffix>.<ext>` next to the game, the same name in the kind's
//! media subdirectory, then the system placeholder for the game's extension.

use crate::metadata::MetadataKey;
use crate::tree::Entry;
use ludex_config::SystemConfig;
use std::path::{Path, PathBuf};

/// Kinds of artwork and documents attached to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Thumbnail,
    Video,
    Marquee,
    Fanart,
    Manual,
    TitleShot,
    Bezel,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

impl MediaKind {
    pub const ALL: &'static [MediaKind] = &[
        MediaKind::Image,
        MediaKind::Thumbnail,
        MediaKind::Video,
        MediaKind::Marquee,
        MediaKind::Fanart,
        MediaKind::Manual,
        MediaKind::TitleShot,
        MediaKind::Bezel,
    ];

    pub fn key(self) -> MetadataKey {
        match self {
            MediaKind::Image => MetadataKey::Image,
            MediaKind::Thumbnail => MetadataKey::Thumbnail,
            MediaKind::Video => MetadataKey::Video,
            MediaKind::Marquee => MetadataKey::Marquee,
            MediaKind::Fanart => MetadataKey::Fanart,
            MediaKind::Manual => MetadataKey::Manual,
            MediaKind::TitleShot => MetadataKey::TitleShot,
            MediaKind::Bezel => MetadataKey::Bezel,
        }
    }

    /// File name suffix (`mario-thumb.png`)
    pub fn suffix(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Thumbnail => "thumb",
            MediaKind::Video => "video",
            MediaKind::Marquee => "marquee",
            MediaKind::Fanart => "fanart",
            MediaKind::Manual => "manual",
            MediaKind::TitleShot => "titleshot",
            MediaKind::Bezel => "bezel",
        }
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Video => &["mp4"],
            MediaKind::Manual => &["pdf"],
            _ => IMAGE_EXTENSIONS,
        }
    }

    /// Conventional media subdirectory of a system
    pub fn subdir(self) -> &'static str {
        match self {
            MediaKind::Video => "videos",
            MediaKind::Manual => "manuals",
            _ => "images",
        }
    }

    /// Kinds whose discovered path is stored back into metadata
    pub fn caches_discovery(self) -> bool {
        matches!(
            self,
            MediaKind::Image | MediaKind::Thumbnail | MediaKind::Video
        )
    }

    fn uses_placeholder(self) -> bool {
        matches!(self, MediaKind::Image | MediaKind::Thumbnail)
    }
}

/// Where a resolved media path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Metadata,
    Discovered,
    Placeholder,
}

/// Resolves media paths for one system's entries
pub struct MediaResolver<'a> {
    config: &'a SystemConfig,
}

impl<'a> MediaResolver<'a> {
    pub fn new(config: &'a SystemConfig) -> Self {
        Self { config }
    }

    /// First successful step of the lookup chain
    pub fn resolve(&self, entry: &Entry, kind: MediaKind) -> Option<(String, MediaSource)> {
        let explicit = entry.metadata().get(kind.key());
        if !explicit.is_empty() && (is_url(explicit) || Path::new(explicit).exists()) {
            return Some((explicit.to_string(), MediaSource::Metadata));
        }

        if let Some(found) = self.discover(entry, kind) {
            return Some((found.to_string_lossy().to_string(), MediaSource::Discovered));
        }

        if kind.uses_placeholder()
            && let Some(ext) = entry.extension()
            && let Some(placeholder) = self.config.placeholders.get(&ext)
        {
            return Some((
                placeholder.to_string_lossy().to_string(),
                MediaSource::Placeholder,
            ));
        }

        None
    }

    /// Probe the conventional file names on disk
    pub fn discover(&self, entry: &Entry, kind: MediaKind) -> Option<PathBuf> {
        let path = entry.physical_path()?;
        let dir = path.parent()?;
        let stem = entry.stem();
        if stem.is_empty() {
            return None;
        }

        let candidates = [dir.to_path_buf(), dir.join(kind.subdir())];
        for base in &candidates {
            for ext in kind.extensions() {
                let candidate = base.join(format!("{}-{}.{}", stem, kind.suffix(), ext));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntryStatus, StoreKind, StoreRef};
    use crate::system::SystemId;
    use crate::tree::CatalogTree;
    use tempfile::TempDir;

    const SYS: SystemId = SystemId(0);

    struct TestEnv {
        temp_dir: TempDir,
        tree: CatalogTree,
        config: SystemConfig,
    }

    impl TestEnv {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let config = SystemConfig::new("nes", temp_dir.path()).with_extensions(&["nes", "pdf"]);
            Self {
                temp_dir,
                tree: CatalogTree::new(),
                config,
            }
        }

        fn touch(&self, rel: &str) -> PathBuf {
            let path = self.temp_dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"x").unwrap();
            path
        }

        fn game(&mut self, rel: &str) -> crate::tree::EntryId {
            let path = self.touch(rel);
            self.tree.create_game(SYS, EntryStatus::physical(path)).unwrap()
        }
    }

    #[test]
    fn test_explicit_metadata_wins() {
        let mut env = TestEnv::new();
        let id = env.game("mario.nes");
        let art = env.touch("art/box.png");
        env.touch("mario-image.png");
        env.tree
            .metadata_mut(id)
            .unwrap()
            .set(MetadataKey::Image, &art.to_string_lossy());

        let resolver = MediaResolver::new(&env.config);
        let (path, source) = resolver.resolve(env.tree.get(id).unwrap(), MediaKind::Image).unwrap();
        assert_eq!(path, art.to_string_lossy());
        assert_eq!(source, MediaSource::Metadata);
    }

    #[test]
    fn test_missing_explicit_file_falls_through() {
        let mut env = TestEnv::new();
        let id = env.game("mario.nes");
        let sibling = env.touch("mario-image.jpg");
        env.tree
            .metadata_mut(id)
            .unwrap()
            .set(MetadataKey::Image, "/nowhere/box.png");

        let resolver = MediaResolver::new(&env.config);
        let (path, source) = resolver.resolve(env.tree.get(id).unwrap(), MediaKind::Image).unwrap();
        assert_eq!(path, sibling.to_string_lossy());
        assert_eq!(source, MediaSource::Discovered);
    }

    #[test]
    fn test_media_subdirectories() {
        let mut env = TestEnv::new();
        let id = env.game("zelda.nes");
        let video = env.touch("videos/zelda-video.mp4");
        let manual = env.touch("manuals/zelda-manual.pdf");

        let resolver = MediaResolver::new(&env.config);
        let entry = env.tree.get(id).unwrap();
        assert_eq!(resolver.discover(entry, MediaKind::Video), Some(video));
        assert_eq!(resolver.discover(entry, MediaKind::Manual), Some(manual));
        assert_eq!(resolver.discover(entry, MediaKind::Marquee), None);
    }

    #[test]
    fn test_placeholder_by_extension() {
        let mut env = TestEnv::new();
        env.config
            .placeholders
            .insert("pdf".to_string(), PathBuf::from("/usr/share/ludex/pdf.png"));
        let id = env.game("guide.pdf");

        let resolver = MediaResolver::new(&env.config);
        let entry = env.tree.get(id).unwrap();
        let (path, source) = resolver.resolve(entry, MediaKind::Thumbnail).unwrap();
        assert_eq!(path, "/usr/share/ludex/pdf.png");
        assert_eq!(source, MediaSource::Placeholder);
        assert!(resolver.resolve(entry, MediaKind::Video).is_none());
    }

    #[test]
    fn test_store_titles_have_no_local_media() {
        let mut env = TestEnv::new();
        let id = env
            .tree
            .create_game(SYS, EntryStatus::Virtual(StoreRef::new(StoreKind::Gog, "1")))
            .unwrap();
        let resolver = MediaResolver::new(&env.config);
        assert!(resolver.resolve(env.tree.get(id).unwrap(), MediaKind::Image).is_none());

        env.tree
            .metadata_mut(id)
            .unwrap()
            .set(MetadataKey::Image, "https://cdn.example.com/cover.jpg");
        let (path, _) = resolver.resolve(env.tree.get(id).unwrap(), MediaKind::Image).unwrap();
        assert!(path.starts_with("https://"));
    }
}
