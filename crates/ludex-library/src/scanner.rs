//! Directory scanning for physical systems

use crate::LibraryError;
use crate::store::EntryStatus;
use crate::system::SystemId;
use crate::tree::{CatalogTree, EntryId, EntryType};
use ludex_config::SystemConfig;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Result of a directory scan
#[derive(Debug, Default)]
pub struct ScanResult {
    pub games_found: usize,
    pub games_added: usize,
    pub folders_added: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to scan (lowercase, without dot)
    pub extensions: HashSet<String>,

    /// Directories to skip
    pub skip_dirs: HashSet<String>,

    /// Scan subdirectories
    pub recursive: bool,

    /// Skip hidden files/directories
    pub skip_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let mut skip_dirs = HashSet::new();
        for dir in [
            "bios",
            "saves",
            "states",
            "screenshots",
            "images",
            "videos",
            "manuals",
            "media",
            "downloaded_media",
        ] {
            skip_dirs.insert(dir.to_string());
        }

        Self {
            extensions: HashSet::new(),
            skip_dirs,
            recursive: true,
            skip_hidden: true,
        }
    }
}

impl ScanConfig {
    /// Scan settings for a system's accepted extensions
    pub fn for_system(config: &SystemConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            ..Default::default()
        }
    }
}

/// Populates a system's subtree from its start directory
pub struct DirectoryScanner {
    config: ScanConfig,
}

impl DirectoryScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn for_system(config: &SystemConfig) -> Self {
        Self::new(ScanConfig::for_system(config))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan `start_path` and add every accepted file below `root`.
    ///
    /// Folders are only created for directories that contain games.
    pub fn scan(
        &self,
        tree: &mut CatalogTree,
        system: SystemId,
        root: EntryId,
        start_path: &Path,
    ) -> Result<ScanResult, LibraryError> {
        let started = Instant::now();
        if !start_path.is_dir() {
            return Err(LibraryError::PathNotFound(start_path.to_path_buf()));
        }

        let mut result = ScanResult::default();
        let mut files = Vec::new();
        let mut visited = HashSet::new();
        self.scan_dir(start_path, &mut files, &mut visited, &mut result);
        result.games_found = files.len();

        let before = tree.len();
        for file in files {
            let existed = tree.lookup(system, &EntryStatus::physical(&file).lookup_key());
            match tree.find_or_create_file(
                system,
                root,
                start_path,
                EntryStatus::Physical(file.clone()),
                EntryType::Game,
            ) {
                Some(_) if existed.is_none() => result.games_added += 1,
                Some(_) => {}
                None => result
                    .errors
                    .push(format!("could not add {}", file.display())),
            }
        }
        result.folders_added = (tree.len() - before).saturating_sub(result.games_added);
        result.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            "Scanned {}: {} games found, {} added in {}ms",
            start_path.display(),
            result.games_found,
            result.games_added,
            result.duration_ms
        );
        Ok(result)
    }

    /// Recursively collect accepted files, sorted per directory
    fn scan_dir(
        &self,
        path: &Path,
        files: &mut Vec<PathBuf>,
        visited: &mut HashSet<PathBuf>,
        result: &mut ScanResult,
    ) {
        // Symlinked directories can loop back on themselves
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !visited.insert(canonical) {
            return;
        }

        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                result.errors.push(format!("{}: {}", path.display(), e));
                return;
            }
        };
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        paths.sort();

        for entry_path in paths {
            let name = entry_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            // Skip hidden files/directories
            if self.config.skip_hidden && name.starts_with('.') {
                continue;
            }

            if entry_path.is_dir() {
                // A directory named like a game file (e.g. "game.ps3") is a game
                if self.accepts(&entry_path) {
                    files.push(entry_path);
                    continue;
                }
                if self.config.skip_dirs.contains(&name.to_lowercase()) {
                    continue;
                }
                if self.config.recursive {
                    self.scan_dir(&entry_path, files, visited, result);
                }
            } else if entry_path.is_file() && self.accepts(&entry_path) {
                files.push(entry_path);
            }
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.config.extensions.contains(&ext.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SYS: SystemId = SystemId(0);

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"rom").unwrap();
    }

    fn scanner() -> DirectoryScanner {
        let config = SystemConfig::new("gba", "/unused").with_extensions(&["gba", "zip"]);
        DirectoryScanner::for_system(&config)
    }

    #[test]
    fn test_scan_creates_games_and_folders() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.gba");
        touch(dir.path(), "B.ZIP");
        touch(dir.path(), "readme.txt");
        touch(dir.path(), "hacks/c.gba");
        touch(dir.path(), "empty/notes.txt");
        touch(dir.path(), "images/a-image.png");
        touch(dir.path(), ".hidden/d.gba");

        let mut tree = CatalogTree::new();
        let root = tree.create_folder(SYS, dir.path(), true, false);
        let result = scanner().scan(&mut tree, SYS, root, dir.path()).unwrap();

        assert_eq!(result.games_found, 3);
        assert_eq!(result.games_added, 3);
        assert_eq!(result.folders_added, 1);
        assert!(result.errors.is_empty());
        assert!(tree.check_integrity());
    }

    #[test]
    fn test_rescan_adds_nothing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.gba");
        touch(dir.path(), "sub/b.gba");

        let mut tree = CatalogTree::new();
        let root = tree.create_folder(SYS, dir.path(), true, false);
        let scanner = scanner();
        scanner.scan(&mut tree, SYS, root, dir.path()).unwrap();
        let count = tree.len();

        let again = scanner.scan(&mut tree, SYS, root, dir.path()).unwrap();
        assert_eq!(again.games_found, 2);
        assert_eq!(again.games_added, 0);
        assert_eq!(again.folders_added, 0);
        assert_eq!(tree.len(), count);
    }

    #[test]
    fn test_missing_start_path() {
        let mut tree = CatalogTree::new();
        let root = tree.create_folder(SYS, "/nonexistent", true, false);
        let result = scanner().scan(&mut tree, SYS, root, Path::new("/nonexistent/ludex"));
        assert!(matches!(result, Err(LibraryError::PathNotFound(_))));
    }

    #[test]
    fn test_default_skip_dirs() {
        let config = ScanConfig::default();
        assert!(config.skip_dirs.contains("bios"));
        assert!(config.skip_dirs.contains("images"));
        assert!(config.recursive);
    }
}
