//! Per-system recovery log
//!
//! Between full saves every edited entry is written to its own small
//! gamelist fragment. Each fragment records the byte size of the canonical
//! gamelist it was written against; on the next load only fragments whose
//! recorded size still matches are replayed.

use crate::GamelistError;
use crate::gamelist::{GamelistDocument, GamelistNode};
use std::path::{Path, PathBuf};

const PARENT_SIZE_ATTR: &str = "parentsize";
const MAX_STEM_LEN: usize = 96;

/// Fragment directory of one system
#[derive(Debug, Clone)]
pub struct RecoveryLog {
    dir: PathBuf,
}

impl RecoveryLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the fragment for an entry key
    pub fn fragment_path(&self, key: &str) -> PathBuf {
        self.dir.join(fragment_file_name(key))
    }

    /// Write (or overwrite) the fragment for one entry
    pub fn write_fragment(
        &self,
        key: &str,
        parent_size: u64,
        node: &GamelistNode,
    ) -> Result<(), GamelistError> {
        let mut doc = GamelistDocument::new();
        doc.set_root_attribute(PARENT_SIZE_ATTR, parent_size.to_string());
        doc.nodes.push(node.clone());
        doc.write_atomic(&self.fragment_path(key))
    }

    /// Fragments written against a canonical document of `parent_size` bytes.
    ///
    /// Fragments that are unreadable or were written against another
    /// version of the canonical document are deleted.
    pub fn read_fragments(&self, parent_size: u64) -> Vec<GamelistNode> {
        let mut files: Vec<PathBuf> = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == "xml"))
                .collect(),
            Err(_) => return Vec::new(),
        };
        files.sort();

        let mut nodes = Vec::new();
        for file in files {
            let doc = match GamelistDocument::read(&file) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!("Discarding unreadable recovery fragment {}: {}", file.display(), e);
                    remove_quietly(&file);
                    continue;
                }
            };

            let recorded = doc
                .root_attribute(PARENT_SIZE_ATTR)
                .and_then(|v| v.parse::<u64>().ok());
            if recorded != Some(parent_size) {
                tracing::warn!(
                    "Discarding stale recovery fragment {} (written for size {:?}, gamelist is {})",
                    file.display(),
                    recorded,
                    parent_size
                );
                remove_quietly(&file);
                continue;
            }

            nodes.extend(doc.nodes);
        }
        nodes
    }

    /// Number of fragments currently on disk
    pub fn len(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|x| x == "xml"))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete the fragment of one entry
    pub fn remove(&self, key: &str) {
        let path = self.fragment_path(key);
        if path.exists() {
            remove_quietly(&path);
        }
    }

    /// Delete every fragment of this system
    pub fn clear(&self) -> Result<(), GamelistError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("Failed to remove {}: {}", path.display(), e);
    }
}

/// File name derived from an entry key: readable prefix plus a hash so
/// keys that sanitize alike stay distinct
fn fragment_file_name(key: &str) -> String {
    let mut stem: String = key
        .trim_start_matches(['/', '.'])
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.len() > MAX_STEM_LEN {
        stem.truncate(MAX_STEM_LEN);
    }
    format!("{}-{:016x}.xml", stem, fnv1a(key.as_bytes()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
