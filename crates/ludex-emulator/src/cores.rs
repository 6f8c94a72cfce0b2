//! libretro core info files

use crate::EmulatorError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What a `<core>_libretro.info` file says about a core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreInfo {
    pub name: String,
    pub display_name: String,
    pub supported_extensions: Vec<String>,
    pub needs_bios: bool,
    pub version: Option<String>,
    /// Core can write and load save states
    pub savestate: bool,
}

impl CoreInfo {
    /// Info for a core without an info file
    pub fn unknown(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            supported_extensions: Vec::new(),
            needs_bios: false,
            version: None,
            savestate: true,
        }
    }

    /// Parse the `key = "value"` lines of an info file
    pub fn parse(name: &str, contents: &str) -> Self {
        let mut info = Self::unknown(name);

        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');

            match key.trim() {
                "display_name" => info.display_name = value.to_string(),
                "supported_extensions" => {
                    info.supported_extensions = value
                        .split('|')
                        .map(|s| s.trim().to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                "firmware_count" => {
                    if let Ok(count) = value.parse::<u32>() {
                        info.needs_bios = count > 0;
                    }
                }
                "display_version" => info.version = Some(value.to_string()),
                "savestate" => info.savestate = value == "true",
                _ => {}
            }
        }

        info
    }

    pub fn supports_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_lowercase();
        self.supported_extensions.iter().any(|e| *e == ext)
    }
}

/// Installed cores, keyed by core name
#[derive(Debug, Clone, Default)]
pub struct CoreRegistry {
    info_dir: PathBuf,
    cores: HashMap<String, CoreInfo>,
}

impl CoreRegistry {
    pub fn new(info_dir: impl Into<PathBuf>) -> Self {
        Self {
            info_dir: info_dir.into(),
            cores: HashMap::new(),
        }
    }

    /// Read every `*_libretro.info` file of the info directory
    pub fn scan(&mut self) -> Result<(), EmulatorError> {
        self.cores.clear();

        if !self.info_dir.exists() {
            tracing::debug!("No core info directory at {}", self.info_dir.display());
            return Ok(());
        }

        for entry in fs::read_dir(&self.info_dir)? {
            let path = entry?.path();
            let Some(core_name) = core_name(&path) else {
                continue;
            };

            match fs::read_to_string(&path) {
                Ok(contents) => {
                    let info = CoreInfo::parse(&core_name, &contents);
                    self.cores.insert(core_name, info);
                }
                Err(e) => tracing::warn!("Cannot read {}: {}", path.display(), e),
            }
        }

        tracing::info!("Found {} libretro cores", self.cores.len());
        Ok(())
    }

    pub fn insert(&mut self, info: CoreInfo) {
        self.cores.insert(info.name.clone(), info);
    }

    pub fn get(&self, name: &str) -> Option<&CoreInfo> {
        self.cores.get(name)
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Cores supporting an extension, sorted by name
    pub fn find_cores_for_extension(&self, ext: &str) -> Vec<&CoreInfo> {
        let mut cores: Vec<&CoreInfo> = self
            .cores
            .values()
            .filter(|core| core.supports_extension(ext))
            .collect();
        cores.sort_by(|a, b| a.name.cmp(&b.name));
        cores
    }
}

fn core_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix("_libretro.info").map(str::to_string)
}
