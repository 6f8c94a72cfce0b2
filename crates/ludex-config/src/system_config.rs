//! Per-system environment configuration
//!
//! Describes where a system's games live, which files count as games,
//! and how they are launched.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// A libretro core (or emulator sub-mode) offered for a system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreEntry {
    /// Core name (e.g., "mgba")
    pub name: String,

    /// Core supports netplay sessions
    #[serde(default)]
    pub netplay: bool,

    /// Preferred core for its emulator
    #[serde(default)]
    pub default: bool,
}

impl CoreEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            netplay: false,
            default: false,
        }
    }

    pub fn with_netplay(mut self) -> Self {
        self.netplay = true;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}

/// An emulator offered for a system, with its cores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorEntry {
    /// Emulator id (e.g., "libretro", "mame")
    pub name: String,

    /// Cores in preference order
    #[serde(default)]
    pub cores: Vec<CoreEntry>,
}

impl EmulatorEntry {
    pub fn new(name: impl Into<String>, cores: Vec<CoreEntry>) -> Self {
        Self {
            name: name.into(),
            cores,
        }
    }

    /// Core flagged default, else the first one
    pub fn default_core(&self) -> Option<&CoreEntry> {
        self.cores
            .iter()
            .find(|c| c.default)
            .or_else(|| self.cores.first())
    }

    pub fn find_core(&self, name: &str) -> Option<&CoreEntry> {
        self.cores.iter().find(|c| c.name == name)
    }
}

/// Configuration for one system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Display name (e.g., "Game Boy Advance")
    pub name: String,

    /// Short name used for directories and tokens (e.g., "gba")
    pub short_name: String,

    /// Directory holding the games; defaults to `<roms_dir>/<short_name>`
    #[serde(default)]
    pub start_path: Option<PathBuf>,

    /// Accepted file extensions (lowercase, without dot)
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Extensions that are scanned but never displayed
    #[serde(default)]
    pub hidden_extensions: Vec<String>,

    /// Launch command template
    #[serde(default)]
    pub command: String,

    /// Emulators in preference order
    #[serde(default)]
    pub emulators: Vec<EmulatorEntry>,

    /// Store back end name for store-backed systems ("steam", "epic", ...)
    #[serde(default)]
    pub store: Option<String>,

    /// Use canonical arcade names for unnamed games
    #[serde(default)]
    pub arcade: bool,

    /// Generic media by ROM extension (e.g., "pdf" -> pdf icon)
    #[serde(default)]
    pub placeholders: HashMap<String, PathBuf>,

    /// System-specific settings
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl SystemConfig {
    /// Minimal config for a system rooted at `start_path`
    pub fn new(short_name: impl Into<String>, start_path: impl Into<PathBuf>) -> Self {
        let short_name = short_name.into();
        Self {
            name: short_name.clone(),
            short_name,
            start_path: Some(start_path.into()),
            extensions: Vec::new(),
            hidden_extensions: Vec::new(),
            command: String::new(),
            emulators: Vec::new(),
            store: None,
            arcade: false,
            placeholders: HashMap::new(),
            settings: HashMap::new(),
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_emulator(mut self, emulator: EmulatorEntry) -> Self {
        self.emulators.push(emulator);
        self
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    /// Resolve the game directory against the configured roms root
    pub fn resolved_start_path(&self, roms_dir: &Path) -> PathBuf {
        self.start_path
            .clone()
            .unwrap_or_else(|| roms_dir.join(&self.short_name))
    }

    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_lowercase();
        self.extensions.iter().any(|e| e.trim_start_matches('.') == ext)
    }

    pub fn is_hidden_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_lowercase();
        self.hidden_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    pub fn is_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn default_emulator(&self) -> Option<&EmulatorEntry> {
        self.emulators.first()
    }

    pub fn find_emulator(&self, name: &str) -> Option<&EmulatorEntry> {
        self.emulators.iter().find(|e| e.name == name)
    }
}

const RETROARCH_COMMAND: &str =
    "retroarch -L /usr/lib/libretro/%CORE%_libretro.so %NETPLAY% %STATE% %ROM%";

fn libretro(cores: Vec<CoreEntry>) -> EmulatorEntry {
    EmulatorEntry::new("libretro", cores)
}

fn emulated(
    short_name: &str,
    name: &str,
    extensions: &[&str],
    cores: Vec<CoreEntry>,
) -> SystemConfig {
    SystemConfig {
        name: name.to_string(),
        short_name: short_name.to_string(),
        start_path: None,
        extensions: extensions.iter().map(|e| e.to_string()).collect(),
        hidden_extensions: Vec::new(),
        command: RETROARCH_COMMAND.to_string(),
        emulators: vec![libretro(cores)],
        store: None,
        arcade: false,
        placeholders: HashMap::new(),
        settings: HashMap::new(),
    }
}

fn store_system(short_name: &str, name: &str, store: &str) -> SystemConfig {
    SystemConfig {
        name: name.to_string(),
        short_name: short_name.to_string(),
        start_path: None,
        extensions: Vec::new(),
        hidden_extensions: Vec::new(),
        command: String::new(),
        emulators: Vec::new(),
        store: Some(store.to_string()),
        arcade: false,
        placeholders: HashMap::new(),
        settings: HashMap::new(),
    }
}

pub(crate) fn default_systems() -> BTreeMap<String, SystemConfig> {
    let mut systems = BTreeMap::new();

    systems.insert(
        "gba".to_string(),
        emulated(
            "gba",
            "Game Boy Advance",
            &["gba", "zip", "7z"],
            vec![
                CoreEntry::new("mgba").with_netplay().as_default(),
                CoreEntry::new("gpsp"),
            ],
        ),
    );

    systems.insert(
        "nes".to_string(),
        emulated(
            "nes",
            "Nintendo Entertainment System",
            &["nes", "fds", "zip", "7z"],
            vec![
                CoreEntry::new("fceumm").with_netplay(),
                CoreEntry::new("nestopia").with_netplay(),
            ],
        ),
    );

    systems.insert(
        "snes".to_string(),
        emulated(
            "snes",
            "Super Nintendo",
            &["smc", "sfc", "zip", "7z"],
            vec![
                CoreEntry::new("snes9x").with_netplay(),
                CoreEntry::new("bsnes"),
            ],
        ),
    );

    let mut psx = emulated(
        "psx",
        "Sony PlayStation",
        &["bin", "cue", "chd", "pbp", "m3u"],
        vec![CoreEntry::new("pcsx_rearmed"), CoreEntry::new("swanstation")],
    );
    psx.hidden_extensions = vec!["bin".to_string()];
    systems.insert("psx".to_string(), psx);

    let mut mame = emulated(
        "mame",
        "Arcade",
        &["zip", "7z"],
        vec![CoreEntry::new("mame").with_netplay()],
    );
    mame.arcade = true;
    mame.command = "%EMULATOR% -rom %ROM%".to_string();
    mame.emulators = vec![EmulatorEntry::new("mame", vec![CoreEntry::new("mame")])];
    systems.insert("mame".to_string(), mame);

    systems.insert(
        "steam".to_string(),
        store_system("steam", "Steam", "steam"),
    );
    systems.insert(
        "epic".to_string(),
        store_system("epic", "Epic Games Store", "epic"),
    );

    systems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_systems() {
        let systems = default_systems();
        assert!(systems.contains_key("gba"));
        assert!(systems.contains_key("steam"));
        assert!(systems["steam"].is_store());
        assert!(systems["mame"].arcade);
    }

    #[test]
    fn test_extension_matching() {
        let systems = default_systems();
        let gba = &systems["gba"];
        assert!(gba.accepts_extension("GBA"));
        assert!(gba.accepts_extension(".zip"));
        assert!(!gba.accepts_extension("nes"));

        let psx = &systems["psx"];
        assert!(psx.is_hidden_extension("BIN"));
        assert!(!psx.is_hidden_extension("cue"));
    }

    #[test]
    fn test_default_core_selection() {
        let systems = default_systems();
        let emulator = systems["gba"].default_emulator().unwrap();
        assert_eq!(emulator.name, "libretro");
        assert_eq!(emulator.default_core().unwrap().name, "mgba");

        let nes = systems["nes"].default_emulator().unwrap();
        // No core flagged default: first wins
        assert_eq!(nes.default_core().unwrap().name, "fceumm");
    }

    #[test]
    fn test_resolved_start_path() {
        let systems = default_systems();
        let path = systems["snes"].resolved_start_path(Path::new("/roms"));
        assert_eq!(path, PathBuf::from("/roms/snes"));

        let custom = SystemConfig::new("snes", "/mnt/games/snes");
        assert_eq!(
            custom.resolved_start_path(Path::new("/roms")),
            PathBuf::from("/mnt/games/snes")
        );
    }
}
