//! Launch command templates
//!
//! A template such as `retroarch -L %CORE% %ROM%` is expanded in a single
//! pass: replacement values are never scanned for tokens again, and
//! `%WORD%` sequences that are not tokens are copied through unchanged.

use crate::cores::CoreRegistry;
use crate::EmulatorError;
use ludex_config::{EmulatorEntry, SystemConfig};
use ludex_library::{Entry, MetadataKey};
use std::path::{Path, PathBuf};

/// Netplay session requested for a launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetplayMode {
    #[default]
    Disabled,
    Client { ip: String, port: u16 },
    Server { port: u16 },
    Spectator { ip: String, port: u16 },
}

impl NetplayMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, NetplayMode::Disabled)
    }

    /// Command line fragment for `%NETPLAY%`
    pub fn block(&self) -> String {
        match self {
            NetplayMode::Disabled => String::new(),
            NetplayMode::Client { ip, port } => {
                format!("-netplaymode client -netplayip {} -netplayport {}", ip, port)
            }
            NetplayMode::Server { port } => format!("-netplaymode host -netplayport {}", port),
            NetplayMode::Spectator { ip, port } => {
                format!("-netplaymode spectator -netplayip {} -netplayport {}", ip, port)
            }
        }
    }
}

/// Save state to load when the game starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveState {
    pub slot: Option<u32>,
    pub file: Option<PathBuf>,
    pub autosave: bool,
}

impl SaveState {
    pub fn slot(slot: u32) -> Self {
        Self {
            slot: Some(slot),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_autosave(mut self) -> Self {
        self.autosave = true;
        self
    }

    /// Command line fragment for `%STATE%`
    pub fn block(&self) -> String {
        let mut parts = Vec::new();
        if let Some(slot) = self.slot {
            parts.push(format!("-state_slot {}", slot));
        }
        if let Some(file) = &self.file {
            parts.push(format!("-state_filename {}", escape_path(&file.to_string_lossy())));
        }
        if self.autosave {
            parts.push("-autosave 1".to_string());
        }
        parts.join(" ")
    }
}

/// Per-launch choices that are not part of the game
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub netplay: NetplayMode,
    pub save_state: Option<SaveState>,
    /// Exported game document for `%GAMEINFOXML%`
    pub game_info: Option<PathBuf>,
    pub controllers_config: Option<String>,
    /// Overrides the user's home directory for `%HOME%`
    pub home: Option<PathBuf>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_netplay(mut self, mode: NetplayMode) -> Self {
        self.netplay = mode;
        self
    }

    pub fn with_save_state(mut self, state: SaveState) -> Self {
        self.save_state = Some(state);
        self
    }

    pub fn with_game_info(mut self, path: impl Into<PathBuf>) -> Self {
        self.game_info = Some(path.into());
        self
    }

    pub fn with_controllers_config(mut self, config: impl Into<String>) -> Self {
        self.controllers_config = Some(config.into());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }
}

/// The game side of a launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Absolute file path, or the store identifier of a store title
    pub path: String,
    /// Emulator chosen for this game; empty for the system default
    pub emulator: String,
    /// Core chosen for this game; empty for the emulator default
    pub core: String,
    /// Precomputed store launch command
    pub launch: String,
}

impl LaunchTarget {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn from_entry(entry: &Entry) -> Result<Self, EmulatorError> {
        if !entry.is_game() {
            return Err(EmulatorError::NotAGame(entry.path_string()));
        }
        let md = entry.metadata();
        // Store commands only run installed titles
        let launch = if entry.status().is_virtual() {
            String::new()
        } else {
            md.get(MetadataKey::Launch).to_string()
        };
        Ok(Self {
            path: entry.path_string(),
            emulator: md.get(MetadataKey::Emulator).to_string(),
            core: md.get(MetadataKey::Core).to_string(),
            launch,
        })
    }

    pub fn with_emulator(mut self, emulator: impl Into<String>) -> Self {
        self.emulator = emulator.into();
        self
    }

    pub fn with_core(mut self, core: impl Into<String>) -> Self {
        self.core = core.into();
        self
    }

    pub fn with_launch(mut self, launch: impl Into<String>) -> Self {
        self.launch = launch.into();
        self
    }
}

/// A resolved command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub command: String,
    pub emulator: Option<String>,
    pub core: Option<String>,
    /// The store's own launch command was used as is
    pub passthrough: bool,
}

/// Expands a system's launch template for its games
pub struct LaunchCommandResolver<'a> {
    config: &'a SystemConfig,
    cores: Option<&'a CoreRegistry>,
}

impl<'a> LaunchCommandResolver<'a> {
    pub fn new(config: &'a SystemConfig) -> Self {
        Self {
            config,
            cores: None,
        }
    }

    /// Validate cores and save state support against installed core info
    pub fn with_cores(mut self, cores: &'a CoreRegistry) -> Self {
        self.cores = Some(cores);
        self
    }

    /// Template wants an exported game document
    pub fn needs_game_info(&self) -> bool {
        self.config.command.contains("%GAMEINFOXML%")
    }

    pub fn resolve(
        &self,
        target: &LaunchTarget,
        options: &LaunchOptions,
    ) -> Result<LaunchCommand, EmulatorError> {
        if self.config.is_store() && !target.launch.is_empty() {
            tracing::debug!("Using store launch command for {}", target.path);
            return Ok(LaunchCommand {
                command: target.launch.clone(),
                emulator: None,
                core: None,
                passthrough: true,
            });
        }

        let template = self.config.command.trim();
        if template.is_empty() {
            return Err(EmulatorError::NoCommand(self.config.short_name.clone()));
        }

        let emulator_entry = self.resolve_emulator(&target.emulator);
        let emulator = emulator_entry
            .map(|e| e.name.clone())
            .or_else(|| (!target.emulator.is_empty()).then(|| target.emulator.clone()));
        if emulator.is_none() && template.contains("%EMULATOR%") {
            return Err(EmulatorError::EmulatorNotFound(self.config.short_name.clone()));
        }

        let (core, core_netplay) = match self.resolve_core(emulator_entry, &target.core) {
            Some((name, netplay)) => (Some(name), netplay),
            None => (None, false),
        };
        if template.contains("%CORE%") {
            let Some(name) = &core else {
                return Err(EmulatorError::CoreNotFound(format!(
                    "no core configured for '{}'",
                    self.config.short_name
                )));
            };
            if let Some(registry) = self.cores
                && !registry.is_empty()
                && registry.get(name).is_none()
            {
                return Err(EmulatorError::CoreNotFound(name.clone()));
            }
        }

        let netplay = options.netplay.block();
        let state = self.state_block(core.as_deref(), options);

        let rom = Path::new(&target.path);
        let lookup = |token: &str| -> Option<String> {
            let value = match token {
                "SYSTEM" => self.config.short_name.clone(),
                "SYSTEMNAME" => self.config.name.clone(),
                "ROM" => escape_path(&target.path),
                "ROM_RAW" => target.path.clone(),
                "BASENAME" => rom
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
                "FILENAME" => rom
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
                "ROMPATH" => rom
                    .parent()
                    .map(|p| escape_path(&p.to_string_lossy()))
                    .unwrap_or_default(),
                "EMULATOR" => emulator.clone().unwrap_or_default(),
                "CORE" => core.clone().unwrap_or_default(),
                "HOME" => options
                    .home
                    .clone()
                    .or_else(dirs::home_dir)
                    .map(|h| escape_path(&h.to_string_lossy()))
                    .unwrap_or_default(),
                "CONTROLLERSCONFIG" => options.controllers_config.clone().unwrap_or_default(),
                "NETPLAY" => netplay.clone(),
                "STATE" => state.clone(),
                "GAMEINFOXML" => options
                    .game_info
                    .as_ref()
                    .map(|p| escape_path(&p.to_string_lossy()))
                    .unwrap_or_default(),
                _ => return None,
            };
            Some(value)
        };

        let mut command = substitute(template, lookup);

        if options.netplay.is_enabled() && !template.contains("%NETPLAY%") {
            if core_netplay {
                command.push(' ');
                command.push_str(&netplay);
            } else {
                tracing::debug!(
                    "Core {:?} does not support netplay; ignoring netplay request",
                    core
                );
            }
        }

        let command = collapse_whitespace(&command);
        tracing::info!("Resolved launch command: {}", command);
        Ok(LaunchCommand {
            command,
            emulator,
            core,
            passthrough: false,
        })
    }

    /// The game's emulator, else the system default
    fn resolve_emulator(&self, requested: &str) -> Option<&'a EmulatorEntry> {
        if !requested.is_empty() {
            if let Some(found) = self.config.find_emulator(requested) {
                return Some(found);
            }
            if !self.config.emulators.is_empty() {
                tracing::warn!(
                    "Emulator '{}' is not configured for '{}'; using the default",
                    requested,
                    self.config.short_name
                );
            } else {
                return None;
            }
        }
        self.config.default_emulator()
    }

    /// The game's core, else the emulator default, with its netplay support
    fn resolve_core(&self, emulator: Option<&EmulatorEntry>, requested: &str) -> Option<(String, bool)> {
        if !requested.is_empty() {
            match emulator.and_then(|e| e.find_core(requested)) {
                Some(core) => return Some((core.name.clone(), core.netplay)),
                None if emulator.is_none_or(|e| e.cores.is_empty()) => {
                    return Some((requested.to_string(), false));
                }
                None => tracing::warn!(
                    "Core '{}' is not configured for '{}'; using the default",
                    requested,
                    self.config.short_name
                ),
            }
        }
        emulator
            .and_then(|e| e.default_core())
            .map(|c| (c.name.clone(), c.netplay))
    }

    fn state_block(&self, core: Option<&str>, options: &LaunchOptions) -> String {
        let Some(state) = &options.save_state else {
            return String::new();
        };
        if let (Some(registry), Some(core)) = (self.cores, core)
            && registry.get(core).is_some_and(|info| !info.savestate)
        {
            tracing::debug!("Core '{}' has no save states; not loading one", core);
            return String::new();
        }
        state.block()
    }
}

/// Replace `%TOKEN%` sequences in one left-to-right pass
fn substitute(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match is_token_name(name).then(|| lookup(name)).flatten() {
            Some(value) => {
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                // Not a token: keep the '%' and retry from the next one
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_token_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Shell-escape a path for the command line
#[cfg(not(windows))]
pub fn escape_path(path: &str) -> String {
    const SPECIAL: &[char] = &[
        ' ', '\t', '"', '\'', '$', '`', '\\', '(', ')', '&', ';', '<', '>', '|', '*', '?', '[',
        ']', '{', '}', '!', '#', '~',
    ];
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Shell-escape a path for the command line
#[cfg(windows)]
pub fn escape_path(path: &str) -> String {
    let path = path.replace('/', "\\");
    if path.contains(' ') {
        format!("\"{}\"", path)
    } else {
        path
    }
}

/// Collapse runs of unescaped whitespace into one space and trim the ends
fn collapse_whitespace(command: &str) -> String {
    let mut out = String::with_capacity(command.len());
    let mut escaped = false;
    let mut pending_space = false;

    for c in command.chars() {
        if !escaped && c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
        escaped = !escaped && c == '\\' && cfg!(not(windows));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cores::CoreInfo;
    use ludex_config::CoreEntry;

    fn mame() -> SystemConfig {
        SystemConfig::new("mame", "/roms/mame")
            .with_command("%EMULATOR% -rom %ROM%")
            .with_emulator(EmulatorEntry::new("mame", Vec::new()))
    }

    fn gba() -> SystemConfig {
        SystemConfig::new("gba", "/roms/gba")
            .with_command("retroarch -L %CORE% %NETPLAY% %STATE% %ROM%")
            .with_emulator(EmulatorEntry::new(
                "libretro",
                vec![
                    CoreEntry::new("vba_next"),
                    CoreEntry::new("mgba").with_netplay().as_default(),
                ],
            ))
    }

    #[test]
    fn test_emulator_template() {
        let config = mame();
        let resolved = LaunchCommandResolver::new(&config)
            .resolve(&LaunchTarget::new("/roms/pac.zip"), &LaunchOptions::new())
            .unwrap();
        assert_eq!(resolved.command, "mame -rom /roms/pac.zip");
        assert_eq!(resolved.emulator.as_deref(), Some("mame"));
        assert!(!resolved.passthrough);
    }

    #[test]
    #[cfg(not(windows))]
    fn test_paths_are_escaped() {
        let config = mame();
        let resolved = LaunchCommandResolver::new(&config)
            .resolve(
                &LaunchTarget::new("/roms/Street Fighter (World).zip"),
                &LaunchOptions::new(),
            )
            .unwrap();
        assert_eq!(
            resolved.command,
            "mame -rom /roms/Street\\ Fighter\\ \\(World\\).zip"
        );
    }

    #[test]
    fn test_unknown_tokens_kept_and_single_pass() {
        let config = SystemConfig::new("nes", "/roms/nes")
            .with_command("run %FOO% %ROM_RAW% %BASENAME% 100%")
            .with_emulator(EmulatorEntry::new("fceux", Vec::new()));
        let resolved = LaunchCommandResolver::new(&config)
            .resolve(&LaunchTarget::new("/roms/nes/%CORE%.nes"), &LaunchOptions::new())
            .unwrap();
        assert_eq!(resolved.command, "run %FOO% /roms/nes/%CORE%.nes %CORE% 100%");
    }

    #[test]
    fn test_default_core_and_blank_blocks() {
        let config = gba();
        let resolved = LaunchCommandResolver::new(&config)
            .resolve(&LaunchTarget::new("/roms/gba/zelda.gba"), &LaunchOptions::new())
            .unwrap();
        assert_eq!(resolved.command, "retroarch -L mgba /roms/gba/zelda.gba");
        assert_eq!(resolved.core.as_deref(), Some("mgba"));
    }

    #[test]
    fn test_game_core_override_and_fallback() {
        let config = gba();
        let resolver = LaunchCommandResolver::new(&config);

        let chosen = LaunchTarget::new("/roms/gba/a.gba").with_core("vba_next");
        let resolved = resolver.resolve(&chosen, &LaunchOptions::new()).unwrap();
        assert_eq!(resolved.core.as_deref(), Some("vba_next"));

        let unknown = LaunchTarget::new("/roms/gba/a.gba").with_core("gpsp");
        let resolved = resolver.resolve(&unknown, &LaunchOptions::new()).unwrap();
        assert_eq!(resolved.core.as_deref(), Some("mgba"));
    }

    #[test]
    fn test_netplay_and_state_blocks() {
        let config = gba();
        let options = LaunchOptions::new()
            .with_netplay(NetplayMode::Client {
                ip: "10.0.0.2".to_string(),
                port: 55435,
            })
            .with_save_state(SaveState::slot(3).with_autosave());
        let resolved = LaunchCommandResolver::new(&config)
            .resolve(&LaunchTarget::new("/roms/gba/a.gba"), &options)
            .unwrap();
        assert_eq!(
            resolved.command,
            "retroarch -L mgba -netplaymode client -netplayip 10.0.0.2 -netplayport 55435 \
             -state_slot 3 -autosave 1 /roms/gba/a.gba"
        );
    }

    #[test]
    fn test_trailing_netplay_needs_core_support() {
        let mut config = gba();
        config.command = "retroarch -L %CORE% %ROM%".to_string();
        let options = LaunchOptions::new().with_netplay(NetplayMode::Server { port: 55435 });
        let resolver = LaunchCommandResolver::new(&config);

        let resolved = resolver
            .resolve(&LaunchTarget::new("/roms/gba/a.gba"), &options)
            .unwrap();
        assert_eq!(
            resolved.command,
            "retroarch -L mgba /roms/gba/a.gba -netplaymode host -netplayport 55435"
        );

        let no_netplay = LaunchTarget::new("/roms/gba/a.gba").with_core("vba_next");
        let resolved = resolver.resolve(&no_netplay, &options).unwrap();
        assert_eq!(resolved.command, "retroarch -L vba_next /roms/gba/a.gba");
    }

    #[test]
    fn test_store_passthrough() {
        let config = SystemConfig::new("steam", "/unused")
            .with_store("steam")
            .with_command("%ROM%");
        let resolver = LaunchCommandResolver::new(&config);

        let target = LaunchTarget::new("steam:/installed/440").with_launch("steam://rungameid/440");
        let resolved = resolver.resolve(&target, &LaunchOptions::new()).unwrap();
        assert_eq!(resolved.command, "steam://rungameid/440");
        assert!(resolved.passthrough);

        let virtual_title = LaunchTarget::new("steam:/virtual/70");
        let resolved = resolver.resolve(&virtual_title, &LaunchOptions::new()).unwrap();
        assert!(!resolved.passthrough);
    }

    #[test]
    fn test_missing_command_or_core() {
        let config = SystemConfig::new("pc", "/roms/pc");
        let result = LaunchCommandResolver::new(&config)
            .resolve(&LaunchTarget::new("/roms/pc/a.exe"), &LaunchOptions::new());
        assert!(matches!(result, Err(EmulatorError::NoCommand(_))));

        let config = SystemConfig::new("pc", "/roms/pc").with_command("dosbox -c %CORE% %ROM%");
        let result = LaunchCommandResolver::new(&config)
            .resolve(&LaunchTarget::new("/roms/pc/a.exe"), &LaunchOptions::new());
        assert!(matches!(result, Err(EmulatorError::CoreNotFound(_))));
    }

    #[test]
    fn test_core_registry_checks() {
        let config = gba();
        let mut registry = CoreRegistry::default();
        let mut mgba = CoreInfo::unknown("mgba");
        mgba.savestate = false;
        registry.insert(mgba);

        let resolver = LaunchCommandResolver::new(&config).with_cores(&registry);
        let options = LaunchOptions::new().with_save_state(SaveState::slot(1));
        let resolved = resolver
            .resolve(&LaunchTarget::new("/roms/gba/a.gba"), &options)
            .unwrap();
        assert_eq!(resolved.command, "retroarch -L mgba /roms/gba/a.gba");

        let missing = LaunchTarget::new("/roms/gba/a.gba").with_core("vba_next");
        let result = resolver.resolve(&missing, &options);
        assert!(matches!(result, Err(EmulatorError::CoreNotFound(name)) if name == "vba_next"));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a   b \t c  "), "a b c");
        #[cfg(not(windows))]
        assert_eq!(collapse_whitespace("a\\  b"), "a\\  b");
    }
}
