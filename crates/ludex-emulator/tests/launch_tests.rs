//! Integration tests for resolving launch commands of catalog games

use ludex_config::{CatalogSettings, CoreEntry, EmulatorEntry, PathSettings, SystemConfig};
use ludex_emulator::{
    CoreRegistry, EmulatorError, LaunchCommandResolver, LaunchOptions, LaunchTarget,
};
use ludex_library::{
    Catalog, EntryStatus, EntryType, GamelistDocument, InstalledTitle, MetadataKey, SystemId,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test environment with a roms directory and a core info directory
struct LaunchTestEnv {
    #[allow(dead_code)]
    temp_dir: TempDir,
    roms_dir: PathBuf,
    info_dir: PathBuf,
    paths: PathSettings,
}

impl LaunchTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let roms_dir = temp_dir.path().join("roms");
        let info_dir = temp_dir.path().join("info");
        fs::create_dir_all(roms_dir.join("gba")).unwrap();
        fs::create_dir_all(&info_dir).unwrap();

        let mut paths = PathSettings::default();
        paths.roms_dir = roms_dir.clone();
        paths.recovery_dir = temp_dir.path().join("recovery");
        paths.runtime_dir = temp_dir.path().join("run");

        Self {
            temp_dir,
            roms_dir,
            info_dir,
            paths,
        }
    }

    fn create_rom(&self, name: &str) -> PathBuf {
        let path = self.roms_dir.join("gba").join(name);
        fs::write(&path, b"FAKE_ROM_DATA").unwrap();
        path
    }

    fn create_core_info(&self, name: &str, contents: &str) {
        fs::write(self.info_dir.join(format!("{}_libretro.info", name)), contents).unwrap();
    }

    fn gba_config(&self) -> SystemConfig {
        SystemConfig::new("gba", self.roms_dir.join("gba"))
            .with_extensions(&["gba"])
            .with_command("retroarch -L %CORE% %STATE% %ROM% --info %GAMEINFOXML%")
            .with_emulator(EmulatorEntry::new(
                "libretro",
                vec![CoreEntry::new("mgba").with_netplay(), CoreEntry::new("gpsp")],
            ))
    }

    fn catalog(&self) -> (Catalog, SystemId) {
        let mut catalog = Catalog::new(CatalogSettings::default(), self.paths.clone());
        let gba = catalog.add_system(self.gba_config()).unwrap();
        catalog.load_system(gba).unwrap();
        (catalog, gba)
    }
}

#[test]
fn test_game_metadata_selects_core() {
    let env = LaunchTestEnv::new();
    let rom = env.create_rom("metroid.gba");
    env.create_core_info("mgba", "savestate = \"true\"\n");
    env.create_core_info("gpsp", "savestate = \"true\"\n");

    let (mut catalog, gba) = env.catalog();
    let id = catalog
        .find_game(gba, &rom.to_string_lossy())
        .expect("scanned game");
    catalog
        .edit_metadata(id, |md| {
            md.set(MetadataKey::Core, "gpsp");
        })
        .unwrap();

    let mut cores = CoreRegistry::new(&env.info_dir);
    cores.scan().unwrap();

    let config = env.gba_config();
    let resolver = LaunchCommandResolver::new(&config).with_cores(&cores);
    assert!(resolver.needs_game_info());

    let info = env.paths.runtime_dir.join("game.xml");
    catalog.write_game_info(id, &info).unwrap();

    let target = LaunchTarget::from_entry(catalog.entry(id).unwrap()).unwrap();
    let resolved = resolver
        .resolve(&target, &LaunchOptions::new().with_game_info(&info))
        .unwrap();

    assert_eq!(resolved.core.as_deref(), Some("gpsp"));
    assert_eq!(
        resolved.command,
        format!(
            "retroarch -L gpsp {} --info {}",
            rom.to_string_lossy(),
            info.to_string_lossy()
        )
    );

    let doc = GamelistDocument::read(&info).unwrap();
    assert_eq!(doc.nodes[0].field("core"), Some("gpsp"));
}

#[test]
fn test_folders_cannot_be_launched() {
    let env = LaunchTestEnv::new();
    let (mut catalog, gba) = env.catalog();
    let folder = catalog
        .find_or_create_file(
            gba,
            EntryStatus::physical(env.roms_dir.join("gba").join("hacks")),
            EntryType::Folder,
        )
        .unwrap();

    let result = LaunchTarget::from_entry(catalog.entry(folder).unwrap());
    assert!(matches!(result, Err(EmulatorError::NotAGame(_))));
}

#[test]
fn test_installed_store_title_uses_store_command() {
    let env = LaunchTestEnv::new();
    let mut catalog = Catalog::new(CatalogSettings::default(), env.paths.clone());
    let config = SystemConfig::new("steam", env.temp_dir.path().join("steam"))
        .with_store("steam")
        .with_command("steam-launch %ROM_RAW%");
    let steam = catalog.add_system(config.clone()).unwrap();

    catalog
        .reconcile_store(
            steam,
            vec![
                InstalledTitle::new("Portal")
                    .with_store_id("400")
                    .with_launch_command("steam://rungameid/400"),
            ],
        )
        .unwrap();

    let id = catalog.find_game(steam, "steam:/installed/400").unwrap();
    let target = LaunchTarget::from_entry(catalog.entry(id).unwrap()).unwrap();
    let resolved = LaunchCommandResolver::new(&config)
        .resolve(&target, &LaunchOptions::new())
        .unwrap();

    assert!(resolved.passthrough);
    assert_eq!(resolved.command, "steam://rungameid/400");

    // Uninstalled: the template takes over again
    catalog.reconcile_store(steam, Vec::new()).unwrap();
    let id = catalog.find_game(steam, "steam:/virtual/400").unwrap();
    let target = LaunchTarget::from_entry(catalog.entry(id).unwrap()).unwrap();
    assert!(target.launch.is_empty());
    let resolved = LaunchCommandResolver::new(&config)
        .resolve(&target, &LaunchOptions::new())
        .unwrap();
    assert!(!resolved.passthrough);
    assert_eq!(resolved.command, "steam-launch steam:/virtual/400");
}
