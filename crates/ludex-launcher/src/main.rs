//! ludex launcher
//!
//! Command line frontend for the ludex catalog: lists systems and games,
//! merges store installations into the catalog, resolves launch commands
//! and edits game metadata.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use ludex_config::LudexConfig;
use ludex_emulator::{
    CoreRegistry, LaunchCommandResolver, LaunchOptions, LaunchTarget, NetplayMode, SaveState,
};
use ludex_library::{
    Catalog, CatalogUpdate, EpicScanner, MetadataKey, StoreKind, StoreScanner, SteamScanner,
    SystemId,
};

#[derive(Parser)]
#[command(name = "ludex")]
#[command(about = "Browse and launch a game catalog", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user or system config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List systems and their game counts
    Systems,

    /// List the displayed games of a system
    Games {
        system: String,

        /// Only games matching this text
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Merge installed store titles into the store systems
    ScanStores,

    /// Print the command line that starts a game
    Command {
        system: String,

        /// Game path as stored in the gamelist (e.g. ./game.zip)
        path: String,

        /// Directory of libretro core info files
        #[arg(long)]
        info_dir: Option<PathBuf>,

        /// Load this save state slot
        #[arg(long)]
        state_slot: Option<u32>,

        /// Host a netplay session on this port
        #[arg(long, conflicts_with_all = ["connect", "spectate"])]
        host: Option<u16>,

        /// Join a netplay session (ip:port)
        #[arg(long, conflicts_with = "spectate")]
        connect: Option<String>,

        /// Watch a netplay session (ip:port)
        #[arg(long)]
        spectate: Option<String>,
    },

    /// Set a metadata field of a game
    Set {
        system: String,
        path: String,
        field: String,
        value: String,
    },

    /// Replay recovered edits and write every gamelist
    Save,

    /// Write the default configuration to the user config directory
    InitConfig,
}

fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    if let Commands::InitConfig = cli.command {
        let config = LudexConfig::default();
        return match &cli.config {
            Some(path) => config.save(path),
            None => config.save_default(),
        }
        .context("cannot write configuration");
    }

    let config = match &cli.config {
        Some(path) => LudexConfig::load(path)?,
        None => LudexConfig::load_default()?,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli.command, config))
}

/// Log to stderr so command output stays clean
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

async fn run(command: Commands, config: LudexConfig) -> Result<()> {
    let mut catalog = Catalog::from_config(&config);
    catalog.load_gamelists();

    match command {
        Commands::Systems => list_systems(&mut catalog),
        Commands::Games { system, filter } => list_games(&mut catalog, &system, filter)?,
        Commands::ScanStores => scan_stores(&mut catalog, &config).await?,
        Commands::Command {
            system,
            path,
            info_dir,
            state_slot,
            host,
            connect,
            spectate,
        } => {
            let netplay = netplay_mode(host, connect, spectate)?;
            let command = resolve_command(
                &catalog,
                &config,
                &system,
                &path,
                info_dir,
                state_slot,
                netplay,
            )?;
            println!("{}", command);
        }
        Commands::Set {
            system,
            path,
            field,
            value,
        } => set_field(&mut catalog, &system, &path, &field, &value)?,
        Commands::Save => {
            let failures = catalog.save_gamelists();
            if failures > 0 {
                bail!("{} gamelist(s) could not be saved", failures);
            }
        }
        Commands::InitConfig => {}
    }

    let failures = catalog.shutdown();
    if failures > 0 {
        bail!("{} gamelist(s) could not be saved", failures);
    }
    Ok(())
}

fn system_id(catalog: &Catalog, name: &str) -> Result<SystemId> {
    catalog
        .system_by_name(name)
        .ok_or_else(|| anyhow!("unknown system '{}'", name))
}

fn list_systems(catalog: &mut Catalog) {
    for id in catalog.visible_systems() {
        let counts = catalog.game_counts(id);
        let Some(system) = catalog.system(id) else {
            continue;
        };
        println!(
            "{:<12} {:<40} {:>5} games {:>4} favorites",
            system.name(),
            system.full_name(),
            counts.total,
            counts.favorites
        );
    }
}

fn list_games(catalog: &mut Catalog, system: &str, filter: Option<String>) -> Result<()> {
    let id = system_id(catalog, system)?;
    if let Some(text) = filter
        && let Some(state) = catalog.filter_state_mut(id)
    {
        state.set_text(text);
    }

    for game in catalog.visible_games(id) {
        let Some(entry) = catalog.entry(game) else {
            continue;
        };
        let marker = if entry.status().is_virtual() { "*" } else { " " };
        println!("{} {:<48} {}", marker, catalog.display_name(game), entry.path_string());
    }
    Ok(())
}

fn scanner_for(store: StoreKind, config: &LudexConfig) -> Option<Box<dyn StoreScanner>> {
    match store {
        StoreKind::Steam => Some(Box::new(SteamScanner::new(
            config.stores.steam_libraries.clone(),
        )) as Box<dyn StoreScanner>),
        StoreKind::Epic => config
            .stores
            .epic_manifests
            .as_ref()
            .map(|dir| Box::new(EpicScanner::new(dir)) as Box<dyn StoreScanner>),
        _ => None,
    }
}

/// Run every store scanner on a worker and apply the results here
async fn scan_stores(catalog: &mut Catalog, config: &LudexConfig) -> Result<()> {
    let mut tasks = Vec::new();
    let store_systems: Vec<(SystemId, StoreKind)> = catalog
        .systems()
        .filter_map(|s| s.store().map(|store| (s.id(), store)))
        .collect();

    for (system, store) in store_systems {
        let Some(scanner) = scanner_for(store, config) else {
            warn!("No scanner configured for {}", store);
            continue;
        };
        let updates = catalog.update_sender();
        tasks.push(tokio::task::spawn_blocking(move || {
            let update = match scanner.scan() {
                Ok(titles) => CatalogUpdate::StoreScanned { system, titles },
                Err(e) => CatalogUpdate::ScanFailed {
                    system,
                    error: e.to_string(),
                },
            };
            updates.send(update);
        }));
    }

    for task in tasks {
        task.await.context("store scan task panicked")?;
    }

    let applied = catalog.apply_pending();
    info!("Applied {} store scan results", applied);
    Ok(())
}

fn netplay_mode(
    host: Option<u16>,
    connect: Option<String>,
    spectate: Option<String>,
) -> Result<NetplayMode> {
    if let Some(port) = host {
        return Ok(NetplayMode::Server { port });
    }
    if let Some(peer) = connect {
        let (ip, port) = parse_peer(&peer)?;
        return Ok(NetplayMode::Client { ip, port });
    }
    if let Some(peer) = spectate {
        let (ip, port) = parse_peer(&peer)?;
        return Ok(NetplayMode::Spectator { ip, port });
    }
    Ok(NetplayMode::Disabled)
}

fn parse_peer(peer: &str) -> Result<(String, u16)> {
    let (ip, port) = peer
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected ip:port, got '{}'", peer))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port in '{}'", peer))?;
    Ok((ip.to_string(), port))
}

fn resolve_command(
    catalog: &Catalog,
    config: &LudexConfig,
    system: &str,
    path: &str,
    info_dir: Option<PathBuf>,
    state_slot: Option<u32>,
    netplay: NetplayMode,
) -> Result<String> {
    let id = system_id(catalog, system)?;
    let game = catalog
        .find_game(id, path)
        .ok_or_else(|| anyhow!("no game '{}' in {}", path, system))?;
    let entry = catalog
        .entry(game)
        .ok_or_else(|| anyhow!("game '{}' vanished", path))?;
    let system_config = catalog
        .system(id)
        .map(|s| s.config())
        .ok_or_else(|| anyhow!("unknown system '{}'", system))?;

    let mut cores = CoreRegistry::new(info_dir.unwrap_or_default());
    cores.scan()?;

    let resolver = LaunchCommandResolver::new(system_config).with_cores(&cores);
    let mut options = LaunchOptions::new().with_netplay(netplay);
    if let Some(slot) = state_slot {
        options = options.with_save_state(SaveState::slot(slot));
    }
    if resolver.needs_game_info() {
        let info = config.paths.runtime_dir.join("gameinfo.xml");
        catalog.write_game_info(game, &info)?;
        options = options.with_game_info(info);
    }

    let target = LaunchTarget::from_entry(entry)?;
    Ok(resolver.resolve(&target, &options)?.command)
}

fn set_field(
    catalog: &mut Catalog,
    system: &str,
    path: &str,
    field: &str,
    value: &str,
) -> Result<()> {
    let id = system_id(catalog, system)?;
    let game = catalog
        .find_game(id, path)
        .ok_or_else(|| anyhow!("no game '{}' in {}", path, system))?;
    let key = MetadataKey::from_tag(field).ok_or_else(|| anyhow!("unknown field '{}'", field))?;

    let changed = catalog.edit_metadata(game, |md| {
        md.set(key, value);
    })?;
    if changed {
        info!("{}: {} = {}", path, field, value);
    }
    Ok(())
}
