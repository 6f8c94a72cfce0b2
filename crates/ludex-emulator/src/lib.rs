//! Launch command resolution for ludex
//!
//! Turns a system's command template and a game's emulator, core and
//! metadata into the literal command line that starts it.

mod command;
mod cores;

pub use command::{
    LaunchCommand, LaunchCommandResolver, LaunchOptions, LaunchTarget, NetplayMode, SaveState,
    escape_path,
};
pub use cores::{CoreInfo, CoreRegistry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("Core not found: {0}")]
    CoreNotFound(String),

    #[error("Emulator not found: {0}")]
    EmulatorNotFound(String),

    #[error("No launch command configured for system '{0}'")]
    NoCommand(String),

    #[error("Not a game: {0}")]
    NotAGame(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
