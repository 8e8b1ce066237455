//! CLI commands module.

mod config;
mod delete;
mod flush;
mod key;
mod keys;
mod ping;
mod util;

pub use config::ConfigCommand;
pub use delete::DeleteCommand;
pub use flush::FlushCommand;
pub use key::{DelCommand, GetCommand, SetCommand};
pub use keys::KeysCommand;
pub use ping::PingCommand;

// Re-export utils for use in commands
pub(crate) use util::*;
