pub mod args;
pub mod config;

pub use args::{AgentsCommands, Cli, Commands, KeysCommands, ToolsCommands};
