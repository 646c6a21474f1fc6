use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Manage LLM providers, models, tools and saved agents
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override where persisted data is stored
    #[arg(long, global = true, env = "SWITCHBOARD_DATA")]
    pub data: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List providers and whether they are enabled
    Providers,
    /// List available models
    Models {
        /// Only show models for this provider
        #[arg(long)]
        provider: Option<String>,
        /// Fetch model lists from providers before listing
        #[arg(long)]
        refresh: bool,
    },
    /// Manage provider API keys
    Keys {
        #[command(subcommand)]
        action: KeysCommands,
    },
    /// Enable or disable tool integrations
    Tools {
        #[command(subcommand)]
        action: ToolsCommands,
    },
    /// Manage saved agents
    Agents {
        #[command(subcommand)]
        action: AgentsCommands,
    },
    /// Print the outbound request a prompt would produce
    Request {
        /// User message to send
        #[arg(short, long)]
        prompt: String,
        /// Provider to send to; defaults to the first available
        #[arg(long)]
        provider: Option<String>,
        /// Model to use; defaults to the provider's first model
        #[arg(long)]
        model: Option<String>,
        /// Start from a saved agent's conversation
        #[arg(long)]
        agent: Option<String>,
        /// Fetch model lists from providers first
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum KeysCommands {
    /// Store an API key for a provider
    Set {
        provider: String,
        /// The key; prompted for when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// Remove a stored API key
    Remove { provider: String },
    /// Show which providers have keys configured
    List,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ToolsCommands {
    /// List tools by category
    List,
    Enable { id: String },
    Disable { id: String },
    Toggle { id: String },
    /// Print the system context contributed by enabled tools
    Context,
}

#[derive(Subcommand, Clone, Debug)]
pub enum AgentsCommands {
    List,
    Show { id: String },
    Delete { id: String },
    /// Save a conversation from a JSON file of messages
    Save {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// JSON array of `{"role": ..., "content": ...}` messages
        #[arg(long)]
        from: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_key_set_without_key() {
        let cli = Cli::try_parse_from(["switchboard", "keys", "set", "openai"]).unwrap();
        match cli.command {
            Commands::Keys {
                action: KeysCommands::Set { provider, key },
            } => {
                assert_eq!(provider, "openai");
                assert!(key.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "models",
            "--refresh",
            "--debug",
            "--data",
            "/tmp/sb",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.data, Some(PathBuf::from("/tmp/sb")));
        assert!(matches!(
            cli.command,
            Commands::Models { refresh: true, provider: None }
        ));
    }

    #[test]
    fn request_requires_prompt() {
        assert!(Cli::try_parse_from(["switchboard", "request"]).is_err());
    }

    #[test]
    fn agent_save_defaults_description() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "agents",
            "save",
            "--name",
            "Todo",
            "--from",
            "chat.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Agents {
                action: AgentsCommands::Save { name, description, from },
            } => {
                assert_eq!(name, "Todo");
                assert_eq!(description, "");
                assert_eq!(from, PathBuf::from("chat.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
