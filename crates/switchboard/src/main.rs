use clap::Parser;
use eyre::Result;

use switchboard::cli::config::load_env;
use switchboard::cli::{Cli, Commands};
use switchboard::commands::{
    Command, agents::AgentsCommand, keys::KeysCommand, models::ModelsCommand,
    providers::ProvidersCommand, request::RequestCommand, tools::ToolsCommand,
};
use switchboard::context::AppContext;
use switchboard_core::utils::tracing::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    load_env()?;
    init_tracing(cli.debug)?;

    let context = AppContext::load(cli.config.as_deref(), cli.data.as_deref()).await?;

    match cli.command {
        Commands::Providers => ProvidersCommand { context }.execute().await,
        Commands::Models { provider, refresh } => {
            ModelsCommand {
                context,
                provider,
                refresh,
            }
            .execute()
            .await
        }
        Commands::Keys { action } => KeysCommand { context, action }.execute().await,
        Commands::Tools { action } => ToolsCommand { context, action }.execute().await,
        Commands::Agents { action } => AgentsCommand { context, action }.execute().await,
        Commands::Request {
            prompt,
            provider,
            model,
            agent,
            refresh,
        } => {
            RequestCommand {
                context,
                prompt,
                provider,
                model,
                agent,
                refresh,
            }
            .execute()
            .await
        }
    }
}
