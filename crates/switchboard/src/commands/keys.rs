use async_trait::async_trait;
use comfy_table::{Cell, Color, Table};
use eyre::{Result, bail};
use zeroize::Zeroizing;

use switchboard_core::config::provider::ProviderId;
use switchboard_core::config::{EnvProvider, StdEnvProvider};
use switchboard_core::model_registry::RefreshOutcome;

use super::Command;
use crate::cli::KeysCommands;
use crate::context::AppContext;

pub struct KeysCommand {
    pub context: AppContext,
    pub action: KeysCommands,
}

#[async_trait]
impl Command for KeysCommand {
    async fn execute(&self) -> Result<()> {
        match &self.action {
            KeysCommands::Set { provider, key } => self.set(provider, key.as_deref()).await,
            KeysCommands::Remove { provider } => self.remove(provider).await,
            KeysCommands::List => {
                self.list();
                Ok(())
            }
        }
    }
}

impl KeysCommand {
    async fn set(&self, provider: &str, key: Option<&str>) -> Result<()> {
        let provider = self.context.provider(provider)?;

        let key = match key {
            Some(key) => Zeroizing::new(key.to_string()),
            None => Zeroizing::new(rpassword::prompt_password(format!(
                "API key for {}: ",
                provider.name
            ))?),
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("API key cannot be empty");
        }

        let outcome = self.context.session.set_api_key(&provider.id, key).await?;
        println!("Stored API key for {}.", provider.name);
        report_refresh(&self.context, &provider.id, outcome);
        Ok(())
    }

    async fn remove(&self, provider: &str) -> Result<()> {
        let provider = self.context.provider(provider)?;
        if self.context.stores().credentials.api_key(&provider.id).is_none() {
            println!("No stored API key for {}.", provider.name);
            return Ok(());
        }

        let outcome = self.context.session.remove_api_key(&provider.id).await?;
        println!("Removed API key for {}.", provider.name);
        report_refresh(&self.context, &provider.id, outcome);
        Ok(())
    }

    fn list(&self) {
        let stores = self.context.stores();
        let env = StdEnvProvider;

        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Provider").fg(Color::Green),
            Cell::new("Stored key").fg(Color::Green),
            Cell::new("Environment").fg(Color::Green),
        ]);

        for provider in stores.catalog.list() {
            let stored = stores
                .credentials
                .api_key(&provider.id)
                .map_or_else(|| "-".to_string(), |k| mask_key(&k));
            let from_env = match provider.api_key_env.as_deref() {
                Some(var) if env.var(var).is_some() => Cell::new(format!("{var} (set)")).fg(Color::Green),
                Some(var) => Cell::new(var),
                None => Cell::new("-"),
            };
            table.add_row(vec![
                Cell::new(provider.id.as_str()),
                Cell::new(stored),
                from_env,
            ]);
        }

        println!("{table}");
    }
}

fn report_refresh(
    context: &AppContext,
    provider: &ProviderId,
    outcome: RefreshOutcome,
) {
    match outcome {
        RefreshOutcome::Applied => {
            let count = context.stores().models.models_for(provider).len();
            println!("Refreshed models for {provider}: {count} available.");
        }
        RefreshOutcome::Failed => {
            let reason = context
                .stores()
                .models
                .failures()
                .remove(provider)
                .unwrap_or_default();
            eprintln!("warning: could not fetch models for {provider}: {reason}");
        }
        RefreshOutcome::Superseded | RefreshOutcome::Skipped => {}
    }
}

/// Show only the ends of a key. Short keys are hidden entirely.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(8);
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
