use async_trait::async_trait;
use comfy_table::{Cell, Color, Table};
use eyre::Result;

use super::Command;
use crate::context::AppContext;

pub struct ModelsCommand {
    pub context: AppContext,
    pub provider: Option<String>,
    pub refresh: bool,
}

#[async_trait]
impl Command for ModelsCommand {
    async fn execute(&self) -> Result<()> {
        let session = &self.context.session;
        let filter = match &self.provider {
            Some(id) => Some(self.context.provider(id)?.id),
            None => None,
        };

        if self.refresh {
            session.initialize().await;
            for (provider, error) in self.context.stores().models.failures() {
                if filter.as_ref().is_none_or(|f| f == &provider) {
                    eprintln!("warning: could not fetch models for {provider}: {error}");
                }
            }
        }

        let models: Vec<_> = session
            .models()
            .into_iter()
            .filter(|m| filter.as_ref().is_none_or(|f| f == &m.provider))
            .collect();

        if models.is_empty() {
            println!("No models available.");
            return Ok(());
        }

        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Provider").fg(Color::Green),
            Cell::new("Model").fg(Color::Green),
            Cell::new("Label").fg(Color::Green),
        ]);
        for model in &models {
            table.add_row(vec![
                Cell::new(model.provider.as_str()),
                Cell::new(&model.name),
                Cell::new(&model.label),
            ]);
        }
        println!("{table}");
        Ok(())
    }
}

