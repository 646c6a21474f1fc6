use async_trait::async_trait;
use comfy_table::{Cell, Color, Table};
use eyre::Result;

use super::Command;
use crate::context::AppContext;

pub struct ProvidersCommand {
    pub context: AppContext,
}

#[async_trait]
impl Command for ProvidersCommand {
    async fn execute(&self) -> Result<()> {
        let stores = self.context.stores();

        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Provider").fg(Color::Green),
            Cell::new("Name").fg(Color::Green),
            Cell::new("Enabled").fg(Color::Green),
            Cell::new("Models").fg(Color::Green),
            Cell::new("API key").fg(Color::Green),
        ]);

        for provider in stores.catalog.list() {
            let enabled = stores.settings.is_enabled(&provider.id);
            let source = if provider.supports_dynamic_models() {
                "fetched"
            } else {
                "static"
            };
            let has_key = stores.credentials.api_key(&provider.id).is_some();

            table.add_row(vec![
                Cell::new(provider.id.as_str()),
                Cell::new(&provider.name),
                if enabled {
                    Cell::new("yes").fg(Color::Green)
                } else {
                    Cell::new("no").fg(Color::Red)
                },
                Cell::new(source),
                Cell::new(if has_key { "stored" } else { "-" }),
            ]);
        }

        println!("{table}");
        Ok(())
    }
}
