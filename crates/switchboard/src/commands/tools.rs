use async_trait::async_trait;
use comfy_table::{Cell, Color, Table};
use eyre::{Result, bail};

use super::Command;
use crate::cli::ToolsCommands;
use crate::context::AppContext;

pub struct ToolsCommand {
    pub context: AppContext,
    pub action: ToolsCommands,
}

#[async_trait]
impl Command for ToolsCommand {
    async fn execute(&self) -> Result<()> {
        let stores = self.context.stores();

        match &self.action {
            ToolsCommands::List => {
                let mut table = Table::new();
                table.set_header(vec![
                    Cell::new("Category").fg(Color::Green),
                    Cell::new("Tool").fg(Color::Green),
                    Cell::new("Name").fg(Color::Green),
                    Cell::new("Status").fg(Color::Green),
                ]);

                for (category, tools) in stores.tool_registry.list_by_category() {
                    for tool in tools {
                        let status = if tool.coming_soon {
                            Cell::new("coming soon").fg(Color::Yellow)
                        } else if tool.always_enabled {
                            Cell::new("always on").fg(Color::Cyan)
                        } else if stores.tools.is_enabled(&tool.id) {
                            Cell::new("enabled").fg(Color::Green)
                        } else {
                            Cell::new("disabled")
                        };
                        table.add_row(vec![
                            Cell::new(category.to_string()),
                            Cell::new(&tool.id),
                            Cell::new(&tool.name),
                            status,
                        ]);
                    }
                }
                println!("{table}");
            }
            ToolsCommands::Enable { id } => {
                if stores.tool_registry.is_coming_soon(id) {
                    bail!("Tool '{id}' is not available yet");
                }
                stores.tools.enable(id).await?;
                println!("Enabled {id}.");
            }
            ToolsCommands::Disable { id } => {
                if stores.tool_registry.is_pinned(id) {
                    bail!("Tool '{id}' is always enabled");
                }
                stores.tools.disable(id).await?;
                println!("Disabled {id}.");
            }
            ToolsCommands::Toggle { id } => {
                let enabled = stores.tools.toggle(id).await?;
                println!("{id} is now {}.", if enabled { "enabled" } else { "disabled" });
            }
            ToolsCommands::Context => {
                let context = stores.tools.compose_context(&stores.tool_registry);
                if context.is_empty() {
                    println!("No enabled tool contributes context.");
                } else {
                    println!("{context}");
                }
            }
        }
        Ok(())
    }
}
