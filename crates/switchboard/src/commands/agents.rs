use async_trait::async_trait;
use comfy_table::{Cell, Color, Table};
use eyre::{Result, bail};
use std::path::Path;

use switchboard_core::agents::AgentMetadata;
use switchboard_core::session::ChatMessage;

use super::Command;
use crate::cli::AgentsCommands;
use crate::context::AppContext;
use crate::error::Error;

pub struct AgentsCommand {
    pub context: AppContext,
    pub action: AgentsCommands,
}

#[async_trait]
impl Command for AgentsCommand {
    async fn execute(&self) -> Result<()> {
        let session = &self.context.session;

        match &self.action {
            AgentsCommands::List => {
                let agents = self.context.stores().agents.list();
                if agents.is_empty() {
                    println!("No saved agents.");
                    return Ok(());
                }

                let mut table = Table::new();
                table.set_header(vec![
                    Cell::new("ID").fg(Color::Green),
                    Cell::new("Name").fg(Color::Green),
                    Cell::new("Description").fg(Color::Green),
                    Cell::new("Messages").fg(Color::Green),
                    Cell::new("Created").fg(Color::Green),
                ]);
                for agent in agents {
                    table.add_row(vec![
                        Cell::new(&agent.id),
                        Cell::new(&agent.name),
                        Cell::new(&agent.description),
                        Cell::new(agent.messages.len()),
                        Cell::new(agent.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
                    ]);
                }
                println!("{table}");
            }
            AgentsCommands::Show { id } => {
                let agent = session.load_agent(id)?;
                println!("{} ({})", agent.name, agent.id);
                if !agent.description.is_empty() {
                    println!("{}", agent.description);
                }
                println!("Created: {}", agent.created_at.to_rfc3339());
                if !agent.metadata.is_empty() {
                    println!("Metadata: {}", serde_json::to_string(&agent.metadata)?);
                }
                println!();
                for message in session.messages() {
                    println!("[{}] {}", message.role, message.content);
                }
            }
            AgentsCommands::Delete { id } => {
                if !session.delete_agent(id).await? {
                    bail!("No agent with id '{id}'");
                }
                println!("Deleted agent {id}.");
            }
            AgentsCommands::Save {
                name,
                description,
                from,
            } => {
                for message in read_messages(from)? {
                    session.push_message(message);
                }
                let agent = session
                    .save_as_agent(name, description, AgentMetadata::new())
                    .await?;
                println!("Saved agent {} ({}).", agent.name, agent.id);
            }
        }
        Ok(())
    }
}

/// Read a JSON array of chat messages.
pub fn read_messages(path: &Path) -> Result<Vec<ChatMessage>, Error> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
