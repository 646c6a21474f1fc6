use async_trait::async_trait;
use eyre::Result;
use tracing::debug;

use switchboard_core::session::ChatMessage;

use super::Command;
use crate::context::AppContext;

pub struct RequestCommand {
    pub context: AppContext,
    pub prompt: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub agent: Option<String>,
    pub refresh: bool,
}

#[async_trait]
impl Command for RequestCommand {
    async fn execute(&self) -> Result<()> {
        let session = &self.context.session;

        if self.refresh {
            session.initialize().await;
        }

        if let Some(id) = &self.provider {
            let provider = self.context.provider(id)?;
            session.select_provider(&provider.id)?;
        }
        if let Some(model) = &self.model {
            session.select_model(model)?;
        }

        if let Some(id) = &self.agent {
            let agent = session.load_agent(id)?;
            debug!(agent = %agent.name, messages = agent.messages.len(), "Continuing from agent");
        }
        session.push_message(ChatMessage::user(self.prompt.as_str()));

        let request = session.compose_request()?;
        println!("{}", serde_json::to_string_pretty(&request)?);
        Ok(())
    }
}
