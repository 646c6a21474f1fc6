pub mod agents;
pub mod keys;
pub mod models;
pub mod providers;
pub mod request;
pub mod tools;

use async_trait::async_trait;
use eyre::Result;

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
