// Provider, model, tool and agent orchestration for chat sessions, without UI dependencies

pub mod agents;
pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model_registry;
pub mod session;
pub mod settings;
pub mod storage;
pub mod subscription;
pub mod test_utils;
pub mod tools;
pub mod utils;
