pub mod controller;
pub mod message;

pub use controller::{ChatSessionController, SessionStores};
pub use message::{ChatMessage, OutboundRequest, Role};
