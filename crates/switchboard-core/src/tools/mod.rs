pub mod enablement;
pub mod registry;

pub use enablement::{EnabledTools, ToolEnablementStore};
pub use registry::{Tool, ToolCategory, ToolRegistry};
