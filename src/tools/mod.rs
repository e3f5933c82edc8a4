pub mod agenda;
pub mod details;
pub mod export;
pub mod registry;
pub mod schema;
pub mod search_sessions;

pub use agenda::AgendaInfoTool;
pub use details::SessionDetailsTool;
pub use export::ExportTool;
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use search_sessions::SearchSessionsTool;
