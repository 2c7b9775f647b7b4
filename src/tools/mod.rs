//! MCP tool plumbing.
//!
//! - `schema`: declarative argument schemas of the built-in tools
//! - `catalog`: deployment-supplied saved query catalog
//! - `dispatcher`: validation, execution and error folding
//! - `normalize`: bounded result payloads
//! - `format`: table/markdown rendering

pub mod catalog;
pub mod dispatcher;
pub mod format;
pub mod normalize;
pub mod schema;

pub use catalog::{CatalogEntry, QueryCatalog};
pub use dispatcher::Dispatcher;
pub use format::OutputFormat;
pub use normalize::{NormalizeOptions, normalize};
pub use schema::{ArgKind, ArgSpec, ToolSchema, ValidatedArgs};
