//! Data models for the Lacework MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod credentials;
pub mod payload;
pub mod query;
pub mod response;

// Re-export commonly used types
pub use credentials::{Credentials, DEFAULT_TOKEN_EXPIRY_SECS, Token};
pub use payload::{ApiPayload, AuthPayload, ErrorBody, PageBody, Paging};
pub use query::{CloudProvider, Cursor, QueryRequest, QueryResult, QueryShape, TimeRange};
pub use response::{ToolErrorDetail, ToolResponse, ToolStatus};
