//! MCP server integration module.
//!
//! This module exposes the Lacework tools over the MCP protocol using the
//! rmcp framework.

pub mod service;

pub use service::LaceworkService;
