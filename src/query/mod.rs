//! Query execution against the Lacework API.
//!
//! [`builder`] turns a validated request into API calls; [`QueryExecutor`]
//! drives them with authentication and pagination.

pub mod builder;
pub mod executor;

pub use builder::format_timestamp;
pub use executor::{DEFAULT_MAX_PAGES, QueryExecutor};
