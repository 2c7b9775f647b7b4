//! Authentication session management.
//!
//! This module owns the short-lived bearer token derived from the account
//! credentials. See [`TokenManager`].

pub mod token_manager;

pub use token_manager::{DEFAULT_SAFETY_MARGIN, TokenManager};
