//! # API Shared
//!
//! Shared request/response types and utilities for the hemogram APIs.
//!
//! Contains:
//! - Wire types with OpenAPI schemas (`dto` module)
//! - Shared services like `HealthService`
//! - Header authentication and privilege checks
//!
//! Used by `api-rest` and the `hemogram` CLI.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{authenticate, AuthError, Caller};
pub use dto::*;
pub use health::HealthService;
