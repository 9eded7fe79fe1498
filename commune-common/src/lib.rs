//! # Commune Common Library
//!
//! Shared code for the Commune community platform including:
//! - Database schema, migrations and domain models
//! - Magic-link and session token primitives
//! - Authorization policy (who may manage which community)
//! - Configuration loading
//! - Utility functions

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod policy;
pub mod time;

pub use error::{Error, Result};
pub use policy::Access;
