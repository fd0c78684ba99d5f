//! # Klavia Common Library
//!
//! Shared code for Klavia services:
//! - Error type used across service boundaries
//! - Root folder and TOML configuration resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
