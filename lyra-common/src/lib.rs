//! # Lyra Common Library
//!
//! Shared code for Lyra services:
//! - Error taxonomy
//! - Bootstrap configuration loading
//! - Enrichment event types and EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
