//! # AARC Common Library
//!
//! Shared code for the AARC audio archive service including:
//! - Event envelope and job wire types (AarcEvent enum)
//! - Bootstrap configuration loading and root folder resolution
//! - Human-readable duration formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;

pub use error::{Error, Result};
