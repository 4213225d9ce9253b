//! Data models for aarc-dl

pub mod job;

pub use job::{Job, JobId};
