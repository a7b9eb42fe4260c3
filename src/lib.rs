//! vocab-assist: background vocabulary builder core.

pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod jobs;
pub mod store;
pub mod tasks;
