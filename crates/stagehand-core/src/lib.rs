//! Core domain types and traits for the stagehand staging orchestrator.
//!
//! This crate contains:
//! - Guids and common types
//! - Droplet, package, app, process and buildpack models
//! - Lifecycle configuration (buildpack-based and docker-based builds)
//! - The outbound staging wire protocol and the `StagerClient` trait
//! - Process-control and runner traits
//! - Blobstore URL and app log stream abstractions

pub mod app;
pub mod blobstore;
pub mod buildpack;
pub mod droplet;
pub mod error;
pub mod guid;
pub mod lifecycle;
pub mod log_stream;
pub mod package;
pub mod process;
pub mod runtime;
pub mod stager;

pub use error::{Error, Result};
pub use guid::Guid;
