#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Deployment-target configuration for the warden daemon.
//!
//! Layout: `model.rs` (typed target model and identity key), `loader.rs`
//! (JSON file loading and validation), `registry.rs` (read-only pattern
//! lookup table built once at startup).

pub mod error;
pub mod loader;
pub mod model;
pub mod registry;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use model::{DeployTarget, TargetKey};
pub use registry::{FolderPattern, PatternRegistry};
