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

//! Warden daemon wiring.
//!
//! Layout: `bootstrap.rs` (configuration, logging and signal wiring),
//! `coordinator.rs` (the deploy coordination event loop).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Deploy coordination event loop.
pub mod coordinator;
/// Application-level error types.
pub mod error;

pub use bootstrap::{run_app, run_app_with};
pub use coordinator::Coordinator;
pub use error::{AppError, AppResult};
