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

//! Single-shot folder watching for the warden daemon.
//!
//! A watcher subscribes to close-for-write events on one folder, reports
//! the first artifact that matches the folder's patterns, and exits. The
//! coordinator owns respawning, so a folder is never subscribed twice.

pub mod error;
pub mod watcher;

pub use error::WatchError;
pub use watcher::{ArtifactWatcher, NotifyWatcher, WatchResult, WatcherHandle};
