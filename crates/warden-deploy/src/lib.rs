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

//! Manager-endpoint deployment client for the warden daemon.
//!
//! One deployment attempt is one authenticated PUT of the artifact bytes,
//! raced against a cancellation token so a superseding artifact (or
//! shutdown) can abort the upload mid-flight.

pub mod client;
pub mod error;

pub use client::{DeployEngine, DeployOutcome, ManagerClient, basic_auth, deploy_name};
pub use error::DeployError;
