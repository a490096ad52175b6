//! Registry capability trait and `oci-distribution`-backed client.
//!
//! The transfer engine, closure resolver, and bundle detector all depend
//! only on [`RegistryBackend`], never on [`OciDistributionBackend`]
//! directly, so a tar-backed source (imgshuttle-tar) can satisfy the same
//! trait (spec.md §4.7).

#![warn(missing_docs)]

mod auth;
mod backend;
mod client;
mod convert;
mod error;
mod signature;

pub use auth::auth_for_host;
pub use backend::{FetchedManifest, MountOutcome, RegistryBackend};
pub use client::OciDistributionBackend;
pub use error::{Error, Result};
pub use signature::{NoopSignatureFetcher, SignatureArtifact, SignatureFetcher};
