//! Tar image set serialization, deserialization, and resume (component C7,
//! spec.md §4.7, §6).
//!
//! Both [`TarWriter`] and [`TarReader`] implement
//! [`imgshuttle_registry::RegistryBackend`], so the transfer engine and
//! closure resolver treat a tar archive exactly like a registry: the same
//! traversal and copy code runs whether the destination is `oci://` or
//! `dir://`.

#![warn(missing_docs)]

mod error;
mod index;
mod parse;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use index::{blob_path, TarManifestFile, TarManifestImageEntry, TarManifestLayerEntry};
pub use parse::manifest_or_index_from_bytes;
pub use reader::TarReader;
pub use writer::TarWriter;
