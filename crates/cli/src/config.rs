//! Orchestrator config (component C9, spec.md §4.9, §6 "Operational
//! surface").

use std::path::PathBuf;

/// Where a copy run's images are discovered from (spec.md §4.4 step 1).
#[derive(Debug, Clone)]
pub enum Source {
    /// A single digested (or tagged) image reference.
    Image(String),
    /// A bundle reference, marked as the root bundle (spec.md §6).
    Bundle(String),
    /// An on-disk `ImagesLock` or `BundleLock` YAML file.
    Lockfile(PathBuf),
    /// An existing tar image set.
    Tar(PathBuf),
}

/// Where a copy run's images are written to.
#[derive(Debug, Clone)]
pub enum Destination {
    /// `registry/repository`, with neither tag nor digest.
    Repo(String),
    /// A tar image set path.
    Tar(PathBuf),
}

/// Where the lock output, if any, should be written (spec.md §3 "an
/// ambient CLI ergonomics" addition: `--lock-output -` means stdout).
#[derive(Debug, Clone)]
pub enum LockOutputTarget {
    /// Write to this path.
    Path(PathBuf),
    /// Write to standard output.
    Stdout,
}

/// Everything a copy run needs (spec.md §6's operational surface,
/// realized as a config struct the way the teacher's `EngineConfig`
/// carries its executor's knobs).
#[derive(Debug, Clone)]
pub struct CopyConfig {
    /// Where images are discovered from.
    pub source: Source,
    /// Where images are written to.
    pub destination: Destination,
    /// Worker pool size bounding outstanding blob/manifest operations.
    pub concurrency: usize,
    /// Copy OCI non-distributable layers instead of skipping them.
    pub include_non_distributable: bool,
    /// Resume an interrupted tar write.
    pub resume: bool,
    /// Use the repo-based tag generator instead of the default one.
    pub repo_based_tags: bool,
    /// Discover and copy signature artifacts alongside each image.
    pub include_signatures: bool,
    /// Where to write the post-copy lock output, if requested.
    pub lock_output: Option<LockOutputTarget>,
}
