//! Command-line surface (spec.md §6 "Operational surface").
//!
//! A thin `clap` layer: parsing and validating raw flags into a
//! [`CopyConfig`], nothing else. All copy logic lives in [`crate::orchestrator`].

use std::path::PathBuf;

use clap::Parser;

use crate::config::{CopyConfig, Destination, LockOutputTarget, Source};
use crate::{Error, Result};

/// Relocate OCI images and bundles between registries and tar archives.
#[derive(Debug, Parser)]
#[command(name = "imgshuttle", version, about)]
pub struct Args {
    /// Copy a single image reference (tagged or digested).
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Copy a bundle, marking it as the run's root bundle.
    #[arg(long, value_name = "BUNDLE")]
    pub bundle: Option<String>,

    /// Copy every image named in an on-disk `ImagesLock` or `BundleLock`.
    #[arg(long, value_name = "PATH")]
    pub lockfile: Option<PathBuf>,

    /// Copy every image in an existing tar image set.
    #[arg(long, value_name = "PATH")]
    pub tar: Option<PathBuf>,

    /// Destination repository (`registry/repository`, no tag or digest).
    #[arg(long, value_name = "REPO")]
    pub to_repo: Option<String>,

    /// Destination tar image set path.
    #[arg(long, value_name = "PATH")]
    pub to_tar: Option<PathBuf>,

    /// Number of concurrent blob/manifest operations.
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Copy OCI non-distributable (foreign) layers instead of skipping them.
    #[arg(long)]
    pub include_non_distributable: bool,

    /// Resume an interrupted tar write, skipping blobs already present.
    #[arg(long)]
    pub resume: bool,

    /// Derive destination tags from the source repository path instead of
    /// the default (source-tag-or-digest-shorthand) policy.
    #[arg(long)]
    pub repo_based_tags: bool,

    /// Discover and copy signature artifacts alongside each image.
    #[arg(long)]
    pub include_signatures: bool,

    /// Write the resulting lock document to this path, or `-` for stdout.
    #[arg(long, value_name = "PATH")]
    pub lock_output: Option<String>,

    /// Increase log verbosity (`-v`, `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse `std::env::args`.
#[must_use]
pub fn parse() -> Args {
    Args::parse()
}

impl Args {
    /// Validate the raw flags' arity and convert into a [`CopyConfig`].
    ///
    /// Cross-cutting rules that need the resolved `Destination` (resume
    /// requiring a tar destination, lock-output requiring a repo
    /// destination) are checked again in
    /// [`crate::orchestrator::run`] — this only rules out flag
    /// combinations that are never valid regardless of destination.
    pub fn into_config(self) -> Result<CopyConfig> {
        let source = self.source()?;
        let destination = self.destination()?;

        let lock_output = match self.lock_output.as_deref() {
            Some("-") => Some(LockOutputTarget::Stdout),
            Some(path) => Some(LockOutputTarget::Path(PathBuf::from(path))),
            None => None,
        };

        Ok(CopyConfig {
            source,
            destination,
            concurrency: self.concurrency,
            include_non_distributable: self.include_non_distributable,
            resume: self.resume,
            repo_based_tags: self.repo_based_tags,
            include_signatures: self.include_signatures,
            lock_output,
        })
    }

    fn source(&self) -> Result<Source> {
        let mut present = Vec::new();
        if let Some(v) = &self.image {
            present.push(Source::Image(v.clone()));
        }
        if let Some(v) = &self.bundle {
            present.push(Source::Bundle(v.clone()));
        }
        if let Some(v) = &self.lockfile {
            present.push(Source::Lockfile(v.clone()));
        }
        if let Some(v) = &self.tar {
            present.push(Source::Tar(v.clone()));
        }

        match present.len() {
            1 => Ok(present.into_iter().next().expect("length checked above")),
            0 => Err(Error::SourceConflict(
                "exactly one of --image, --bundle, --lockfile, --tar is required".to_string(),
            )),
            n => Err(Error::SourceConflict(format!(
                "exactly one of --image, --bundle, --lockfile, --tar is required, got {n}"
            ))),
        }
    }

    fn destination(&self) -> Result<Destination> {
        match (&self.to_repo, &self.to_tar) {
            (Some(repo), None) => Ok(Destination::Repo(repo.clone())),
            (None, Some(path)) => Ok(Destination::Tar(path.clone())),
            (None, None) => Err(Error::DestinationConflict(
                "exactly one of --to-repo, --to-tar is required".to_string(),
            )),
            (Some(_), Some(_)) => Err(Error::DestinationConflict(
                "--to-repo and --to-tar are mutually exclusive".to_string(),
            )),
        }
    }
}
