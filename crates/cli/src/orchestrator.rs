//! The orchestrator itself (component C9, spec.md §4.9).
//!
//! Validates the source/destination combination, then runs the resolver,
//! the transfer engine (or tar writer), and the lock writer in strict
//! sequence — the same validate-then-run-then-report shape as the
//! teacher's executor engines (`EngineConfig` -> `EngineResult`).

use std::io::Write;
use std::sync::Arc;

use imgshuttle_bundle::ImagesLock;
use imgshuttle_core::CancelToken;
use imgshuttle_registry::{NoopSignatureFetcher, OciDistributionBackend, RegistryBackend, SignatureFetcher};
use imgshuttle_resolver::{ClosureResolver, CopyOrigin};
use imgshuttle_tags::{DefaultTagGenerator, RepoBasedTagGenerator, TagGenerator};
use imgshuttle_tar::{TarReader, TarWriter};
use imgshuttle_transfer::{SkippedDescriptor, TransferEngine};
use tracing::{info, warn};

use crate::config::{CopyConfig, Destination, LockOutputTarget, Source};
use crate::{Error, Result};

/// Placeholder destination `registry/repository` handed to
/// `TransferEngine` when the real destination is a tar archive —
/// `TarWriter`'s `RegistryBackend` impl ignores the `repo_ref` argument
/// entirely (spec.md §4.7), so any validly-shaped string works.
const TAR_DESTINATION_REPO_REF: &str = "archive/images";

/// Everything the orchestrator did, for the CLI's human-readable summary
/// (spec.md §4.9: "produces a user-visible summary").
#[derive(Debug)]
pub struct Summary {
    /// Number of images (manifests/indices) copied to the destination.
    pub images_copied: usize,
    /// Blobs deliberately left uncopied (spec.md §4.6).
    pub skipped: Vec<SkippedDescriptor>,
    /// Where the lock output was written, if one was requested.
    pub lock_output_written_to: Option<String>,
}

/// Validate `config`, then run resolver -> transfer-or-tar -> lock writer
/// in strict sequence (spec.md §4.9, §7: "validation errors surface
/// before any I/O"). `cancel`, once triggered, stops the run between
/// (never mid-) generations of the resolver and transfer engine and the
/// run returns `Error::Cancelled` (spec.md §5, §7).
pub async fn run(config: CopyConfig, cancel: CancelToken) -> Result<Summary> {
    validate(&config)?;

    let (origin, source_lockfile, source_backend) = build_origin(&config.source)?;

    let signatures: Arc<dyn SignatureFetcher> = Arc::new(NoopSignatureFetcher);
    if config.include_signatures {
        warn!(
            "signature inclusion requested, but no signature fetcher is wired into this binary \
             (spec.md §1: the cosign scheme is an external collaborator); continuing without signatures"
        );
    }

    let resolver = ClosureResolver::new(Arc::clone(&source_backend), signatures, config.concurrency)
        .with_cancel_token(cancel.clone());
    info!("resolving transitive closure");
    let unprocessed = resolver.resolve(origin).await?;
    info!(count = unprocessed.len(), "closure resolved");

    let tag_generator: Arc<dyn TagGenerator> = if config.repo_based_tags {
        Arc::new(RepoBasedTagGenerator)
    } else {
        Arc::new(DefaultTagGenerator)
    };

    let (destination_backend, destination_repo_ref, tar_writer) =
        open_destination(&config.destination, config.resume)?;

    let engine = TransferEngine::new(
        Arc::clone(&destination_backend),
        &destination_repo_ref,
        tag_generator,
        config.concurrency,
        config.include_non_distributable,
    )?
    .with_cancel_token(cancel);

    info!("copying closure to destination");
    let outcome = engine.copy_all(Arc::clone(&source_backend), &unprocessed).await?;
    info!(
        copied = outcome.processed.len(),
        skipped = outcome.skipped.len(),
        "transfer complete"
    );

    for skip in &outcome.skipped {
        warn!(
            digest = %skip.digest,
            media_type = %skip.media_type,
            repo_ref = %skip.repo_ref,
            "non-distributable layer skipped"
        );
    }

    if let Some(writer) = &tar_writer {
        writer.finalize(&outcome.processed).await?;
    }

    let lock_output_written_to = match &config.lock_output {
        Some(target) => {
            let output = imgshuttle_lock::write_lock(
                destination_backend.as_ref(),
                &outcome.processed,
                source_lockfile.as_ref(),
            )
            .await?;
            let bytes = output.to_yaml()?;
            Some(write_lock_target(target, &bytes)?)
        }
        None => None,
    };

    Ok(Summary {
        images_copied: outcome.processed.len(),
        skipped: outcome.skipped,
        lock_output_written_to,
    })
}

fn write_lock_target(target: &LockOutputTarget, bytes: &[u8]) -> Result<String> {
    match target {
        LockOutputTarget::Stdout => {
            std::io::stdout().write_all(bytes)?;
            Ok("-".to_string())
        }
        LockOutputTarget::Path(path) => {
            std::fs::write(path, bytes)?;
            Ok(path.display().to_string())
        }
    }
}

/// Build the closure resolver's origin, the source-side registry backend,
/// and (when the source is a user-supplied `ImagesLock`) the parsed
/// lockfile, kept so the lock writer can later preserve its ordering
/// (spec.md §4.8 step 3).
#[allow(clippy::type_complexity)]
fn build_origin(source: &Source) -> Result<(CopyOrigin, Option<ImagesLock>, Arc<dyn RegistryBackend>)> {
    match source {
        Source::Image(s) => Ok((
            CopyOrigin::Image(s.clone()),
            None,
            Arc::new(OciDistributionBackend::new()),
        )),
        Source::Bundle(s) => Ok((
            CopyOrigin::Bundle(s.clone()),
            None,
            Arc::new(OciDistributionBackend::new()),
        )),
        Source::Lockfile(path) => {
            let bytes = std::fs::read(path)?;
            // A `BundleLock` document has no top-level `images` key and
            // fails to deserialize as an `ImagesLock`; `Ok(None)` here
            // just means "this was a BundleLock", not an error.
            let parsed_images_lock = ImagesLock::from_yaml(&bytes).ok();
            Ok((
                CopyOrigin::Lockfile(path.clone()),
                parsed_images_lock,
                Arc::new(OciDistributionBackend::new()),
            ))
        }
        Source::Tar(path) => {
            let reader = TarReader::open(path)?;
            let entries = reader.seed_refs()?;
            Ok((CopyOrigin::Tar(entries), None, Arc::new(reader)))
        }
    }
}

#[allow(clippy::type_complexity)]
fn open_destination(destination: &Destination, resume: bool) -> Result<(Arc<dyn RegistryBackend>, String, Option<Arc<TarWriter>>)> {
    match destination {
        Destination::Repo(repo_ref) => Ok((Arc::new(OciDistributionBackend::new()), repo_ref.clone(), None)),
        Destination::Tar(path) => {
            // `resume` is already validated to only apply to a tar
            // destination by this point (spec.md §4.9).
            let writer = Arc::new(TarWriter::open(path, resume)?);
            Ok((
                Arc::clone(&writer) as Arc<dyn RegistryBackend>,
                TAR_DESTINATION_REPO_REF.to_string(),
                Some(writer),
            ))
        }
    }
}

/// spec.md §4.9: "exactly one source, exactly one destination, `resume`
/// only with tar destination, `lock-output` only with repo destination,
/// `--tar` source disjoint from `--to-tar` destination." Source and
/// destination arity are enforced one layer up, by `cli::parse` building
/// a single `Source`/`Destination` value in the first place; this
/// function checks the combinations that remain possible across them.
fn validate(config: &CopyConfig) -> Result<()> {
    if config.resume && !matches!(config.destination, Destination::Tar(_)) {
        return Err(Error::ResumeRequiresTarDst);
    }
    if config.lock_output.is_some() && !matches!(config.destination, Destination::Repo(_)) {
        return Err(Error::LockOutputRequiresRepoDst);
    }
    if let (Source::Tar(source_path), Destination::Tar(dest_path)) = (&config.source, &config.destination) {
        if source_path == dest_path {
            return Err(Error::DestinationConflict(format!(
                "source tar and destination tar are the same path: {}",
                source_path.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn base_config() -> CopyConfig {
        CopyConfig {
            source: Source::Image("registry.a/app@sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string()),
            destination: Destination::Repo("registry.b/app".to_string()),
            concurrency: 4,
            include_non_distributable: false,
            resume: false,
            repo_based_tags: false,
            include_signatures: false,
            lock_output: None,
        }
    }

    #[test]
    fn accepts_a_plain_image_to_repo_copy() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn resume_requires_tar_destination() {
        let mut config = base_config();
        config.resume = true;
        assert!(matches!(validate(&config), Err(Error::ResumeRequiresTarDst)));
    }

    #[test]
    fn resume_is_fine_with_tar_destination() {
        let mut config = base_config();
        config.resume = true;
        config.destination = Destination::Tar(PathBuf::from("/tmp/out.tar"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn lock_output_requires_repo_destination() {
        let mut config = base_config();
        config.destination = Destination::Tar(PathBuf::from("/tmp/out.tar"));
        config.lock_output = Some(LockOutputTarget::Stdout);
        assert!(matches!(validate(&config), Err(Error::LockOutputRequiresRepoDst)));
    }

    #[test]
    fn rejects_identical_source_and_destination_tar_paths() {
        let mut config = base_config();
        config.source = Source::Tar(PathBuf::from("/tmp/same.tar"));
        config.destination = Destination::Tar(PathBuf::from("/tmp/same.tar"));
        assert!(matches!(validate(&config), Err(Error::DestinationConflict(_))));
    }

    #[test]
    fn accepts_distinct_source_and_destination_tar_paths() {
        let mut config = base_config();
        config.source = Source::Tar(PathBuf::from("/tmp/a.tar"));
        config.destination = Destination::Tar(PathBuf::from("/tmp/b.tar"));
        assert!(validate(&config).is_ok());
    }
}
