//! The bounded-concurrency transfer engine itself (component C6,
//! spec.md §4.6), modeled on `crates/ci/src/executor/engine.rs`'s
//! `Semaphore` + `JoinSet` group-execution pattern, reused here as a
//! dependency-ordered generation loop: a bundle (or image index) is only
//! copied once everything it references has already landed at the
//! destination (spec.md §5 ordering guarantees).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use imgshuttle_bundle::BundleDetection;
use imgshuttle_core::{CancelToken, Descriptor, Digest, ImageReference, Manifest, ManifestOrIndex, ProcessedImage, UnprocessedImageRef};
use imgshuttle_registry::{FetchedManifest, MountOutcome, RegistryBackend};
use imgshuttle_sets::{ProcessedSet, UnprocessedSet};
use imgshuttle_tags::TagGenerator;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::skip::SkippedDescriptor;
use crate::{Error, Result};

/// Everything `copy_all` returns: the copied images, plus any blobs
/// deliberately left behind.
#[derive(Default)]
pub struct TransferOutcome {
    /// Images copied to the destination.
    pub processed: ProcessedSet,
    /// Blobs skipped (non-distributable layers not opted in).
    pub skipped: Vec<SkippedDescriptor>,
}

/// Copies a resolved [`UnprocessedSet`] to a single destination repository
/// (spec.md §4.6).
pub struct TransferEngine {
    destination: Arc<dyn RegistryBackend>,
    tag_generator: Arc<dyn TagGenerator>,
    concurrency: usize,
    include_non_distributable: bool,
    destination_registry: String,
    destination_repository: String,
    cancel: CancelToken,
}

/// State shared by every task within a `copy_all` run.
struct Shared {
    dedup: Mutex<HashSet<(String, String)>>,
    skipped: Mutex<Vec<SkippedDescriptor>>,
    resolved: Mutex<HashMap<String, Digest>>,
}

impl TransferEngine {
    /// Build a transfer engine targeting `destination_repo_ref`
    /// (`registry/repository`, no tag or digest).
    pub fn new(
        destination: Arc<dyn RegistryBackend>,
        destination_repo_ref: &str,
        tag_generator: Arc<dyn TagGenerator>,
        concurrency: usize,
        include_non_distributable: bool,
    ) -> Result<Self> {
        let (registry, repository) = split_repo_ref(destination_repo_ref)?;
        Ok(Self {
            destination,
            tag_generator,
            concurrency: concurrency.max(1),
            include_non_distributable,
            destination_registry: registry,
            destination_repository: repository,
            cancel: CancelToken::new(),
        })
    }

    /// Share a cancellation signal with this engine (spec.md §5). Checked
    /// once per dependency-ordered generation, never mid-blob, so
    /// in-flight transfers always finish.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn destination_repo_ref(&self) -> String {
        format!("{}/{}", self.destination_registry, self.destination_repository)
    }

    /// Copy every entry in `unprocessed` to the destination, in an order
    /// that respects bundle/index dependencies.
    pub async fn copy_all(&self, source: Arc<dyn RegistryBackend>, unprocessed: &UnprocessedSet) -> Result<TransferOutcome> {
        let entries = unprocessed.all();
        debug!(count = entries.len(), "classifying entries before transfer");

        let classified = classify_all(Arc::clone(&source), entries, self.concurrency).await?;
        let own_keys: HashSet<String> = classified.iter().map(|c| canonical_key(&c.entry.digest_ref)).collect();

        let shared = Arc::new(Shared {
            dedup: Mutex::new(HashSet::new()),
            skipped: Mutex::new(Vec::new()),
            resolved: Mutex::new(HashMap::new()),
        });
        let processed = ProcessedSet::new();

        let mut remaining = classified;
        while !remaining.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut ready = Vec::new();
            let mut pending = Vec::new();
            {
                let resolved = shared.resolved.lock().await;
                for c in remaining {
                    let blocked = c
                        .depends_on
                        .iter()
                        .any(|dep| own_keys.contains(dep) && !resolved.contains_key(dep));
                    if blocked {
                        pending.push(c);
                    } else {
                        ready.push(c);
                    }
                }
            }

            if ready.is_empty() {
                return Err(Error::InternalInconsistency(
                    "transfer dependency graph made no progress; cycle or unresolved reference".to_string(),
                ));
            }

            debug!(generation_size = ready.len(), "copying transfer generation");
            let resolved_snapshot = shared.resolved.lock().await.clone();
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let mut join_set = JoinSet::new();

            for classified in ready {
                let source = Arc::clone(&source);
                let destination = Arc::clone(&self.destination);
                let tag_generator = Arc::clone(&self.tag_generator);
                let semaphore = Arc::clone(&semaphore);
                let shared = Arc::clone(&shared);
                let dest_repo_ref = self.destination_repo_ref();
                let include_non_distributable = self.include_non_distributable;
                let resolved_snapshot = resolved_snapshot.clone();

                join_set.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed during a transfer run");
                    let entry = classified.entry.clone();
                    let image = copy_classified(
                        source.as_ref(),
                        destination.as_ref(),
                        tag_generator.as_ref(),
                        &dest_repo_ref,
                        include_non_distributable,
                        &resolved_snapshot,
                        shared.as_ref(),
                        classified,
                    )
                    .await?;
                    Ok::<_, Error>((entry, image))
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (entry, image) = joined.map_err(|e| Error::TaskPanic(e.to_string()))??;
                if let Some(digest) = image.digest_ref.digest() {
                    shared
                        .resolved
                        .lock()
                        .await
                        .insert(canonical_key(&entry.digest_ref), digest.clone());
                }
                processed.add(image);
            }

            remaining = pending;
        }

        Ok(TransferOutcome {
            processed,
            skipped: shared.skipped.lock().await.clone(),
        })
    }
}

enum Kind {
    Plain,
    Bundle(BundleDetection),
    Index,
}

struct Classified {
    entry: UnprocessedImageRef,
    fetched: FetchedManifest,
    kind: Kind,
    depends_on: Vec<String>,
}

fn canonical_key(r: &ImageReference) -> String {
    match r.digest() {
        Some(d) => format!("{}@{d}", r.repo_ref()),
        None => r.repo_ref(),
    }
}

fn split_repo_ref(s: &str) -> Result<(String, String)> {
    let Some((registry, repository)) = s.split_once('/') else {
        return Err(Error::InvalidDestination(s.to_string()));
    };
    if registry.is_empty() || repository.is_empty() {
        return Err(Error::InvalidDestination(s.to_string()));
    }
    Ok((registry.to_string(), repository.to_string()))
}

async fn classify_all(source: Arc<dyn RegistryBackend>, entries: Vec<UnprocessedImageRef>, concurrency: usize) -> Result<Vec<Classified>> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for entry in entries {
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed during classification");
            classify_one(source.as_ref(), entry).await
        });
    }

    let mut out = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        out.push(joined.map_err(|e| Error::TaskPanic(e.to_string()))??);
    }
    Ok(out)
}

async fn classify_one(source: &dyn RegistryBackend, entry: UnprocessedImageRef) -> Result<Classified> {
    let repo_ref = entry.digest_ref.repo_ref();
    let digest = entry
        .digest_ref
        .digest()
        .ok_or_else(|| Error::InternalInconsistency(format!("unprocessed entry without digest: {}", entry.digest_ref)))?
        .clone();

    let fetched = source.pull_manifest(&repo_ref, &digest).await?;

    match &fetched.parsed {
        ManifestOrIndex::Index(index) => {
            let depends_on = index.manifests.iter().map(|d| format!("{repo_ref}@{}", d.digest)).collect();
            Ok(Classified {
                entry,
                fetched,
                kind: Kind::Index,
                depends_on,
            })
        }
        ManifestOrIndex::Manifest(_) => {
            let detection = imgshuttle_bundle::detect(source, &repo_ref, &fetched.parsed).await?;
            let depends_on = if detection.is_bundle {
                detection
                    .lockfile
                    .as_ref()
                    .map(|lock| {
                        lock.images
                            .iter()
                            .filter_map(|e| ImageReference::parse_digested(&e.image).ok())
                            .map(|r| canonical_key(&r))
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            Ok(Classified {
                entry,
                fetched,
                kind: Kind::Bundle(detection),
                depends_on,
            })
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn copy_classified(
    source: &dyn RegistryBackend,
    destination: &dyn RegistryBackend,
    tag_generator: &dyn TagGenerator,
    dest_repo_ref: &str,
    include_non_distributable: bool,
    resolved: &HashMap<String, Digest>,
    shared: &Shared,
    classified: Classified,
) -> Result<ProcessedImage> {
    let Classified { entry, fetched, kind, .. } = classified;

    let repo_ref = entry.digest_ref.repo_ref();
    let tag = tag_generator.generate(&entry.digest_ref);

    match kind {
        Kind::Index => {
            let ManifestOrIndex::Index(index) = &fetched.parsed else {
                return Err(Error::InternalInconsistency("classified as index but parsed as manifest".to_string()));
            };
            let digest = destination.push_manifest(dest_repo_ref, &fetched.media_type, &fetched.raw).await?;
            let dest_ref = ImageReference::parse_digested(&format!("{dest_repo_ref}:{tag}@{digest}"))?;
            Ok(ProcessedImage {
                unprocessed: entry,
                digest_ref: dest_ref,
                image: None,
                image_index: Some(index.clone()),
            })
        }
        Kind::Bundle(detection) if detection.is_bundle => {
            rewrite_and_push_bundle(source, destination, &repo_ref, dest_repo_ref, &tag, entry, &fetched, detection, resolved, include_non_distributable, shared).await
        }
        Kind::Bundle(_) | Kind::Plain => {
            copy_plain_manifest(source, destination, &repo_ref, dest_repo_ref, &tag, entry, &fetched, include_non_distributable, shared).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn copy_plain_manifest(
    source: &dyn RegistryBackend,
    destination: &dyn RegistryBackend,
    repo_ref: &str,
    dest_repo_ref: &str,
    tag: &str,
    entry: UnprocessedImageRef,
    fetched: &FetchedManifest,
    include_non_distributable: bool,
    shared: &Shared,
) -> Result<ProcessedImage> {
    let ManifestOrIndex::Manifest(m) = &fetched.parsed else {
        return Err(Error::InternalInconsistency("classified as plain manifest but parsed as index".to_string()));
    };

    copy_blob(source, destination, repo_ref, dest_repo_ref, &m.config, include_non_distributable, shared).await?;
    for layer in &m.layers {
        copy_blob(source, destination, repo_ref, dest_repo_ref, layer, include_non_distributable, shared).await?;
    }

    let digest = destination.push_manifest(dest_repo_ref, &fetched.media_type, &fetched.raw).await?;
    let dest_ref = ImageReference::parse_digested(&format!("{dest_repo_ref}:{tag}@{digest}"))?;

    Ok(ProcessedImage {
        unprocessed: entry,
        digest_ref: dest_ref,
        image: Some(m.clone()),
        image_index: None,
    })
}

#[allow(clippy::too_many_arguments)]
async fn rewrite_and_push_bundle(
    source: &dyn RegistryBackend,
    destination: &dyn RegistryBackend,
    repo_ref: &str,
    dest_repo_ref: &str,
    tag: &str,
    entry: UnprocessedImageRef,
    fetched: &FetchedManifest,
    detection: BundleDetection,
    resolved: &HashMap<String, Digest>,
    include_non_distributable: bool,
    shared: &Shared,
) -> Result<ProcessedImage> {
    let ManifestOrIndex::Manifest(m) = &fetched.parsed else {
        return Err(Error::InternalInconsistency("classified as bundle but parsed as index".to_string()));
    };
    let lockfile_layer_index = detection
        .lockfile_layer_index
        .ok_or_else(|| Error::InternalInconsistency("bundle detected with no lockfile layer index".to_string()))?;
    let lockfile = detection
        .lockfile
        .ok_or_else(|| Error::InternalInconsistency("bundle detected with no lockfile".to_string()))?;
    let config = detection
        .config
        .ok_or_else(|| Error::InternalInconsistency("bundle detected with no config".to_string()))?;

    for (idx, layer) in m.layers.iter().enumerate() {
        if idx == lockfile_layer_index {
            continue;
        }
        copy_blob(source, destination, repo_ref, dest_repo_ref, layer, include_non_distributable, shared).await?;
    }

    warn!(%repo_ref, "copying bundle, rewriting embedded lockfile to destination digests");

    let new_lock = lockfile.rewritten::<Error, _>(|src_ref| {
        let parsed = ImageReference::parse_digested(src_ref)?;
        let key = canonical_key(&parsed);
        let dest_digest = resolved
            .get(&key)
            .ok_or_else(|| Error::InternalInconsistency(format!("bundle references unresolved image {key}")))?;
        Ok(format!("{dest_repo_ref}@{dest_digest}"))
    })?;

    let rewritten = imgshuttle_bundle::rewrite(&new_lock, lockfile_layer_index, config, &fetched.raw)?;

    destination.push_blob(dest_repo_ref, &rewritten.layer_descriptor.digest, rewritten.layer_bytes.clone()).await?;
    destination.push_blob(dest_repo_ref, &rewritten.config_descriptor.digest, rewritten.config_bytes.clone()).await?;

    let digest = destination.push_manifest(dest_repo_ref, &m.media_type, &rewritten.manifest_bytes).await?;
    let dest_ref = ImageReference::parse_digested(&format!("{dest_repo_ref}:{tag}@{digest}"))?;

    let mut layers = m.layers.clone();
    layers[lockfile_layer_index] = rewritten.layer_descriptor;

    Ok(ProcessedImage {
        unprocessed: entry,
        digest_ref: dest_ref,
        image: Some(Manifest {
            media_type: m.media_type.clone(),
            config: rewritten.config_descriptor,
            layers,
            annotations: m.annotations.clone(),
        }),
        image_index: None,
    })
}

async fn copy_blob(
    source: &dyn RegistryBackend,
    destination: &dyn RegistryBackend,
    source_repo_ref: &str,
    dest_repo_ref: &str,
    descriptor: &Descriptor,
    include_non_distributable: bool,
    shared: &Shared,
) -> Result<()> {
    if is_non_distributable(&descriptor.media_type) && !include_non_distributable {
        shared.skipped.lock().await.push(SkippedDescriptor {
            digest: descriptor.digest.clone(),
            media_type: descriptor.media_type.clone(),
            repo_ref: source_repo_ref.to_string(),
            reason: "non-distributable layer".to_string(),
        });
        warn!(digest = %descriptor.digest, media_type = %descriptor.media_type, "skipping non-distributable layer");
        return Ok(());
    }

    let key = (dest_repo_ref.to_string(), descriptor.digest.hex().to_string());
    {
        let mut dedup = shared.dedup.lock().await;
        if !dedup.insert(key) {
            return Ok(());
        }
    }

    if destination.blob_exists(dest_repo_ref, &descriptor.digest).await? {
        debug!(digest = %descriptor.digest, "blob already present at destination");
        return Ok(());
    }

    if same_host(source_repo_ref, dest_repo_ref) {
        if let MountOutcome::Mounted = destination.mount_blob(dest_repo_ref, source_repo_ref, &descriptor.digest).await? {
            debug!(digest = %descriptor.digest, "mounted blob across repositories");
            return Ok(());
        }
    }

    let data = source.pull_blob(source_repo_ref, &descriptor.digest).await?;
    destination.push_blob(dest_repo_ref, &descriptor.digest, data).await?;
    Ok(())
}

fn is_non_distributable(media_type: &str) -> bool {
    media_type.contains("nondistributable") || media_type.contains("foreign")
}

fn same_host(a: &str, b: &str) -> bool {
    a.split('/').next() == b.split('/').next()
}
