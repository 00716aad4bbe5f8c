//! The image coordinator.
//!
//! Two halves, bracketing plan execution:
//!
//! - **Pre-fetch** (synchronous barrier): before the executor runs, every
//!   existing image on a slide that will be updated is downloaded in
//!   parallel so the content synchroniser can compare real bytes instead
//!   of guessing from URLs. Fails fast; a pre-fetch error aborts the
//!   Apply before any upload starts.
//! - **Background upload** (overlapped): new image blobs upload in
//!   parallel while the executor works through the plan. The executor
//!   blocks per image, via [`Image::upload_info`], only at the moment it
//!   needs that image's URL. Completed uploads flow to a cleanup channel
//!   and are deleted again once the Apply finishes, because the remote
//!   service copies image content on ingestion.
//!
//! Both halves bound their parallelism with a semaphore; workers never
//! hold any lock other than the image's own state lock.

pub mod command;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ApplyError, CleanupError, FetchError, UploadError};
use crate::model::image::{MatchOptions, Mime, UploadState};
use crate::model::{Image, ImageCache};
use crate::remote::{ElementKind, Page, RemoteSlides};

pub use command::CommandUploader;

/// Fixed prefix of synthetic upload filenames.
pub const UPLOAD_FILENAME_PREFIX: &str = "deck-sync-";

// =============================================================================
// Uploader trait
// =============================================================================

/// Handle to a successfully uploaded transient resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedResource {
    pub resource_id: String,
}

/// The image uploader collaborator.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload raw bytes; returns the public URL and an opaque resource
    /// id used only for cleanup.
    async fn upload(
        &self,
        bytes: Bytes,
        mime: Mime,
        filename: &str,
    ) -> Result<(String, String), UploadError>;

    /// Delete a previously uploaded resource.
    async fn delete(&self, resource_id: &str) -> Result<(), UploadError>;
}

/// Synthetic filename for an upload: fixed prefix plus a timestamp.
pub fn upload_filename(mime: Mime) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{UPLOAD_FILENAME_PREFIX}{nanos}.{}", mime.extension())
}

// =============================================================================
// Pre-fetch
// =============================================================================

/// Pre-fetched images of one slide, in element order.
#[derive(Debug, Default)]
pub struct SlideImages {
    pub images: Vec<Arc<Image>>,
    /// Remote object id per image, parallel to `images`.
    pub object_ids: Vec<String>,
}

impl SlideImages {
    /// Find the first image equivalent to `img`, skipping positions in
    /// `used`.
    pub fn find_equivalent(
        &self,
        img: &Image,
        opts: &MatchOptions,
        used: &[bool],
    ) -> Option<usize> {
        self.images
            .iter()
            .enumerate()
            .find(|(pos, existing)| !used[*pos] && existing.equivalent(img, opts))
            .map(|(pos, _)| pos)
    }
}

/// Pre-fetched images keyed by the slide index of the update action that
/// will consume them.
#[derive(Debug, Default)]
pub struct Prefetched {
    by_slide: HashMap<usize, SlideImages>,
}

impl Prefetched {
    pub fn for_slide(&self, slide_index: usize) -> Option<&SlideImages> {
        self.by_slide.get(&slide_index)
    }

    pub fn is_empty(&self) -> bool {
        self.by_slide.is_empty()
    }
}

/// Download every Markdown-managed image on the given pages in parallel.
///
/// `targets` maps the update action's slide index to the page it will
/// rewrite. Parallelism is bounded by `workers`; the first failure
/// aborts all remaining downloads. Blobs go through the process-global
/// image cache keyed by content URL, so a watch loop that re-applies
/// the same deck does not re-download unchanged pictures.
pub async fn prefetch<R: RemoteSlides + 'static>(
    remote: &Arc<R>,
    targets: &HashMap<usize, Page>,
    workers: usize,
    cancel: &CancellationToken,
) -> Result<Prefetched, ApplyError> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks: JoinSet<Result<(usize, usize, String, Arc<Image>), ApplyError>> = JoinSet::new();

    for (&slide_index, page) in targets {
        for (elem_index, el) in page.markdown_images().into_iter().enumerate() {
            let ElementKind::Image(img) = &el.kind else {
                continue;
            };
            let semaphore = semaphore.clone();
            let remote = remote.clone();
            let cancel = cancel.clone();
            let object_id = el.object_id.clone();
            let url = img.content_url.clone();
            let link = img.link.clone();
            let mime = img.mime.or_else(|| guess_mime(&url));

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if cancel.is_cancelled() {
                    return Err(ApplyError::Cancelled);
                }
                if let Some(cached) = ImageCache::global().get(&url) {
                    return Ok((slide_index, elem_index, object_id, cached));
                }
                let mime = mime.ok_or_else(|| {
                    ApplyError::Fetch(FetchError::UnknownMime(url.clone()))
                })?;
                let bytes = tokio::select! {
                    _ = cancel.cancelled() => return Err(ApplyError::Cancelled),
                    result = remote.download(&url) => result?,
                };
                let mut image = Image::new(bytes, mime)
                    .with_source_url(url.clone())
                    .with_from_markdown(true);
                if let Some(link) = link {
                    image = image.with_external_link(link);
                }
                let image = Arc::new(image);
                ImageCache::global().store(url, image.clone());
                Ok((slide_index, elem_index, object_id, image))
            });
        }
    }

    // Collect in completion order, then restore element order per slide.
    let mut fetched: Vec<(usize, usize, String, Arc<Image>)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(entry)) => fetched.push(entry),
            Ok(Err(err)) => {
                tasks.abort_all();
                return Err(err);
            }
            Err(join_err) => {
                tasks.abort_all();
                return Err(ApplyError::Fetch(FetchError::Download {
                    url: String::new(),
                    reason: join_err.to_string(),
                }));
            }
        }
    }

    fetched.sort_by_key(|(slide, elem, _, _)| (*slide, *elem));

    let mut result = Prefetched::default();
    for (slide_index, _, object_id, image) in fetched {
        let entry = result.by_slide.entry(slide_index).or_default();
        entry.images.push(image);
        entry.object_ids.push(object_id);
    }
    debug!(
        slides = result.by_slide.len(),
        "pre-fetched existing images"
    );
    Ok(result)
}

fn guess_mime(url: &str) -> Option<Mime> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Mime::parse(path.rsplit('.').next()?)
}

// =============================================================================
// Background upload
// =============================================================================

/// Mark the images `InProgress` and spawn the background upload pool.
///
/// Marking happens synchronously in the caller's context so the executor
/// can rely on every scheduled image having left `NotStarted` before the
/// first action runs. Workers never abort mid-transfer: cancellation
/// fails images that have not started and lets running uploads finish.
pub fn start_uploads<U: Uploader + 'static>(
    uploader: Arc<U>,
    images: Vec<Arc<Image>>,
    workers: usize,
    cancel: CancellationToken,
    uploaded_tx: mpsc::UnboundedSender<UploadedResource>,
) -> JoinHandle<()> {
    for image in &images {
        image.mark_in_progress();
    }

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    tokio::spawn(async move {
        let mut tasks = JoinSet::new();
        for image in images {
            let semaphore = semaphore.clone();
            let uploader = uploader.clone();
            let cancel = cancel.clone();
            let uploaded_tx = uploaded_tx.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if cancel.is_cancelled() {
                    image.fail(UploadError::Cancelled);
                    return;
                }
                if image.bytes().is_empty() {
                    image.fail(UploadError::NothingToUpload);
                    return;
                }
                let filename = upload_filename(image.mime());
                match uploader
                    .upload(image.bytes().clone(), image.mime(), &filename)
                    .await
                {
                    Ok((url, resource_id)) => {
                        debug!(url = %url, "uploaded {filename}");
                        image.complete(url, Some(resource_id.clone()));
                        let _ = uploaded_tx.send(UploadedResource { resource_id });
                    }
                    Err(err) => {
                        warn!("upload of {filename} failed: {err}");
                        image.fail(err);
                    }
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    })
}

// =============================================================================
// Cleanup
// =============================================================================

/// Delete every uploaded transient resource.
///
/// Runs after the executor, on a fresh context so cancellation of the
/// Apply does not leak half-uploaded resources. Individual failures are
/// logged and aggregated; they never abort the remaining deletions.
pub async fn cleanup<U: Uploader + 'static>(
    uploader: Arc<U>,
    mut uploaded_rx: mpsc::UnboundedReceiver<UploadedResource>,
    workers: usize,
) -> Result<(), CleanupError> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks: JoinSet<bool> = JoinSet::new();
    let mut total = 0usize;

    while let Some(resource) = uploaded_rx.recv().await {
        total += 1;
        let semaphore = semaphore.clone();
        let uploader = uploader.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            match uploader.delete(&resource.resource_id).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        resource_id = %resource.resource_id,
                        "cleanup failed: {err}"
                    );
                    false
                }
            }
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        if !matches!(joined, Ok(true)) {
            failed += 1;
        }
    }

    if failed > 0 {
        Err(CleanupError { failed, total })
    } else {
        Ok(())
    }
}

// =============================================================================
// Upload collection
// =============================================================================

/// Collect the images needing upload from a plan, in action order.
///
/// An image qualifies when it sits on an `Append` or `Update` slide, is
/// not equivalent to any pre-fetched image of that slide, and is still
/// `NotStarted` (public-web images are pre-marked `Completed` and fall
/// out here). Each shared image is scheduled once.
pub fn collect_uploads(
    plan: &[crate::plan::Action],
    prefetched: &Prefetched,
    opts: &MatchOptions,
) -> Vec<Arc<Image>> {
    let mut seen: Vec<*const Image> = Vec::new();
    let mut uploads = Vec::new();

    for action in plan {
        let (slide, slide_index) = match action {
            crate::plan::Action::Append { slide } => (slide, None),
            crate::plan::Action::Update { index, slide } => (slide, Some(*index)),
            _ => continue,
        };
        let existing = slide_index.and_then(|idx| prefetched.for_slide(idx));

        for image in &slide.images {
            if image.upload_state() != UploadState::NotStarted {
                continue;
            }
            let ptr = Arc::as_ptr(image);
            if seen.contains(&ptr) {
                continue;
            }
            if let Some(existing) = existing {
                let used = vec![false; existing.images.len()];
                if existing.find_equivalent(image, opts, &used).is_some() {
                    continue;
                }
            }
            seen.push(ptr);
            uploads.push(image.clone());
        }
    }
    uploads
}

// =============================================================================
// Tests
// =============================================================================
