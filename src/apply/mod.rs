//! The apply pipeline.
//!
//! One [`Apply::run`] reconciles a desired slide sequence against the
//! remote presentation end to end:
//!
//! 1. Refetch the presentation snapshot and convert its pages into the
//!    slide model (the "before" sequence).
//! 2. Plan the minimal action list (see [`crate::plan`]).
//! 3. Pre-fetch the existing images of every slide the plan updates
//!    (synchronous barrier, bounded parallelism, fail fast).
//! 4. Kick off background uploads for the new images the plan needs.
//! 5. Execute the plan, overlapping with the uploads; the executor
//!    blocks per image only when it needs that image's URL.
//! 6. Drain the upload-completion channel and delete every transient
//!    upload (deferred cleanup on a fresh context; the remote copies
//!    image bytes on ingestion, so the uploads are only scaffolding).
//!
//! Between the opening and closing snapshot refetches the local copy is
//! canonical: the executor mutates its own mirror of the page order and
//! never re-reads the remote mid-run (layout swaps and append
//! pre-creation, which create fresh pages, are the deliberate
//! exceptions).

pub mod content;
pub mod executor;
pub mod text;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ApplyError;
use crate::model::image::MatchOptions;
use crate::model::Slide;
use crate::plan::{generate_actions, Action};
use crate::remote::{convert_to_slide, Page, Presentation, RemoteSlides};
use crate::upload::{cleanup, collect_uploads, prefetch, start_uploads, Uploader};

pub use content::{plan_layout_swap, sync_slide, IdGenerator, SlideSync, SwapPlan};
pub use executor::Executor;

/// A reconciliation engine bound to a remote service and an uploader.
pub struct Apply<R, U> {
    remote: Arc<R>,
    uploader: Arc<U>,
    config: Config,
}

impl<R: RemoteSlides + 'static, U: Uploader + 'static> Apply<R, U> {
    pub fn new(remote: Arc<R>, uploader: Arc<U>, config: Config) -> Self {
        Self {
            remote,
            uploader,
            config,
        }
    }

    /// Reconcile the remote presentation into `after`.
    ///
    /// Returns the closing presentation snapshot. On cancellation the
    /// in-flight remote call completes, no new calls start, and cleanup
    /// still runs.
    pub async fn run(
        &self,
        after: &[Slide],
        cancel: &CancellationToken,
    ) -> Result<Presentation, ApplyError> {
        let presentation = self.remote.presentation().await?;
        let after = normalize_layouts(after, &presentation)?;
        let before: Vec<Slide> = presentation
            .slides
            .iter()
            .map(|page| convert_to_slide(page, &presentation))
            .collect();

        let opts = MatchOptions::from(&self.config);
        let plan = generate_actions(&before, &after, &opts)?;
        info!(
            before = before.len(),
            after = after.len(),
            actions = plan.len(),
            "planned apply"
        );
        if plan.is_empty() {
            return self.remote.presentation().await.map_err(Into::into);
        }

        // Synchronous pre-fetch barrier; uploads never start if it fails.
        let targets = resolve_update_targets(&plan, &presentation);
        let prefetched = prefetch(
            &self.remote,
            &targets,
            self.config.prefetch_workers,
            cancel,
        )
        .await?;

        let uploads = collect_uploads(&plan, &prefetched, &opts);
        debug!(count = uploads.len(), "scheduling background uploads");
        let (uploaded_tx, uploaded_rx) = mpsc::unbounded_channel();
        let upload_cancel = cancel.child_token();
        let upload_task = start_uploads(
            self.uploader.clone(),
            uploads,
            self.config.upload_workers,
            upload_cancel.clone(),
            uploaded_tx,
        );

        let mut exec = Executor::new(
            &self.remote,
            &presentation,
            &self.config,
            cancel.clone(),
            run_id(),
        );
        let exec_result = exec.execute(&plan, &prefetched).await;

        // Settle the pool: uploads the executor no longer needs must
        // reach a terminal state before cleanup counts them.
        upload_cancel.cancel();
        let _ = upload_task.await;

        // Deferred cleanup on a fresh context; its failures never mask
        // an executor error.
        let cleanup_result = cleanup(
            self.uploader.clone(),
            uploaded_rx,
            self.config.cleanup_workers,
        )
        .await;

        exec_result?;
        cleanup_result?;
        self.remote.presentation().await.map_err(Into::into)
    }
}

/// Substitute default layouts for empty layout names and verify every
/// referenced layout exists in the catalog.
fn normalize_layouts(
    after: &[Slide],
    presentation: &Presentation,
) -> Result<Vec<Slide>, ApplyError> {
    after
        .iter()
        .enumerate()
        .map(|(index, slide)| {
            let layout = presentation.resolve_layout(&slide.layout, index)?;
            let mut slide = slide.clone();
            slide.layout = layout.name.clone();
            Ok(slide)
        })
        .collect()
}

/// Determine which page each `Update` action will rewrite.
///
/// Replays the plan's deletes and moves over the snapshot's page order,
/// exactly as the executor will - including the empty slots the
/// executor pre-creates for appends at the tail - and records the page
/// under the update's index at that moment. The result keys the
/// pre-fetch map; slots resolve to no page (fresh slides have nothing
/// to pre-fetch).
fn resolve_update_targets(plan: &[Action], presentation: &Presentation) -> HashMap<usize, Page> {
    let mut pages: Vec<Option<&Page>> = presentation.slides.iter().map(Some).collect();
    let appends = plan
        .iter()
        .filter(|a| matches!(a, Action::Append { .. }))
        .count();
    pages.extend(std::iter::repeat(None).take(appends));

    let mut targets = HashMap::new();
    for action in plan {
        match action {
            Action::Delete { index } => {
                if *index < pages.len() {
                    pages.remove(*index);
                }
            }
            Action::Move { index, move_to, .. } => {
                if *index < pages.len() && *move_to < pages.len() {
                    let page = pages.remove(*index);
                    pages.insert(*move_to, page);
                }
            }
            Action::Update { index, .. } => {
                if let Some(Some(page)) = pages.get(*index) {
                    targets.insert(*index, (*page).clone());
                }
            }
            Action::Append { .. } => {}
        }
    }
    targets
}

/// Object-id prefix unique to one Apply invocation.
fn run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("g{nanos:x}")
}

// =============================================================================
// Tests
// =============================================================================
