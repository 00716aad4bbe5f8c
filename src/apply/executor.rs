//! The plan executor.
//!
//! Drives the action list against the remote service while the upload
//! pool works in the background. The executor is the single-threaded
//! driver of the Apply: it never reorders actions, it coalesces the
//! request streams of consecutive `Append`/`Update` actions into one
//! batch buffer, and it flushes that buffer when a `Move` or `Delete`
//! interrupts the run, when the buffer reaches the batch cap, or at the
//! end of the plan.
//!
//! Index bookkeeping mirrors the planner exactly: the executor keeps a
//! local copy of the page order and applies every action to it as it
//! goes, so a planner index is always valid at the moment its action
//! executes. Appended pages are created up front in one call, at the
//! tail - the position the planner's padded sequence gives them. Moves
//! may then carry a pre-created page into the middle of the deck; each
//! `Append` action fills the next pre-created page, in creation order,
//! wherever it currently sits.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::error::{ApplyError, PlanError};
use crate::plan::Action;
use crate::remote::{Page, PlaceholderIdMapping, Presentation, RemoteSlides, Request};
use crate::upload::Prefetched;

use super::content::{plan_layout_swap, sync_slide, IdGenerator};

/// Executes a plan against the remote service.
pub struct Executor<'a, R: RemoteSlides + 'static> {
    remote: &'a Arc<R>,
    presentation: &'a Presentation,
    config: &'a Config,
    cancel: CancellationToken,
    ids: IdGenerator,
    /// Coalescing buffer for contiguous Append/Update request streams.
    buffer: Vec<Request>,
    /// Table cell fills awaiting the structural flush.
    table_fills: Vec<Request>,
    /// Local mirror of the remote page order.
    pages: Vec<Page>,
    /// Pre-created pages awaiting their Append actions, in plan order.
    appended: VecDeque<Page>,
}

impl<'a, R: RemoteSlides + 'static> Executor<'a, R> {
    pub fn new(
        remote: &'a Arc<R>,
        presentation: &'a Presentation,
        config: &'a Config,
        cancel: CancellationToken,
        id_prefix: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            presentation,
            config,
            cancel,
            ids: IdGenerator::new(id_prefix),
            buffer: Vec::new(),
            table_fills: Vec::new(),
            pages: presentation.slides.clone(),
            appended: VecDeque::new(),
        }
    }

    /// Run the plan to completion.
    pub async fn execute(
        &mut self,
        plan: &[Action],
        prefetched: &Prefetched,
    ) -> Result<(), ApplyError> {
        if self.cancel.is_cancelled() {
            return Err(ApplyError::Cancelled);
        }
        self.precreate_appends(plan).await?;

        let mut i = 0;
        while i < plan.len() {
            if self.cancel.is_cancelled() {
                return Err(ApplyError::Cancelled);
            }
            match &plan[i] {
                Action::Delete { .. } => {
                    // Consecutive deletes share one batched call; their
                    // back-to-front indices need no renumbering.
                    self.flush().await?;
                    let mut requests = Vec::new();
                    while let Some(Action::Delete { index }) = plan.get(i) {
                        requests.push(Request::DeleteObject {
                            object_id: self.page_at(*index)?.object_id.clone(),
                        });
                        self.pages.remove(*index);
                        i += 1;
                    }
                    self.send(requests).await?;
                }
                Action::Move { index, move_to, .. } => {
                    self.flush().await?;
                    let page = self.page_at(*index)?.clone();
                    self.send(vec![Request::UpdateSlidesPosition {
                        slide_object_ids: vec![page.object_id.clone()],
                        insertion_index: *move_to as u32,
                    }])
                    .await?;
                    self.pages.remove(*index);
                    self.pages.insert(*move_to, page);
                    i += 1;
                }
                Action::Update { index, slide } => {
                    let index = *index;
                    self.page_at(index)?;

                    if let Some(swap) = plan_layout_swap(
                        &self.pages[index],
                        slide,
                        self.presentation,
                        index,
                        &mut self.ids,
                    )? {
                        // The swap is its own batch; everything after it
                        // targets the freshly created page.
                        self.flush().await?;
                        self.send(swap.requests).await?;
                        self.pages[index] = self.remote.page(&swap.new_page_id).await?;
                    }

                    let sync = sync_slide(
                        &self.pages[index],
                        slide,
                        prefetched.for_slide(index),
                        &mut self.ids,
                        self.config,
                        &self.cancel,
                    )
                    .await?;
                    self.buffer.extend(sync.requests);
                    self.table_fills.extend(sync.table_fills);
                    self.flush_if_full().await?;
                    i += 1;
                }
                Action::Append { slide } => {
                    // The page is already in the deck (and in
                    // self.pages); this action fills its content.
                    let page = self.appended.pop_front().ok_or_else(|| {
                        ApplyError::Plan(PlanError::MappingAssertion(
                            "append action without a pre-created page".to_string(),
                        ))
                    })?;
                    let sync = sync_slide(
                        &page,
                        slide,
                        None,
                        &mut self.ids,
                        self.config,
                        &self.cancel,
                    )
                    .await?;
                    self.buffer.extend(sync.requests);
                    self.table_fills.extend(sync.table_fills);
                    self.flush_if_full().await?;
                    i += 1;
                }
            }
        }

        self.flush().await
    }

    /// Reserve one new page per Append in a single remote call, then
    /// fetch each created page so content sync can target its
    /// placeholders.
    async fn precreate_appends(&mut self, plan: &[Action]) -> Result<(), ApplyError> {
        let appends: Vec<_> = plan
            .iter()
            .filter_map(|a| match a {
                Action::Append { slide } => Some(slide),
                _ => None,
            })
            .collect();
        if appends.is_empty() {
            return Ok(());
        }

        let mut requests = Vec::with_capacity(appends.len());
        let mut new_ids = Vec::with_capacity(appends.len());
        for (k, slide) in appends.iter().enumerate() {
            let layout = self
                .presentation
                .layout_by_name(&slide.layout)
                .ok_or_else(|| PlanError::MissingLayout(slide.layout.clone()))?;
            let object_id = self.ids.next("slide");
            let placeholder_id_mappings: Vec<PlaceholderIdMapping> = layout
                .placeholders
                .iter()
                .map(|ph| PlaceholderIdMapping {
                    placeholder_type: ph.ptype.as_str().to_string(),
                    placeholder_index: ph.index,
                    object_id: self.ids.next("ph"),
                })
                .collect();
            requests.push(Request::CreateSlide {
                object_id: object_id.clone(),
                insertion_index: (self.pages.len() + k) as u32,
                layout_object_id: layout.object_id.clone(),
                placeholder_id_mappings,
            });
            new_ids.push(object_id);
        }

        debug!(count = new_ids.len(), "pre-creating append targets");
        self.send(requests).await?;
        for object_id in new_ids {
            let page = self.remote.page(&object_id).await?;
            // The new pages extend the local order at the tail, exactly
            // where the planner's padded sequence put the surrogates, so
            // later Move indices see them.
            self.pages.push(page.clone());
            self.appended.push_back(page);
        }
        Ok(())
    }

    fn page_at(&self, index: usize) -> Result<&Page, ApplyError> {
        self.pages.get(index).ok_or_else(|| {
            ApplyError::Plan(PlanError::MappingAssertion(format!(
                "action index {index} out of range ({} pages)",
                self.pages.len()
            )))
        })
    }

    async fn flush_if_full(&mut self) -> Result<(), ApplyError> {
        if self.buffer.len() >= self.config.batch_cap {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send the coalescing buffer, then the deferred table fills.
    async fn flush(&mut self) -> Result<(), ApplyError> {
        let buffer = std::mem::take(&mut self.buffer);
        self.send(buffer).await?;
        let fills = std::mem::take(&mut self.table_fills);
        self.send(fills).await
    }

    /// Send requests in contiguous sub-batches under the cap.
    async fn send(&self, requests: Vec<Request>) -> Result<(), ApplyError> {
        if requests.is_empty() {
            return Ok(());
        }
        for chunk in requests.chunks(self.config.batch_cap.max(1)) {
            debug!(count = chunk.len(), "batch update");
            self.remote.batch_update(chunk.to_vec()).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
