//! Per-slide content synchronisation.
//!
//! Translates one `Update` or `Append` action into mutation requests
//! against a concrete remote page:
//!
//! 1. If the page's layout differs from the desired one, a swap plan is
//!    produced first (create replacement slide, copy hand-authored
//!    elements, delete the original); the executor applies it as its own
//!    batch and refetches the fresh page before content sync runs.
//! 2. Placeholder families (title, subtitle, body) are paired with the
//!    desired sequence elements in (y, x) order, cleared and refilled.
//!    Extra placeholders with no desired counterpart are left untouched.
//! 3. Images reconcile by equivalence against the pre-fetched set; new
//!    images consume unused picture placeholders via `ReplaceImage`
//!    before falling back to `CreateImage`, and orphaned Markdown-managed
//!    images are deleted.
//! 4. Block quotes reuse existing managed text boxes one-to-one, deleting
//!    or creating the difference.
//! 5. Tables adjust structure at the tail (insert/delete rows and
//!    columns), with cell content filled in a second pass once the
//!    structural batch has been accepted by the remote.
//! 6. The presenter-hidden flag and the speaker note round out the slide.

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::error::{ApplyError, PlanError};
use crate::model::image::MatchOptions;
use crate::model::{Alignment, Paragraph, Slide};
use crate::remote::{
    CellLocation, ElementKind, ElementProperties, Page, PlaceholderFamily, PlaceholderIdMapping,
    Presentation, Range, ReplaceMethod, Request, ShapeType, Size, TableRange, TextStyle,
    Transform, IMAGE_ALT, TABLE_ALT, TEXTBOX_ALT,
};
use crate::upload::SlideImages;

use super::text::{clear_requests, text_requests};

// =============================================================================
// Geometry defaults
// =============================================================================

/// Default size for created images (4:3, EMU).
const IMAGE_SIZE: Size = Size {
    width: 3_000_000,
    height: 2_250_000,
};

/// Default size for created block-quote text boxes (EMU).
const QUOTE_SIZE: Size = Size {
    width: 6_000_000,
    height: 1_200_000,
};

/// Default size for created tables (EMU).
const TABLE_SIZE: Size = Size {
    width: 8_000_000,
    height: 2_400_000,
};

/// Horizontal indent per quote nesting level (EMU).
const QUOTE_INDENT: f64 = 400_000.0;

/// Border weight stamped on created tables (EMU).
const TABLE_BORDER_WEIGHT: i64 = 12_700;

// =============================================================================
// Id generation
// =============================================================================

/// Client-side object id generator.
///
/// The engine assigns its own object ids so a batch can create an
/// element and later requests can reference it without a round trip.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    counter: u64,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }

    pub fn next(&mut self, kind: &str) -> String {
        self.counter += 1;
        format!("{}-{kind}-{}", self.prefix, self.counter)
    }
}

// =============================================================================
// Layout swap
// =============================================================================

/// The replacement batch for a slide whose layout must change.
#[derive(Debug)]
pub struct SwapPlan {
    pub requests: Vec<Request>,
    pub new_page_id: String,
}

/// Plan a layout swap, or `None` when the page already has the desired
/// layout.
///
/// The replacement slide is created right after the original, Markdown-
/// managed and placeholder elements are left behind (content sync
/// rebuilds them), every other shape and image is copied with its size,
/// transform and paragraph styles, and the original page is deleted.
pub fn plan_layout_swap(
    page: &Page,
    desired: &Slide,
    presentation: &Presentation,
    slide_index: usize,
    ids: &mut IdGenerator,
) -> Result<Option<SwapPlan>, ApplyError> {
    let current_name = presentation
        .layout_by_id(&page.layout_object_id)
        .map(|l| l.name.as_str())
        .unwrap_or_default();
    if current_name == desired.layout {
        return Ok(None);
    }

    let layout = presentation
        .layout_by_name(&desired.layout)
        .ok_or_else(|| ApplyError::Plan(PlanError::MissingLayout(desired.layout.clone())))?;

    let new_page_id = ids.next("slide");
    let placeholder_id_mappings: Vec<PlaceholderIdMapping> = layout
        .placeholders
        .iter()
        .map(|ph| PlaceholderIdMapping {
            placeholder_type: ph.ptype.as_str().to_string(),
            placeholder_index: ph.index,
            object_id: ids.next("ph"),
        })
        .collect();

    let mut requests = vec![Request::CreateSlide {
        object_id: new_page_id.clone(),
        insertion_index: (slide_index + 1) as u32,
        layout_object_id: layout.object_id.clone(),
        placeholder_id_mappings,
    }];

    for el in &page.elements {
        if el.is_markdown_managed() || el.placeholder().is_some() {
            continue;
        }
        match &el.kind {
            ElementKind::Shape(shape) => {
                let object_id = ids.next("shape");
                requests.push(Request::CreateShape {
                    object_id: object_id.clone(),
                    shape_type: ShapeType::TextBox,
                    element_properties: ElementProperties {
                        page_object_id: new_page_id.clone(),
                        size: Some(el.size),
                        transform: Some(el.transform),
                    },
                });
                requests.extend(text_requests(&object_id, None, &shape.paragraphs));
                if !el.description.is_empty() {
                    requests.push(Request::UpdatePageElementAltText {
                        object_id,
                        description: el.description.clone(),
                    });
                }
            }
            ElementKind::Image(image) => {
                requests.push(Request::CreateImage {
                    object_id: ids.next("image"),
                    url: image.content_url.clone(),
                    element_properties: ElementProperties {
                        page_object_id: new_page_id.clone(),
                        size: Some(el.size),
                        transform: Some(el.transform),
                    },
                });
            }
            ElementKind::Table(_) => {}
        }
    }

    requests.push(Request::DeleteObject {
        object_id: page.object_id.clone(),
    });

    Ok(Some(SwapPlan {
        requests,
        new_page_id,
    }))
}

// =============================================================================
// Content sync
// =============================================================================

/// Output of one slide's content synchronisation.
#[derive(Debug, Default)]
pub struct SlideSync {
    /// Requests for the executor's coalescing buffer.
    pub requests: Vec<Request>,
    /// Table cell fills that must wait for the structural batch to land.
    pub table_fills: Vec<Request>,
}

/// Produce the requests that reshape `page` into `desired`.
///
/// Assumes the layout already matches (see [`plan_layout_swap`]). Blocks
/// per image while that image's upload is still in flight.
pub async fn sync_slide(
    page: &Page,
    desired: &Slide,
    prefetched: Option<&SlideImages>,
    ids: &mut IdGenerator,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<SlideSync, ApplyError> {
    let opts = MatchOptions::from(config);
    let mut sync = SlideSync::default();

    sync_placeholder_family(
        page,
        PlaceholderFamily::Title,
        &plain_sequences(&desired.titles),
        &mut sync.requests,
    );
    sync_placeholder_family(
        page,
        PlaceholderFamily::Subtitle,
        &plain_sequences(&desired.subtitles),
        &mut sync.requests,
    );
    let bodies: Vec<Vec<Paragraph>> = desired
        .bodies
        .iter()
        .map(|b| b.paragraphs.clone())
        .collect();
    sync_placeholder_family(page, PlaceholderFamily::Body, &bodies, &mut sync.requests);

    sync_images(page, desired, prefetched, ids, config, &opts, cancel, &mut sync).await?;
    sync_block_quotes(page, desired, ids, &mut sync.requests);
    sync_tables(page, desired, ids, &mut sync);

    if page.skipped != desired.skip {
        sync.requests.push(Request::UpdateSlideProperties {
            object_id: page.object_id.clone(),
            is_skipped: desired.skip,
            fields: "isSkipped".to_string(),
        });
    }

    sync_speaker_note(page, desired, &mut sync.requests);

    Ok(sync)
}

/// Turn plain strings into paragraph sequences (one paragraph per line).
fn plain_sequences(texts: &[String]) -> Vec<Vec<Paragraph>> {
    texts
        .iter()
        .map(|text| text.split('\n').map(Paragraph::plain).collect())
        .collect()
}

/// Clear and refill the k-th placeholder of a family with the k-th
/// desired element. Placeholders already carrying the desired text are
/// left alone; surplus placeholders stay untouched; surplus desired
/// elements have nowhere to land and are dropped with a warning.
fn sync_placeholder_family(
    page: &Page,
    family: PlaceholderFamily,
    desired: &[Vec<Paragraph>],
    requests: &mut Vec<Request>,
) {
    let placeholders = page.placeholders_of(family);

    for (k, paragraphs) in desired.iter().enumerate() {
        let Some(el) = placeholders.get(k) else {
            warn!(
                ?family,
                "no placeholder for element {k}, content dropped"
            );
            continue;
        };
        let existing = match &el.kind {
            ElementKind::Shape(shape) => shape.paragraphs.as_slice(),
            _ => &[],
        };
        if paragraphs_match(existing, paragraphs) {
            continue;
        }
        let has_text = existing.iter().any(|p| !p.fragments.is_empty());
        requests.extend(clear_requests(&el.object_id, None, has_text));
        requests.extend(text_requests(&el.object_id, None, paragraphs));
    }
}

/// Whether a container's current paragraphs already render as the
/// desired ones. Existing text carries the service's vertical-tab soft
/// breaks; both sides compare normalized.
fn paragraphs_match(existing: &[Paragraph], desired: &[Paragraph]) -> bool {
    let mut existing: Vec<Paragraph> = existing.to_vec();
    for para in &mut existing {
        for frag in &mut para.fragments {
            if frag.value.contains('\u{000b}') {
                frag.value = frag.value.replace('\u{000b}', "\n");
            }
        }
        para.normalize();
    }
    let mut desired: Vec<Paragraph> = desired.to_vec();
    for para in &mut desired {
        para.normalize();
    }
    existing == desired
}

/// Reconcile the slide's images against the pre-fetched current set.
#[allow(clippy::too_many_arguments)]
async fn sync_images(
    page: &Page,
    desired: &Slide,
    prefetched: Option<&SlideImages>,
    ids: &mut IdGenerator,
    config: &Config,
    opts: &MatchOptions,
    cancel: &CancellationToken,
    sync: &mut SlideSync,
) -> Result<(), ApplyError> {
    let empty = SlideImages::default();
    let current = prefetched.unwrap_or(&empty);
    let mut used = vec![false; current.images.len()];

    let picture_placeholders = page.picture_placeholders();
    let mut placeholders_taken = 0usize;

    for image in &desired.images {
        if let Some(pos) = current.find_equivalent(image, opts, &used) {
            used[pos] = true;
            continue;
        }

        let url = image
            .upload_info(
                std::time::Duration::from_millis(config.poll_interval_ms),
                cancel,
            )
            .await?;
        let method = if image.from_code_block() {
            ReplaceMethod::CenterInside
        } else {
            ReplaceMethod::CenterCrop
        };

        if let Some(el) = picture_placeholders.get(placeholders_taken) {
            placeholders_taken += 1;
            sync.requests.push(Request::ReplaceImage {
                image_object_id: el.object_id.clone(),
                url,
                image_replace_method: method,
            });
            sync.requests.push(Request::UpdatePageElementAltText {
                object_id: el.object_id.clone(),
                description: IMAGE_ALT.to_string(),
            });
        } else {
            let object_id = ids.next("image");
            sync.requests.push(Request::CreateImage {
                object_id: object_id.clone(),
                url,
                element_properties: ElementProperties {
                    page_object_id: page.object_id.clone(),
                    size: Some(IMAGE_SIZE),
                    transform: Some(Transform::default()),
                },
            });
            sync.requests.push(Request::UpdatePageElementAltText {
                object_id,
                description: IMAGE_ALT.to_string(),
            });
        }
    }

    // Markdown-managed images with no counterpart in the new set go away.
    for (pos, object_id) in current.object_ids.iter().enumerate() {
        if !used[pos] {
            sync.requests.push(Request::DeleteObject {
                object_id: object_id.clone(),
            });
        }
    }
    Ok(())
}

/// Reconcile block quotes against the managed text boxes on the page.
fn sync_block_quotes(
    page: &Page,
    desired: &Slide,
    ids: &mut IdGenerator,
    requests: &mut Vec<Request>,
) {
    let current = page.markdown_textboxes();
    let reused = current.len().min(desired.block_quotes.len());

    for (quote, el) in desired.block_quotes.iter().zip(current.iter()) {
        let ElementKind::Shape(shape) = &el.kind else {
            continue;
        };
        let mut existing = shape.paragraphs.clone();
        for para in &mut existing {
            para.normalize();
        }
        let mut wanted = quote.paragraphs.clone();
        for para in &mut wanted {
            para.normalize();
        }
        if existing == wanted {
            continue;
        }
        let has_text = existing.iter().any(|p| !p.fragments.is_empty());
        requests.extend(clear_requests(&el.object_id, None, has_text));
        requests.extend(text_requests(&el.object_id, None, &quote.paragraphs));
    }

    for el in current.iter().skip(desired.block_quotes.len()) {
        requests.push(Request::DeleteObject {
            object_id: el.object_id.clone(),
        });
    }

    for quote in desired.block_quotes.iter().skip(reused) {
        let object_id = ids.next("quote");
        requests.push(Request::CreateShape {
            object_id: object_id.clone(),
            shape_type: ShapeType::TextBox,
            element_properties: ElementProperties {
                page_object_id: page.object_id.clone(),
                size: Some(QUOTE_SIZE),
                transform: Some(Transform {
                    translate_x: QUOTE_INDENT * (quote.nesting as f64 + 1.0),
                    ..Transform::default()
                }),
            },
        });
        requests.push(Request::UpdatePageElementAltText {
            object_id: object_id.clone(),
            description: TEXTBOX_ALT.to_string(),
        });
        requests.push(Request::UpdateShapeProperties {
            object_id: object_id.clone(),
            fields: "contentAlignment".to_string(),
            content_alignment: Some("MIDDLE".to_string()),
        });
        requests.extend(text_requests(&object_id, None, &quote.paragraphs));
    }
}

/// Reconcile tables: structure in the main batch, cell content in the
/// deferred fill pass when the structure changed.
fn sync_tables(page: &Page, desired: &Slide, ids: &mut IdGenerator, sync: &mut SlideSync) {
    let current = page.markdown_tables();
    let reused = current.len().min(desired.tables.len());

    for (table, el) in desired.tables.iter().zip(current.iter()) {
        let ElementKind::Table(existing) = &el.kind else {
            continue;
        };
        let cur_rows = existing.rows.len();
        let cur_cols = existing.rows.iter().map(|r| r.len()).max().unwrap_or(0);
        let (want_rows, want_cols) = table.dimensions();

        let mut structural = false;
        if want_rows > cur_rows {
            structural = true;
            sync.requests.push(Request::InsertTableRows {
                table_object_id: el.object_id.clone(),
                cell_location: CellLocation {
                    row_index: cur_rows.saturating_sub(1) as u32,
                    column_index: 0,
                },
                insert_below: true,
                number: (want_rows - cur_rows) as u32,
            });
        } else if want_rows < cur_rows {
            structural = true;
            for row in (want_rows..cur_rows).rev() {
                sync.requests.push(Request::DeleteTableRow {
                    table_object_id: el.object_id.clone(),
                    cell_location: CellLocation {
                        row_index: row as u32,
                        column_index: 0,
                    },
                });
            }
        }
        if want_cols > cur_cols {
            structural = true;
            sync.requests.push(Request::InsertTableColumns {
                table_object_id: el.object_id.clone(),
                cell_location: CellLocation {
                    row_index: 0,
                    column_index: cur_cols.saturating_sub(1) as u32,
                },
                insert_right: true,
                number: (want_cols - cur_cols) as u32,
            });
        } else if want_cols < cur_cols {
            structural = true;
            for col in (want_cols..cur_cols).rev() {
                sync.requests.push(Request::DeleteTableColumn {
                    table_object_id: el.object_id.clone(),
                    cell_location: CellLocation {
                        row_index: 0,
                        column_index: col as u32,
                    },
                });
            }
        }

        let fills = table_fill_requests(&el.object_id, table, Some(existing));
        if structural {
            sync.table_fills.extend(fills);
        } else {
            sync.requests.extend(fills);
        }
    }

    for el in current.iter().skip(desired.tables.len()) {
        sync.requests.push(Request::DeleteObject {
            object_id: el.object_id.clone(),
        });
    }

    for table in desired.tables.iter().skip(reused) {
        let (rows, cols) = table.dimensions();
        if rows == 0 || cols == 0 {
            continue;
        }
        let object_id = ids.next("table");
        sync.requests.push(Request::CreateTable {
            object_id: object_id.clone(),
            element_properties: ElementProperties {
                page_object_id: page.object_id.clone(),
                size: Some(TABLE_SIZE),
                transform: Some(Transform::default()),
            },
            rows: rows as u32,
            columns: cols as u32,
        });
        sync.requests.push(Request::UpdatePageElementAltText {
            object_id: object_id.clone(),
            description: TABLE_ALT.to_string(),
        });
        sync.requests.push(Request::UpdateTableBorderProperties {
            object_id: object_id.clone(),
            fields: "tableBorderFill,weight".to_string(),
            border_weight_emu: Some(TABLE_BORDER_WEIGHT),
        });
        // Text can only land once the table exists server-side.
        sync.table_fills
            .extend(table_fill_requests(&object_id, table, None));
    }
}

/// Cell-content requests for one table.
///
/// `existing` provides the old cell text so occupied cells get cleared
/// first; `None` means the table was just created and every cell is
/// empty.
fn table_fill_requests(
    object_id: &str,
    table: &crate::model::Table,
    existing: Option<&crate::remote::TableElement>,
) -> Vec<Request> {
    let mut requests = Vec::new();

    for (r, row) in table.rows.iter().enumerate() {
        for (c, cell) in row.cells.iter().enumerate() {
            let location = CellLocation {
                row_index: r as u32,
                column_index: c as u32,
            };
            let old_cell = existing.and_then(|t| t.rows.get(r)).and_then(|row| row.get(c));
            let old_text: String = old_cell
                .map(|cell| {
                    cell.paragraphs
                        .iter()
                        .map(|p| p.plain_text())
                        .collect::<Vec<_>>()
                        .join("\n")
                })
                .unwrap_or_default();
            let new_text = cell.plain_text();
            let unchanged = old_cell
                .map(|old| {
                    old_text == new_text && old.alignment == cell.alignment
                })
                .unwrap_or(false);
            if unchanged {
                continue;
            }

            requests.extend(clear_requests(object_id, Some(location), !old_text.is_empty()));
            let paragraph = Paragraph {
                fragments: cell.fragments.clone(),
                ..Paragraph::default()
            };
            requests.extend(text_requests(object_id, Some(location), &[paragraph]));

            if cell.header && !new_text.is_empty() {
                requests.push(Request::UpdateTextStyle {
                    object_id: object_id.to_string(),
                    cell_location: Some(location),
                    style: TextStyle {
                        bold: Some(true),
                        ..TextStyle::default()
                    },
                    text_range: Range::All,
                    fields: "bold".to_string(),
                });
            }
            if cell.alignment != Alignment::Start {
                requests.push(Request::UpdateTableCellProperties {
                    object_id: object_id.to_string(),
                    table_range: TableRange {
                        location,
                        row_span: 1,
                        column_span: 1,
                    },
                    fields: "contentAlignment".to_string(),
                    content_alignment: Some(
                        match cell.alignment {
                            Alignment::Start => "START",
                            Alignment::Center => "CENTER",
                            Alignment::End => "END",
                        }
                        .to_string(),
                    ),
                });
            }
        }
    }
    requests
}

/// Clear and reinsert the speaker note when it changed.
fn sync_speaker_note(page: &Page, desired: &Slide, requests: &mut Vec<Request>) {
    if page.speaker_note == desired.speaker_note {
        return;
    }
    let Some(notes_id) = &page.notes_object_id else {
        warn!(page = %page.object_id, "page has no notes shape, speaker note dropped");
        return;
    };
    requests.extend(clear_requests(notes_id, None, !page.speaker_note.is_empty()));
    if !desired.speaker_note.is_empty() {
        requests.push(Request::InsertText {
            object_id: notes_id.clone(),
            cell_location: None,
            text: desired.speaker_note.clone(),
            insertion_index: 0,
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
