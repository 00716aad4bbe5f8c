//! Test utilities for integration tests.
//!
//! Provides the mock collaborators and the independent action emulator:
//!
//! - [`MockRemote`] keeps a [`Presentation`] in memory and interprets the
//!   engine's request vocabulary faithfully enough for round trips:
//!   created slides get their layout's placeholders, text lands in
//!   shapes/cells/notes, images are copied from the mock CDN into
//!   remote-hosted media (as the real service does on ingestion), tables
//!   grow and shrink. Character styling and bullets are recorded but not
//!   modeled, so round-trip tests stick to plain text.
//! - [`MockUploader`] serves a shared in-memory CDN so uploaded blobs can
//!   be fetched back by the remote and deleted by cleanup.
//! - [`emulate`] interprets an action list over a slide sequence with
//!   index assertions, independently of the executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use deck_sync::error::{FetchError, RemoteError, UploadError};
use deck_sync::model::image::Mime;
use deck_sync::model::{Paragraph, Slide};
use deck_sync::remote::{
    ElementKind, ImageElement, Layout, LayoutPlaceholder, Page, PageElement, Placeholder,
    PlaceholderType, Presentation, Range, RemoteSlides, Request, ShapeElement, Size,
    TableCellElement, TableElement, Transform,
};
use deck_sync::upload::Uploader;
use deck_sync::{convert_to_slide, Action};

// =============================================================================
// Slide builders
// =============================================================================

pub fn slide(title: &str) -> Slide {
    let mut s = Slide::new("TITLE");
    if !title.is_empty() {
        s.titles.push(title.to_string());
    }
    s
}

pub fn deck(titles: &[&str]) -> Vec<Slide> {
    titles.iter().map(|t| slide(t)).collect()
}

pub fn body_slide(title: &str, body_lines: &[&str]) -> Slide {
    let mut s = Slide::new("TITLE_AND_BODY");
    s.titles.push(title.to_string());
    s.bodies.push(deck_sync::Body {
        paragraphs: body_lines.iter().map(|l| Paragraph::plain(*l)).collect(),
    });
    s
}

// =============================================================================
// Independent emulator
// =============================================================================

/// Interpret an action list over a slide sequence.
///
/// Mirrors the executor's model of the deck: one empty slot per Append
/// is reserved at the tail before any action runs (the executor
/// pre-creates those pages), moves may relocate slots, and each Append
/// fills the next slot in creation order. Panics when any action's
/// index is out of bounds at the moment of application, which is
/// exactly the invariant the planner guarantees.
pub fn emulate(before: &[Slide], actions: &[Action]) -> Vec<Slide> {
    let appends = actions
        .iter()
        .filter(|a| matches!(a, Action::Append { .. }))
        .count();
    // (slot id, slide); real slides carry no slot id.
    let mut cells: Vec<(Option<usize>, Slide)> =
        before.iter().map(|s| (None, s.clone())).collect();
    for slot in 0..appends {
        cells.push((Some(slot), Slide::default()));
    }

    let mut next_slot = 0;
    for action in actions {
        match action {
            Action::Append { slide } => {
                let pos = cells
                    .iter()
                    .position(|(tag, _)| *tag == Some(next_slot))
                    .expect("append without a reserved slot");
                cells[pos].1 = slide.clone();
                next_slot += 1;
            }
            Action::Update { index, slide } => {
                assert!(*index < cells.len(), "update index {index} out of bounds");
                cells[*index].1 = slide.clone();
            }
            Action::Move { index, move_to, .. } => {
                assert!(*index < cells.len(), "move index {index} out of bounds");
                assert!(*move_to < cells.len(), "move target {move_to} out of bounds");
                let cell = cells.remove(*index);
                cells.insert(*move_to, cell);
            }
            Action::Delete { index } => {
                assert!(*index < cells.len(), "delete index {index} out of bounds");
                cells.remove(*index);
            }
        }
    }
    cells.into_iter().map(|(_, slide)| slide).collect()
}

/// The title sequence of a deck, for terse assertions.
pub fn titles(slides: &[Slide]) -> Vec<String> {
    slides
        .iter()
        .map(|s| s.titles.first().cloned().unwrap_or_default())
        .collect()
}

// =============================================================================
// Mock CDN + uploader
// =============================================================================

type Cdn = Arc<Mutex<HashMap<String, Bytes>>>;

/// Uploader backed by a shared in-memory CDN.
pub struct MockUploader {
    cdn: Cdn,
    counter: AtomicUsize,
    resources: Mutex<HashMap<String, String>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail_uploads: std::sync::atomic::AtomicBool,
}

impl MockUploader {
    fn new(cdn: Cdn) -> Self {
        Self {
            cdn,
            counter: AtomicUsize::new(0),
            resources: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            fail_uploads: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn upload_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.lock().unwrap().len()
    }

    /// Resources uploaded but not yet deleted.
    pub fn live_resources(&self) -> usize {
        self.resources.lock().unwrap().len()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(
        &self,
        bytes: Bytes,
        _mime: Mime,
        filename: &str,
    ) -> Result<(String, String), UploadError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(UploadError::Rejected {
                filename: filename.to_string(),
                reason: "mock upload failure".to_string(),
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let url = format!("https://cdn.mock/{n}/{filename}");
        let resource_id = format!("res-{n}");
        self.cdn.lock().unwrap().insert(url.clone(), bytes);
        self.resources
            .lock()
            .unwrap()
            .insert(resource_id.clone(), url.clone());
        Ok((url, resource_id))
    }

    async fn delete(&self, resource_id: &str) -> Result<(), UploadError> {
        let url = self.resources.lock().unwrap().remove(resource_id);
        if let Some(url) = url {
            self.cdn.lock().unwrap().remove(&url);
        }
        self.deleted.lock().unwrap().push(resource_id.to_string());
        Ok(())
    }
}

// =============================================================================
// Mock remote
// =============================================================================

/// In-memory presentation service.
pub struct MockRemote {
    state: Mutex<Presentation>,
    /// Remote-hosted media copies, keyed by content URL.
    media: Mutex<HashMap<String, (Bytes, Option<Mime>)>>,
    cdn: Cdn,
    batches: Mutex<Vec<Vec<Request>>>,
}

/// Media URLs are unique across every test in the process: the engine's
/// image cache is process-global and keyed by URL.
static MEDIA_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Build a coupled (remote, uploader) pair sharing one mock CDN.
pub fn mock_pair() -> (Arc<MockRemote>, Arc<MockUploader>) {
    let cdn: Cdn = Arc::new(Mutex::new(HashMap::new()));
    (
        Arc::new(MockRemote::new(cdn.clone())),
        Arc::new(MockUploader::new(cdn)),
    )
}

impl MockRemote {
    fn new(cdn: Cdn) -> Self {
        Self {
            state: Mutex::new(Presentation {
                presentation_id: "pres-mock".to_string(),
                layouts: mock_layouts(),
                slides: Vec::new(),
            }),
            media: Mutex::new(HashMap::new()),
            cdn,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// All batches received so far.
    pub fn batches(&self) -> Vec<Vec<Request>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Forget recorded batches (between apply runs).
    pub fn clear_batches(&self) {
        self.batches.lock().unwrap().clear();
    }

    /// The current deck converted back into the slide model.
    pub fn converted_slides(&self) -> Vec<Slide> {
        let state = self.state.lock().unwrap();
        state
            .slides
            .iter()
            .map(|p| convert_to_slide(p, &state))
            .collect()
    }

    /// Seed pages with filled title placeholders, bypassing requests.
    pub fn seed_title_pages(&self, titles: &[&str]) {
        let mut state = self.state.lock().unwrap();
        for (i, title) in titles.iter().enumerate() {
            let object_id = format!("seed-{i}");
            let page = make_page(&state, &object_id, "layout-title", Some(title));
            state.slides.push(page);
        }
    }

    /// Host bytes under a media URL, as the service does on ingestion.
    fn host_copy(&self, source_url: &str) -> (String, Option<Mime>) {
        let bytes = self
            .cdn
            .lock()
            .unwrap()
            .get(source_url)
            .cloned()
            .or_else(|| {
                self.media
                    .lock()
                    .unwrap()
                    .get(source_url)
                    .map(|(b, _)| b.clone())
            })
            .unwrap_or_default();
        let mime = guess_mime(source_url);
        let n = MEDIA_COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
        let ext = mime.map(|m| m.extension()).unwrap_or("bin");
        let url = format!("https://media.mock/m-{n}.{ext}");
        self.media.lock().unwrap().insert(url.clone(), (bytes, mime));
        (url, mime)
    }

    fn apply_request(&self, state: &mut Presentation, request: &Request) -> Result<(), RemoteError> {
        match request {
            Request::CreateSlide {
                object_id,
                insertion_index,
                layout_object_id,
                placeholder_id_mappings,
            } => {
                let layout = state
                    .layouts
                    .iter()
                    .find(|l| &l.object_id == layout_object_id)
                    .ok_or_else(|| RemoteError::ObjectNotFound(layout_object_id.clone()))?
                    .clone();
                let elements = layout
                    .placeholders
                    .iter()
                    .enumerate()
                    .map(|(i, ph)| {
                        let mapped = placeholder_id_mappings
                            .iter()
                            .find(|m| {
                                m.placeholder_type == ph.ptype.as_str()
                                    && m.placeholder_index == ph.index
                            })
                            .map(|m| m.object_id.clone())
                            .unwrap_or_else(|| format!("{object_id}-ph-{i}"));
                        PageElement {
                            object_id: mapped,
                            description: String::new(),
                            size: ph.size,
                            transform: ph.transform,
                            kind: ElementKind::Shape(ShapeElement {
                                placeholder: Some(Placeholder {
                                    ptype: ph.ptype,
                                    index: ph.index,
                                }),
                                paragraphs: Vec::new(),
                            }),
                        }
                    })
                    .collect();
                let page = Page {
                    object_id: object_id.clone(),
                    layout_object_id: layout.object_id.clone(),
                    notes_object_id: Some(format!("{object_id}-notes")),
                    speaker_note: String::new(),
                    skipped: false,
                    elements,
                };
                let at = (*insertion_index as usize).min(state.slides.len());
                state.slides.insert(at, page);
            }

            Request::DeleteObject { object_id } => {
                if let Some(pos) = state.slides.iter().position(|p| &p.object_id == object_id) {
                    state.slides.remove(pos);
                } else {
                    let mut found = false;
                    for page in &mut state.slides {
                        if let Some(pos) =
                            page.elements.iter().position(|e| &e.object_id == object_id)
                        {
                            page.elements.remove(pos);
                            found = true;
                            break;
                        }
                    }
                    if !found {
                        return Err(RemoteError::ObjectNotFound(object_id.clone()));
                    }
                }
            }

            Request::UpdateSlidesPosition {
                slide_object_ids,
                insertion_index,
            } => {
                for object_id in slide_object_ids {
                    let pos = state
                        .slides
                        .iter()
                        .position(|p| &p.object_id == object_id)
                        .ok_or_else(|| RemoteError::ObjectNotFound(object_id.clone()))?;
                    let page = state.slides.remove(pos);
                    let at = (*insertion_index as usize).min(state.slides.len());
                    state.slides.insert(at, page);
                }
            }

            Request::InsertText {
                object_id,
                cell_location,
                text,
                ..
            } => {
                // Speaker notes target the page's notes shape.
                if let Some(page) = state
                    .slides
                    .iter_mut()
                    .find(|p| p.notes_object_id.as_deref() == Some(object_id))
                {
                    page.speaker_note = text.clone();
                    return Ok(());
                }
                let paragraphs: Vec<Paragraph> =
                    text.split('\n').map(Paragraph::plain).collect();
                match find_element_mut(state, object_id)? {
                    (ElementKind::Shape(shape), _) => shape.paragraphs = paragraphs,
                    (ElementKind::Table(table), _) => {
                        let loc = cell_location
                            .ok_or_else(|| RemoteError::ObjectNotFound(object_id.clone()))?;
                        let cell = table
                            .rows
                            .get_mut(loc.row_index as usize)
                            .and_then(|r| r.get_mut(loc.column_index as usize))
                            .ok_or_else(|| RemoteError::ObjectNotFound(object_id.clone()))?;
                        cell.paragraphs = paragraphs;
                    }
                    _ => return Err(RemoteError::ObjectNotFound(object_id.clone())),
                }
            }

            Request::DeleteText {
                object_id,
                cell_location,
                ..
            } => {
                if let Some(page) = state
                    .slides
                    .iter_mut()
                    .find(|p| p.notes_object_id.as_deref() == Some(object_id))
                {
                    page.speaker_note.clear();
                    return Ok(());
                }
                match find_element_mut(state, object_id)? {
                    (ElementKind::Shape(shape), _) => shape.paragraphs.clear(),
                    (ElementKind::Table(table), _) => {
                        let loc = cell_location
                            .ok_or_else(|| RemoteError::ObjectNotFound(object_id.clone()))?;
                        if let Some(cell) = table
                            .rows
                            .get_mut(loc.row_index as usize)
                            .and_then(|r| r.get_mut(loc.column_index as usize))
                        {
                            cell.paragraphs.clear();
                        }
                    }
                    _ => return Err(RemoteError::ObjectNotFound(object_id.clone())),
                }
            }

            Request::UpdateTextStyle {
                object_id,
                cell_location: Some(loc),
                style,
                text_range: Range::All,
                ..
            } if style.bold == Some(true) => {
                // Header-row bolding; the only styling the mock models.
                if let (ElementKind::Table(table), _) = find_element_mut(state, object_id)? {
                    if let Some(cell) = table
                        .rows
                        .get_mut(loc.row_index as usize)
                        .and_then(|r| r.get_mut(loc.column_index as usize))
                    {
                        cell.header = true;
                    }
                }
            }

            Request::CreateShape {
                object_id,
                element_properties,
                ..
            } => {
                let page = find_page_mut(state, &element_properties.page_object_id)?;
                page.elements.push(PageElement {
                    object_id: object_id.clone(),
                    description: String::new(),
                    size: element_properties.size.unwrap_or(Size {
                        width: 0,
                        height: 0,
                    }),
                    transform: element_properties.transform.unwrap_or_default(),
                    kind: ElementKind::Shape(ShapeElement {
                        placeholder: None,
                        paragraphs: Vec::new(),
                    }),
                });
            }

            Request::CreateTable {
                object_id,
                element_properties,
                rows,
                columns,
            } => {
                let page = find_page_mut(state, &element_properties.page_object_id)?;
                page.elements.push(PageElement {
                    object_id: object_id.clone(),
                    description: String::new(),
                    size: element_properties.size.unwrap_or(Size {
                        width: 0,
                        height: 0,
                    }),
                    transform: element_properties.transform.unwrap_or_default(),
                    kind: ElementKind::Table(TableElement {
                        rows: (0..*rows)
                            .map(|_| {
                                (0..*columns).map(|_| TableCellElement::default()).collect()
                            })
                            .collect(),
                    }),
                });
            }

            Request::CreateImage {
                object_id,
                url,
                element_properties,
            } => {
                let (content_url, mime) = self.host_copy(url);
                let page = find_page_mut(state, &element_properties.page_object_id)?;
                page.elements.push(PageElement {
                    object_id: object_id.clone(),
                    description: String::new(),
                    size: element_properties.size.unwrap_or(Size {
                        width: 0,
                        height: 0,
                    }),
                    transform: element_properties.transform.unwrap_or_default(),
                    kind: ElementKind::Image(ImageElement {
                        content_url,
                        source_url: Some(url.clone()),
                        mime,
                        link: None,
                    }),
                });
            }

            Request::ReplaceImage {
                image_object_id,
                url,
                ..
            } => {
                let (content_url, mime) = self.host_copy(url);
                let (kind, _) = find_element_mut(state, image_object_id)?;
                *kind = ElementKind::Image(ImageElement {
                    content_url,
                    source_url: Some(url.clone()),
                    mime,
                    link: None,
                });
            }

            Request::UpdatePageElementAltText {
                object_id,
                description,
            } => {
                let (_, element_description) = find_element_mut(state, object_id)?;
                *element_description = description.clone();
            }

            Request::InsertTableRows {
                table_object_id,
                cell_location,
                insert_below,
                number,
            } => {
                if let (ElementKind::Table(table), _) = find_element_mut(state, table_object_id)? {
                    let cols = table.rows.first().map(|r| r.len()).unwrap_or(0);
                    let at = if *insert_below {
                        cell_location.row_index as usize + 1
                    } else {
                        cell_location.row_index as usize
                    };
                    let at = at.min(table.rows.len());
                    for _ in 0..*number {
                        table
                            .rows
                            .insert(at, (0..cols).map(|_| TableCellElement::default()).collect());
                    }
                }
            }

            Request::DeleteTableRow {
                table_object_id,
                cell_location,
            } => {
                if let (ElementKind::Table(table), _) = find_element_mut(state, table_object_id)? {
                    let row = cell_location.row_index as usize;
                    if row < table.rows.len() {
                        table.rows.remove(row);
                    }
                }
            }

            Request::InsertTableColumns {
                table_object_id,
                cell_location,
                insert_right,
                number,
            } => {
                if let (ElementKind::Table(table), _) = find_element_mut(state, table_object_id)? {
                    let at = if *insert_right {
                        cell_location.column_index as usize + 1
                    } else {
                        cell_location.column_index as usize
                    };
                    for row in &mut table.rows {
                        let at = at.min(row.len());
                        for _ in 0..*number {
                            row.insert(at, TableCellElement::default());
                        }
                    }
                }
            }

            Request::DeleteTableColumn {
                table_object_id,
                cell_location,
            } => {
                if let (ElementKind::Table(table), _) = find_element_mut(state, table_object_id)? {
                    let col = cell_location.column_index as usize;
                    for row in &mut table.rows {
                        if col < row.len() {
                            row.remove(col);
                        }
                    }
                }
            }

            Request::UpdateSlideProperties {
                object_id,
                is_skipped,
                ..
            } => {
                find_page_mut(state, object_id)?.skipped = *is_skipped;
            }

            Request::UpdateTableCellProperties {
                object_id,
                table_range,
                content_alignment: Some(alignment),
                ..
            } => {
                if let (ElementKind::Table(table), _) = find_element_mut(state, object_id)? {
                    let loc = table_range.location;
                    if let Some(cell) = table
                        .rows
                        .get_mut(loc.row_index as usize)
                        .and_then(|r| r.get_mut(loc.column_index as usize))
                    {
                        cell.alignment = match alignment.as_str() {
                            "CENTER" => deck_sync::Alignment::Center,
                            "END" => deck_sync::Alignment::End,
                            _ => deck_sync::Alignment::Start,
                        };
                    }
                }
            }

            // Styling and bullets are recorded but not modeled.
            Request::UpdateTextStyle { .. }
            | Request::CreateParagraphBullets { .. }
            | Request::DeleteParagraphBullets { .. }
            | Request::UpdateShapeProperties { .. }
            | Request::UpdateTableCellProperties { .. }
            | Request::UpdateTableBorderProperties { .. } => {}
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSlides for MockRemote {
    async fn presentation(&self) -> Result<Presentation, RemoteError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn page(&self, object_id: &str) -> Result<Page, RemoteError> {
        self.state
            .lock()
            .unwrap()
            .slides
            .iter()
            .find(|p| p.object_id == object_id)
            .cloned()
            .ok_or_else(|| RemoteError::ObjectNotFound(object_id.to_string()))
    }

    async fn batch_update(&self, requests: Vec<Request>) -> Result<(), RemoteError> {
        self.batches.lock().unwrap().push(requests.clone());
        let mut state = self.state.lock().unwrap();
        for request in &requests {
            self.apply_request(&mut state, request)?;
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Bytes, FetchError> {
        if let Some((bytes, _)) = self.media.lock().unwrap().get(url) {
            return Ok(bytes.clone());
        }
        if let Some(bytes) = self.cdn.lock().unwrap().get(url) {
            return Ok(bytes.clone());
        }
        Err(FetchError::Download {
            url: url.to_string(),
            reason: "not hosted".to_string(),
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn mock_layouts() -> Vec<Layout> {
    let title_size = Size {
        width: 6_000_000,
        height: 800_000,
    };
    let body_size = Size {
        width: 6_000_000,
        height: 3_000_000,
    };
    vec![
        Layout {
            object_id: "layout-title".to_string(),
            name: "TITLE".to_string(),
            placeholders: vec![
                LayoutPlaceholder {
                    ptype: PlaceholderType::Title,
                    index: 0,
                    size: title_size,
                    transform: Transform::default(),
                },
                LayoutPlaceholder {
                    ptype: PlaceholderType::Subtitle,
                    index: 0,
                    size: title_size,
                    transform: Transform {
                        translate_y: 1_000_000.0,
                        ..Transform::default()
                    },
                },
            ],
        },
        Layout {
            object_id: "layout-body".to_string(),
            name: "TITLE_AND_BODY".to_string(),
            placeholders: vec![
                LayoutPlaceholder {
                    ptype: PlaceholderType::Title,
                    index: 0,
                    size: title_size,
                    transform: Transform::default(),
                },
                LayoutPlaceholder {
                    ptype: PlaceholderType::Body,
                    index: 0,
                    size: body_size,
                    transform: Transform {
                        translate_y: 1_200_000.0,
                        ..Transform::default()
                    },
                },
            ],
        },
    ]
}

fn make_page(
    state: &Presentation,
    object_id: &str,
    layout_object_id: &str,
    title: Option<&str>,
) -> Page {
    let layout = state
        .layouts
        .iter()
        .find(|l| l.object_id == layout_object_id)
        .expect("seed layout exists");
    let elements = layout
        .placeholders
        .iter()
        .enumerate()
        .map(|(i, ph)| PageElement {
            object_id: format!("{object_id}-ph-{i}"),
            description: String::new(),
            size: ph.size,
            transform: ph.transform,
            kind: ElementKind::Shape(ShapeElement {
                placeholder: Some(Placeholder {
                    ptype: ph.ptype,
                    index: ph.index,
                }),
                paragraphs: match (ph.ptype, title) {
                    (PlaceholderType::Title, Some(t)) => vec![Paragraph::plain(t)],
                    _ => Vec::new(),
                },
            }),
        })
        .collect();
    Page {
        object_id: object_id.to_string(),
        layout_object_id: layout_object_id.to_string(),
        notes_object_id: Some(format!("{object_id}-notes")),
        speaker_note: String::new(),
        skipped: false,
        elements,
    }
}

fn find_page_mut<'a>(
    state: &'a mut Presentation,
    object_id: &str,
) -> Result<&'a mut Page, RemoteError> {
    state
        .slides
        .iter_mut()
        .find(|p| p.object_id == object_id)
        .ok_or_else(|| RemoteError::ObjectNotFound(object_id.to_string()))
}

fn find_element_mut<'a>(
    state: &'a mut Presentation,
    object_id: &str,
) -> Result<(&'a mut ElementKind, &'a mut String), RemoteError> {
    for page in &mut state.slides {
        for el in &mut page.elements {
            if el.object_id == object_id {
                return Ok((&mut el.kind, &mut el.description));
            }
        }
    }
    Err(RemoteError::ObjectNotFound(object_id.to_string()))
}

fn guess_mime(url: &str) -> Option<Mime> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Mime::parse(path.rsplit('.').next()?)
}
