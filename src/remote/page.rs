//! The remote presentation snapshot model.
//!
//! A [`Presentation`] is the service-side state the engine diffs against:
//! a layout catalog plus ordered slide [`Page`]s of positioned elements.
//! [`convert_to_slide`] folds a page back into the slide model so the
//! planner compares like with like; converting a page twice always yields
//! structurally equal slides, which is what makes a repeated Apply a
//! no-op.
//!
//! # Markdown-managed elements
//!
//! The engine only ever rewrites elements it created itself. Ownership is
//! recorded in the element's alt-text description using three fixed
//! sentinel strings; anything else on a slide was authored directly in
//! the remote editor and is left untouched (or copied verbatim during a
//! layout swap).

use bytes::Bytes;

use crate::error::PlanError;
use crate::model::image::Mime;
use crate::model::{
    Alignment, BlockQuote, Body, Image, Paragraph, Slide, Table, TableCell, TableRow,
};

use super::requests::{Size, Transform};

// =============================================================================
// Sentinels and defaults
// =============================================================================

/// Alt text marking an image as Markdown-managed.
pub const IMAGE_ALT: &str = "Image generated from markdown";

/// Alt text marking a block-quote text box as Markdown-managed.
pub const TEXTBOX_ALT: &str = "Textbox generated from markdown";

/// Alt text marking a table as Markdown-managed.
pub const TABLE_ALT: &str = "Table generated from markdown";

/// Layout substituted for an empty layout name on the first slide.
pub const DEFAULT_TITLE_LAYOUT: &str = "TITLE";

/// Layout substituted for an empty layout name on any other slide.
pub const DEFAULT_BODY_LAYOUT: &str = "TITLE_AND_BODY";

// =============================================================================
// Elements
// =============================================================================

/// Placeholder role inherited from the layout scaffold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderType {
    Title,
    CenteredTitle,
    Subtitle,
    Body,
    Picture,
    Other,
}

/// The three placeholder families the synchroniser fills with text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderFamily {
    Title,
    Subtitle,
    Body,
}

impl PlaceholderType {
    /// Wire name used in placeholder id mappings.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderType::Title => "TITLE",
            PlaceholderType::CenteredTitle => "CENTERED_TITLE",
            PlaceholderType::Subtitle => "SUBTITLE",
            PlaceholderType::Body => "BODY",
            PlaceholderType::Picture => "PICTURE",
            PlaceholderType::Other => "OTHER",
        }
    }

    /// Which text family this placeholder belongs to, if any.
    pub fn family(&self) -> Option<PlaceholderFamily> {
        match self {
            PlaceholderType::Title | PlaceholderType::CenteredTitle => {
                Some(PlaceholderFamily::Title)
            }
            PlaceholderType::Subtitle => Some(PlaceholderFamily::Subtitle),
            PlaceholderType::Body => Some(PlaceholderFamily::Body),
            _ => None,
        }
    }
}

/// A placeholder binding on a concrete page element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub ptype: PlaceholderType,
    pub index: u32,
}

/// A shape element: placeholder or free-standing text box.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapeElement {
    pub placeholder: Option<Placeholder>,
    pub paragraphs: Vec<Paragraph>,
}

/// An image element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageElement {
    /// Service-hosted content URL the bytes can be fetched from.
    pub content_url: String,
    /// Original source URL, when the service kept it.
    pub source_url: Option<String>,
    pub mime: Option<Mime>,
    /// Hyperlink attached to the image.
    pub link: Option<String>,
}

/// A single remote table cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableCellElement {
    pub paragraphs: Vec<Paragraph>,
    pub alignment: Alignment,
    pub header: bool,
}

/// A table element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableElement {
    pub rows: Vec<Vec<TableCellElement>>,
}

/// Element payload variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Shape(ShapeElement),
    Image(ImageElement),
    Table(TableElement),
}

/// A positioned element on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageElement {
    pub object_id: String,
    /// Alt-text description; carries the ownership sentinels.
    pub description: String,
    pub size: Size,
    pub transform: Transform,
    pub kind: ElementKind,
}

impl PageElement {
    /// Whether this element carries one of the Markdown-managed
    /// sentinels.
    pub fn is_markdown_managed(&self) -> bool {
        matches!(self.description.as_str(), IMAGE_ALT | TEXTBOX_ALT | TABLE_ALT)
    }

    /// The placeholder binding, if this is a placeholder shape.
    pub fn placeholder(&self) -> Option<Placeholder> {
        match &self.kind {
            ElementKind::Shape(shape) => shape.placeholder,
            _ => None,
        }
    }

    /// Sort key: top-to-bottom, then left-to-right.
    fn position_key(&self) -> (f64, f64) {
        (self.transform.translate_y, self.transform.translate_x)
    }
}

// =============================================================================
// Pages and layouts
// =============================================================================

/// One slide page in the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub object_id: String,
    pub layout_object_id: String,
    /// The speaker-notes shape, when the page has one.
    pub notes_object_id: Option<String>,
    pub speaker_note: String,
    /// The presenter-hidden flag.
    pub skipped: bool,
    pub elements: Vec<PageElement>,
}

impl Page {
    /// Placeholder elements of a family, sorted by (y, x).
    pub fn placeholders_of(&self, family: PlaceholderFamily) -> Vec<&PageElement> {
        let mut elements: Vec<&PageElement> = self
            .elements
            .iter()
            .filter(|el| {
                el.placeholder()
                    .and_then(|p| p.ptype.family())
                    .map(|f| f == family)
                    .unwrap_or(false)
            })
            .collect();
        elements.sort_by(|a, b| {
            a.position_key()
                .partial_cmp(&b.position_key())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        elements
    }

    /// Unfilled picture placeholders available for `ReplaceImage`.
    pub fn picture_placeholders(&self) -> Vec<&PageElement> {
        self.elements
            .iter()
            .filter(|el| {
                el.placeholder()
                    .map(|p| p.ptype == PlaceholderType::Picture)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Markdown-managed image elements, in element order.
    pub fn markdown_images(&self) -> Vec<&PageElement> {
        self.elements
            .iter()
            .filter(|el| el.description == IMAGE_ALT && matches!(el.kind, ElementKind::Image(_)))
            .collect()
    }

    /// Markdown-managed block-quote text boxes, in element order.
    pub fn markdown_textboxes(&self) -> Vec<&PageElement> {
        self.elements
            .iter()
            .filter(|el| el.description == TEXTBOX_ALT && matches!(el.kind, ElementKind::Shape(_)))
            .collect()
    }

    /// Markdown-managed tables, in element order.
    pub fn markdown_tables(&self) -> Vec<&PageElement> {
        self.elements
            .iter()
            .filter(|el| el.description == TABLE_ALT && matches!(el.kind, ElementKind::Table(_)))
            .collect()
    }
}

/// A layout placeholder definition.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlaceholder {
    pub ptype: PlaceholderType,
    pub index: u32,
    pub size: Size,
    pub transform: Transform,
}

/// A named layout in the presentation's catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub object_id: String,
    pub name: String,
    pub placeholders: Vec<LayoutPlaceholder>,
}

/// The remote presentation snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Presentation {
    pub presentation_id: String,
    pub layouts: Vec<Layout>,
    pub slides: Vec<Page>,
}

impl Presentation {
    /// Find a layout by its catalog name.
    pub fn layout_by_name(&self, name: &str) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.name == name)
    }

    /// Find a layout by object id.
    pub fn layout_by_id(&self, object_id: &str) -> Option<&Layout> {
        self.layouts.iter().find(|l| l.object_id == object_id)
    }

    /// Resolve a slide's layout name, substituting the defaults for an
    /// empty name: the title layout at index 0, the body layout after.
    pub fn resolve_layout(&self, name: &str, slide_index: usize) -> Result<&Layout, PlanError> {
        let name = if !name.is_empty() {
            name
        } else if slide_index == 0 {
            DEFAULT_TITLE_LAYOUT
        } else {
            DEFAULT_BODY_LAYOUT
        };
        self.layout_by_name(name)
            .ok_or_else(|| PlanError::MissingLayout(name.to_string()))
    }
}

// =============================================================================
// Snapshot conversion
// =============================================================================

/// Fold a remote page into the slide model.
///
/// Placeholder text maps back by family in (y, x) order; only
/// Markdown-managed images, text boxes and tables are converted, so
/// hand-authored elements never participate in the diff. Rich text is
/// normalized, giving `convert(p) == convert(p)` structural equality.
pub fn convert_to_slide(page: &Page, presentation: &Presentation) -> Slide {
    let mut slide = Slide::new(
        presentation
            .layout_by_id(&page.layout_object_id)
            .map(|l| l.name.clone())
            .unwrap_or_default(),
    );

    slide.titles = placeholder_texts(page, PlaceholderFamily::Title);
    slide.subtitles = placeholder_texts(page, PlaceholderFamily::Subtitle);

    for el in page.placeholders_of(PlaceholderFamily::Body) {
        let ElementKind::Shape(shape) = &el.kind else {
            continue;
        };
        if shape.paragraphs.is_empty() {
            continue;
        }
        slide.bodies.push(Body {
            paragraphs: shape.paragraphs.clone(),
        });
    }

    for el in page.markdown_images() {
        let ElementKind::Image(img) = &el.kind else {
            continue;
        };
        let mime = img
            .mime
            .or_else(|| guess_mime(&img.content_url))
            .unwrap_or(Mime::Png);
        let mut image = Image::new(Bytes::new(), mime)
            .with_source_url(img.content_url.clone())
            .with_from_markdown(true);
        if let Some(link) = &img.link {
            image = image.with_external_link(link.clone());
        }
        slide.images.push(std::sync::Arc::new(image));
    }

    for el in page.markdown_textboxes() {
        let ElementKind::Shape(shape) = &el.kind else {
            continue;
        };
        slide.block_quotes.push(BlockQuote {
            paragraphs: shape.paragraphs.clone(),
            nesting: 0,
        });
    }

    for el in page.markdown_tables() {
        let ElementKind::Table(table) = &el.kind else {
            continue;
        };
        slide.tables.push(Table {
            rows: table
                .rows
                .iter()
                .map(|row| TableRow {
                    cells: row
                        .iter()
                        .map(|cell| TableCell {
                            fragments: cell
                                .paragraphs
                                .iter()
                                .flat_map(|p| p.fragments.iter().cloned())
                                .collect(),
                            alignment: cell.alignment,
                            header: cell.header,
                        })
                        .collect(),
                })
                .collect(),
        });
    }

    slide.speaker_note = page.speaker_note.clone();
    slide.skip = page.skipped;
    soften_breaks(&mut slide);
    slide.normalize();
    slide
}

/// Map the service's vertical-tab soft breaks back to `\n`, the form the
/// Markdown parser produces.
fn soften_breaks(slide: &mut Slide) {
    fn soften_paragraphs(paragraphs: &mut [Paragraph]) {
        for para in paragraphs {
            for frag in &mut para.fragments {
                if frag.value.contains('\u{000b}') {
                    frag.value = frag.value.replace('\u{000b}', "\n");
                }
            }
        }
    }

    for title in slide.titles.iter_mut().chain(slide.subtitles.iter_mut()) {
        if title.contains('\u{000b}') {
            *title = title.replace('\u{000b}', "\n");
        }
    }
    for body in &mut slide.bodies {
        soften_paragraphs(&mut body.paragraphs);
    }
    for quote in &mut slide.block_quotes {
        soften_paragraphs(&mut quote.paragraphs);
    }
    for table in &mut slide.tables {
        for row in &mut table.rows {
            for cell in &mut row.cells {
                for frag in &mut cell.fragments {
                    if frag.value.contains('\u{000b}') {
                        frag.value = frag.value.replace('\u{000b}', "\n");
                    }
                }
            }
        }
    }
}

/// Non-empty plain texts of a placeholder family, in (y, x) order.
fn placeholder_texts(page: &Page, family: PlaceholderFamily) -> Vec<String> {
    page.placeholders_of(family)
        .into_iter()
        .filter_map(|el| {
            let ElementKind::Shape(shape) = &el.kind else {
                return None;
            };
            if shape.paragraphs.is_empty() {
                return None;
            }
            let text = shape
                .paragraphs
                .iter()
                .map(|p| p.plain_text())
                .collect::<Vec<_>>()
                .join("\n");
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

/// Guess a MIME type from a URL's file extension.
fn guess_mime(url: &str) -> Option<Mime> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next()?;
    Mime::parse(ext)
}

// =============================================================================
// Tests
// =============================================================================
