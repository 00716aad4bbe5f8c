//! The slide data model.
//!
//! A deck is an ordered sequence of [`Slide`]s. Each slide carries plain
//! title/subtitle strings, rich-text bodies, images, block quotes, tables
//! and a speaker note. The Markdown parser produces this model; the
//! reconciliation engine diffs two such sequences and pushes the result to
//! the remote service.
//!
//! Rich text is modeled as [`Paragraph`]s of [`Fragment`]s. Two fragments
//! with equal styles are mergeable by concatenating their values, which
//! [`Paragraph::normalize`] relies on to give snapshot-derived and
//! parser-derived text a canonical form.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::image::Image;

// =============================================================================
// Fragments and Paragraphs
// =============================================================================

/// A run of text with uniform styling.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    /// The text value. May contain `\n` for soft line breaks.
    pub value: String,

    /// Bold flag.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,

    /// Italic flag.
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,

    /// Inline-code flag.
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,

    /// Link URL; empty when the fragment is not a link.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link: String,

    /// Named style reference, resolved by the parser collaborator.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub style_name: String,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl Fragment {
    /// Create a plain, unstyled fragment.
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Whether two fragments carry the same styling and can be merged.
    pub fn same_style(&self, other: &Fragment) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.code == other.code
            && self.link == other.link
            && self.style_name == other.style_name
    }

    /// Whether the fragment carries any styling at all.
    pub fn is_styled(&self) -> bool {
        self.bold || self.italic || self.code || !self.link.is_empty()
    }
}

/// Bullet kind of a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bullet {
    /// Not a bullet paragraph.
    #[default]
    None,
    /// Unordered bullet.
    Dash,
    /// Numbered list item.
    Numbered,
    /// Alphabetic list item.
    Alpha,
}

/// A paragraph: fragments plus bullet kind and nesting depth.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    pub fragments: Vec<Fragment>,

    #[serde(default)]
    pub bullet: Bullet,

    /// Nesting depth; non-negative, 0 is top level.
    #[serde(default)]
    pub nesting: usize,
}

impl Paragraph {
    /// Create a plain paragraph from a single text value.
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            fragments: vec![Fragment::plain(value)],
            ..Self::default()
        }
    }

    /// Merge adjacent fragments with equal styles and drop empty ones.
    ///
    /// Remote snapshots split text into arbitrary runs; normalizing both
    /// sides lets structural equality compare content rather than run
    /// boundaries.
    pub fn normalize(&mut self) {
        let fragments = std::mem::take(&mut self.fragments);
        for frag in fragments {
            if frag.value.is_empty() {
                continue;
            }
            match self.fragments.last_mut() {
                Some(last) if last.same_style(&frag) => last.value.push_str(&frag.value),
                _ => self.fragments.push(frag),
            }
        }
    }

    /// The concatenated plain text of all fragments.
    pub fn plain_text(&self) -> String {
        self.fragments.iter().map(|f| f.value.as_str()).collect()
    }
}

// =============================================================================
// Bodies, Quotes, Tables
// =============================================================================

/// One body: an ordered paragraph sequence bound to one body placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Body {
    pub paragraphs: Vec<Paragraph>,
}

/// A block quote rendered as a standalone text box.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockQuote {
    pub paragraphs: Vec<Paragraph>,

    /// Quote nesting depth (`>` count minus one).
    #[serde(default)]
    pub nesting: usize,
}

/// Horizontal alignment of a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Start,
    Center,
    End,
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    pub fragments: Vec<Fragment>,

    #[serde(default)]
    pub alignment: Alignment,

    /// Whether the cell belongs to the header row.
    #[serde(default, skip_serializing_if = "is_false")]
    pub header: bool,
}

impl TableCell {
    /// The concatenated plain text of the cell.
    pub fn plain_text(&self) -> String {
        self.fragments.iter().map(|f| f.value.as_str()).collect()
    }
}

/// A table: rows of cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

impl Table {
    /// `(rows, columns)` of the table. Columns is the widest row.
    pub fn dimensions(&self) -> (usize, usize) {
        let rows = self.rows.len();
        let columns = self.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        (rows, columns)
    }
}

// =============================================================================
// Slide
// =============================================================================

/// The unit of reconciliation work.
///
/// `new` and `delete` are planner-internal markers set only inside the
/// length equalizer and action generator; they are never part of user
/// data and never serialized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    /// Layout name, a key into the remote service's layout catalog.
    pub layout: String,

    /// Plain title strings, one per title placeholder.
    #[serde(default)]
    pub titles: Vec<String>,

    /// Plain subtitle strings, one per subtitle placeholder.
    #[serde(default)]
    pub subtitles: Vec<String>,

    /// Rich-text bodies, one per body placeholder.
    #[serde(default)]
    pub bodies: Vec<Body>,

    /// Images on the slide, shared by reference within a run.
    #[serde(default, with = "super::image::images_serde")]
    pub images: Vec<Arc<Image>>,

    /// Block quotes rendered as standalone text boxes.
    #[serde(default)]
    pub block_quotes: Vec<BlockQuote>,

    /// Tables on the slide.
    #[serde(default)]
    pub tables: Vec<Table>,

    /// Speaker note text.
    #[serde(default)]
    pub speaker_note: String,

    /// Skip reconciliation for this slide entirely.
    #[serde(default)]
    pub freeze: bool,

    /// Propagated to the remote slide's presenter-hidden flag.
    #[serde(default)]
    pub skip: bool,

    /// Planner-internal: surrogate appended to pad `before`.
    #[serde(skip)]
    pub(crate) new: bool,

    /// Planner-internal: surrogate appended to pad `after`.
    #[serde(skip)]
    pub(crate) delete: bool,
}

impl Slide {
    /// Create an empty slide bound to a layout.
    pub fn new(layout: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            ..Self::default()
        }
    }

    /// A copy with the planner-internal markers cleared.
    pub(crate) fn clone_clean(&self) -> Self {
        let mut copy = self.clone();
        copy.new = false;
        copy.delete = false;
        copy
    }

    /// Normalize all rich text in place.
    pub fn normalize(&mut self) {
        for body in &mut self.bodies {
            for para in &mut body.paragraphs {
                para.normalize();
            }
        }
        for quote in &mut self.block_quotes {
            for para in &mut quote.paragraphs {
                para.normalize();
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
