//! Batched mutation requests.
//!
//! The executor speaks to the presentation service exclusively through
//! these request records, accumulated into batches and applied atomically
//! by the remote. The wire form is camelCase JSON with field masks, the
//! shape the hosted service expects; the mock remote in the test suite
//! interprets the same vocabulary.

use serde::{Deserialize, Serialize};

// =============================================================================
// Geometry
// =============================================================================

/// A size in English Metric Units (1 pt = 12700 EMU).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Size {
    pub width: i64,
    pub height: i64,
}

/// An affine transform placing an element on a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub scale_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }
}

/// Placement block for newly created page elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementProperties {
    pub page_object_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

// =============================================================================
// Text ranges and styles
// =============================================================================

/// A text range within a shape or table cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Range {
    /// `[start_index, end_index)` in UTF-16 code units.
    #[serde(rename = "FIXED_RANGE")]
    Fixed { start_index: u32, end_index: u32 },
    /// The entire text.
    #[serde(rename = "ALL")]
    All,
}

/// Character styling over a range; `fields` is the update mask.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
}

impl TextStyle {
    /// The field mask covering every set attribute.
    pub fn field_mask(&self) -> String {
        let mut fields = Vec::new();
        if self.bold.is_some() {
            fields.push("bold");
        }
        if self.italic.is_some() {
            fields.push("italic");
        }
        if self.font_family.is_some() {
            fields.push("fontFamily");
        }
        if self.link_url.is_some() {
            fields.push("link.url");
        }
        fields.join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.bold.is_none()
            && self.italic.is_none()
            && self.font_family.is_none()
            && self.link_url.is_none()
    }
}

/// Bullet preset applied by `CreateParagraphBullets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulletPreset {
    #[serde(rename = "BULLET_DISC_CIRCLE_SQUARE")]
    DiscCircleSquare,
    #[serde(rename = "NUMBERED_DIGIT_ALPHA_ROMAN")]
    NumberedDigitAlphaRoman,
    #[serde(rename = "NUMBERED_UPPERALPHA_ALPHA_ROMAN")]
    NumberedUpperAlphaAlphaRoman,
}

/// How a replacement image is fitted into the replaced element's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceMethod {
    /// Scale and crop to fill the frame.
    #[serde(rename = "CENTER_CROP")]
    CenterCrop,
    /// Scale to fit entirely inside the frame without cropping.
    #[serde(rename = "CENTER_INSIDE")]
    CenterInside,
}

/// A cell position within a table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellLocation {
    pub row_index: u32,
    pub column_index: u32,
}

/// Shape kinds the synchroniser creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeType {
    #[serde(rename = "TEXT_BOX")]
    TextBox,
}

// =============================================================================
// Requests
// =============================================================================

/// One remote mutation. A batch of these is applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    /// Create a slide at an index, bound to a layout.
    CreateSlide {
        object_id: String,
        insertion_index: u32,
        layout_object_id: String,
        /// Client-assigned object ids for the layout's placeholders,
        /// so content requests in later batches can target them.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        placeholder_id_mappings: Vec<PlaceholderIdMapping>,
    },

    /// Delete a page or page element by object id.
    DeleteObject { object_id: String },

    /// Reposition a slide. `insertion_index` is the position the slide
    /// lands on after it is lifted out of its current spot, matching the
    /// planner's move arithmetic.
    UpdateSlidesPosition {
        slide_object_ids: Vec<String>,
        insertion_index: u32,
    },

    /// Insert text into a shape or table cell at an absolute index.
    InsertText {
        object_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cell_location: Option<CellLocation>,
        text: String,
        insertion_index: u32,
    },

    /// Delete text over a range.
    DeleteText {
        object_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cell_location: Option<CellLocation>,
        text_range: Range,
    },

    /// Apply character styling over a range; `fields` is the mask.
    UpdateTextStyle {
        object_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cell_location: Option<CellLocation>,
        style: TextStyle,
        text_range: Range,
        fields: String,
    },

    /// Turn the paragraphs in a range into bullets using a preset.
    CreateParagraphBullets {
        object_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cell_location: Option<CellLocation>,
        text_range: Range,
        bullet_preset: BulletPreset,
    },

    /// Strip bullets from the paragraphs in a range.
    DeleteParagraphBullets {
        object_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cell_location: Option<CellLocation>,
        text_range: Range,
    },

    /// Create a text box or other shape.
    CreateShape {
        object_id: String,
        shape_type: ShapeType,
        element_properties: ElementProperties,
    },

    /// Create a table.
    CreateTable {
        object_id: String,
        element_properties: ElementProperties,
        rows: u32,
        columns: u32,
    },

    /// Replace an existing image's content by URL.
    ReplaceImage {
        image_object_id: String,
        url: String,
        image_replace_method: ReplaceMethod,
    },

    /// Create an image element from a URL.
    CreateImage {
        object_id: String,
        url: String,
        element_properties: ElementProperties,
    },

    /// Set a page element's alt-text description.
    ///
    /// The synchroniser stamps fixed sentinel strings here to mark
    /// elements it owns.
    UpdatePageElementAltText {
        object_id: String,
        description: String,
    },

    /// Update shape properties under a field mask.
    UpdateShapeProperties {
        object_id: String,
        fields: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_alignment: Option<String>,
    },

    /// Update table cell properties under a field mask.
    UpdateTableCellProperties {
        object_id: String,
        table_range: TableRange,
        fields: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_alignment: Option<String>,
    },

    /// Update table border properties under a field mask.
    UpdateTableBorderProperties {
        object_id: String,
        fields: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        border_weight_emu: Option<i64>,
    },

    /// Insert rows relative to a cell location.
    InsertTableRows {
        table_object_id: String,
        cell_location: CellLocation,
        insert_below: bool,
        number: u32,
    },

    /// Delete the row containing a cell location.
    DeleteTableRow {
        table_object_id: String,
        cell_location: CellLocation,
    },

    /// Insert columns relative to a cell location.
    InsertTableColumns {
        table_object_id: String,
        cell_location: CellLocation,
        insert_right: bool,
        number: u32,
    },

    /// Delete the column containing a cell location.
    DeleteTableColumn {
        table_object_id: String,
        cell_location: CellLocation,
    },

    /// Update slide properties; carries the presenter-hidden flag.
    UpdateSlideProperties {
        object_id: String,
        is_skipped: bool,
        fields: String,
    },
}

/// Maps a layout placeholder to a client-assigned object id on a new
/// slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderIdMapping {
    pub placeholder_type: String,
    pub placeholder_index: u32,
    pub object_id: String,
}

/// A rectangular range of table cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRange {
    pub location: CellLocation,
    pub row_span: u32,
    pub column_span: u32,
}

impl Request {
    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::CreateSlide { .. } => "createSlide",
            Request::DeleteObject { .. } => "deleteObject",
            Request::UpdateSlidesPosition { .. } => "updateSlidesPosition",
            Request::InsertText { .. } => "insertText",
            Request::DeleteText { .. } => "deleteText",
            Request::UpdateTextStyle { .. } => "updateTextStyle",
            Request::CreateParagraphBullets { .. } => "createParagraphBullets",
            Request::DeleteParagraphBullets { .. } => "deleteParagraphBullets",
            Request::CreateShape { .. } => "createShape",
            Request::CreateTable { .. } => "createTable",
            Request::ReplaceImage { .. } => "replaceImage",
            Request::CreateImage { .. } => "createImage",
            Request::UpdatePageElementAltText { .. } => "updatePageElementAltText",
            Request::UpdateShapeProperties { .. } => "updateShapeProperties",
            Request::UpdateTableCellProperties { .. } => "updateTableCellProperties",
            Request::UpdateTableBorderProperties { .. } => "updateTableBorderProperties",
            Request::InsertTableRows { .. } => "insertTableRows",
            Request::DeleteTableRow { .. } => "deleteTableRow",
            Request::InsertTableColumns { .. } => "insertTableColumns",
            Request::DeleteTableColumn { .. } => "deleteTableColumn",
            Request::UpdateSlideProperties { .. } => "updateSlideProperties",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
