//! Paragraph-to-request translation.
//!
//! A content container (placeholder, text box, table cell) is written in
//! one pass: a single `InsertText` with the full linear buffer, then
//! per-fragment style ranges, then bullet ranges.
//!
//! # Index arithmetic
//!
//! The remote text model counts UTF-16 code units (surrogate pairs count
//! as 2), so the running character index does too. Bulleted paragraphs
//! are prefixed with one tab per nesting level; applying a bullet range
//! consumes those tabs and shifts everything after it, which is why
//! `CreateParagraphBullets` requests are emitted in descending start
//! order. Inline line breaks become vertical tabs so the service treats
//! them as soft breaks inside the paragraph.

use crate::model::{Bullet, Fragment, Paragraph};
use crate::remote::{BulletPreset, CellLocation, Range, Request, TextStyle};

/// Font substituted for inline-code fragments.
const CODE_FONT: &str = "Courier New";

/// UTF-16 code-unit length of a string.
pub fn utf16_len(s: &str) -> u32 {
    s.chars().map(char::len_utf16).sum::<usize>() as u32
}

/// Character style of a fragment, empty when unstyled.
fn fragment_style(frag: &Fragment) -> TextStyle {
    let mut style = TextStyle::default();
    if frag.bold {
        style.bold = Some(true);
    }
    if frag.italic {
        style.italic = Some(true);
    }
    if frag.code {
        style.font_family = Some(CODE_FONT.to_string());
    }
    if !frag.link.is_empty() {
        style.link_url = Some(frag.link.clone());
    }
    style
}

fn bullet_preset(bullet: Bullet) -> Option<BulletPreset> {
    match bullet {
        Bullet::None => None,
        Bullet::Dash => Some(BulletPreset::DiscCircleSquare),
        Bullet::Numbered => Some(BulletPreset::NumberedDigitAlphaRoman),
        Bullet::Alpha => Some(BulletPreset::NumberedUpperAlphaAlphaRoman),
    }
}

/// Requests that clear a container's bullets, text and styles.
///
/// Deleting text from an already-empty container is a remote error, so
/// the caller states whether the container currently has text.
pub fn clear_requests(
    object_id: &str,
    cell: Option<CellLocation>,
    has_text: bool,
) -> Vec<Request> {
    if !has_text {
        return Vec::new();
    }
    vec![
        Request::DeleteParagraphBullets {
            object_id: object_id.to_string(),
            cell_location: cell,
            text_range: Range::All,
        },
        Request::DeleteText {
            object_id: object_id.to_string(),
            cell_location: cell,
            text_range: Range::All,
        },
    ]
}

/// Translate paragraphs into insertion, style and bullet requests.
pub fn text_requests(
    object_id: &str,
    cell: Option<CellLocation>,
    paragraphs: &[Paragraph],
) -> Vec<Request> {
    let mut buffer = String::new();
    let mut counter: u32 = 0;
    let mut style_ranges: Vec<(u32, u32, TextStyle)> = Vec::new();
    // (start, end, bullet) of the currently accumulating bullet group.
    let mut bullet_groups: Vec<(u32, u32, Bullet)> = Vec::new();
    let mut open_group: Option<(u32, u32, Bullet)> = None;

    for (k, para) in paragraphs.iter().enumerate() {
        if k > 0 {
            buffer.push('\n');
            counter += 1;
        }
        let para_start = counter;

        if para.bullet != Bullet::None {
            for _ in 0..para.nesting {
                buffer.push('\t');
            }
            counter += para.nesting as u32;
        }

        for frag in &para.fragments {
            let text = frag.value.replace('\n', "\u{000b}");
            let start = counter;
            counter += utf16_len(&text);
            buffer.push_str(&text);
            let style = fragment_style(frag);
            if !style.is_empty() && counter > start {
                style_ranges.push((start, counter, style));
            }
        }
        let para_end = counter;

        // Bullet grouping: a top-level kind change opens a new range,
        // nested paragraphs continue the enclosing one.
        if para.bullet == Bullet::None {
            if let Some(group) = open_group.take() {
                bullet_groups.push(group);
            }
        } else {
            let continues = matches!(
                open_group,
                Some((_, _, kind)) if para.nesting > 0 || kind == para.bullet
            );
            if continues {
                if let Some((_, end, _)) = &mut open_group {
                    *end = para_end;
                }
            } else {
                if let Some(group) = open_group.take() {
                    bullet_groups.push(group);
                }
                open_group = Some((para_start, para_end, para.bullet));
            }
        }
    }
    if let Some(group) = open_group.take() {
        bullet_groups.push(group);
    }

    if buffer.is_empty() {
        return Vec::new();
    }

    let mut requests = Vec::with_capacity(1 + style_ranges.len() + bullet_groups.len());
    requests.push(Request::InsertText {
        object_id: object_id.to_string(),
        cell_location: cell,
        text: buffer,
        insertion_index: 0,
    });

    for (start, end, style) in style_ranges {
        let fields = style.field_mask();
        requests.push(Request::UpdateTextStyle {
            object_id: object_id.to_string(),
            cell_location: cell,
            style,
            text_range: Range::Fixed {
                start_index: start,
                end_index: end,
            },
            fields,
        });
    }

    // Descending start order: each applied range consumes its leading
    // tabs and shifts everything after it.
    bullet_groups.sort_by(|a, b| b.0.cmp(&a.0));
    for (start, end, bullet) in bullet_groups {
        let Some(preset) = bullet_preset(bullet) else {
            continue;
        };
        requests.push(Request::CreateParagraphBullets {
            object_id: object_id.to_string(),
            cell_location: cell,
            text_range: Range::Fixed {
                start_index: start,
                end_index: end,
            },
            bullet_preset: preset,
        });
    }

    requests
}

// =============================================================================
// Tests
// =============================================================================
