//! Data model shared by the planner and the apply pipeline.
//!
//! - [`slide`] - slides, paragraphs, fragments, quotes, tables
//! - [`image`] - image blobs, digests, upload lifecycle
//! - [`cache`] - the process-global image cache

pub mod cache;
pub mod image;
pub mod slide;

pub use cache::ImageCache;
pub use image::{Image, MatchOptions, Mime, UploadState};
pub use slide::{
    Alignment, BlockQuote, Body, Bullet, Fragment, Paragraph, Slide, Table, TableCell, TableRow,
};
