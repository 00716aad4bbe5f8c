//! The remote presentation service seam.
//!
//! The engine is agnostic to how the service is reached; everything it
//! needs is behind [`RemoteSlides`]. The production implementation wraps
//! the hosted service's HTTP API (with credential and retry plumbing
//! owned by the caller); tests substitute an in-memory mock that
//! interprets the same request vocabulary.

pub mod page;
pub mod requests;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{FetchError, RemoteError};

pub use page::{
    convert_to_slide, ElementKind, ImageElement, Layout, LayoutPlaceholder, Page, PageElement,
    Placeholder, PlaceholderFamily, PlaceholderType, Presentation, ShapeElement, TableCellElement,
    TableElement, DEFAULT_BODY_LAYOUT, DEFAULT_TITLE_LAYOUT, IMAGE_ALT, TABLE_ALT, TEXTBOX_ALT,
};
pub use requests::{
    BulletPreset, CellLocation, ElementProperties, PlaceholderIdMapping, Range, ReplaceMethod,
    Request, ShapeType, Size, TableRange, TextStyle, Transform,
};

/// The remote presentation service.
///
/// All mutation requests in one `batch_update` call are applied
/// atomically; the engine relies on that for ranged text edits.
#[async_trait]
pub trait RemoteSlides: Send + Sync {
    /// Fetch the full presentation snapshot.
    async fn presentation(&self) -> Result<Presentation, RemoteError>;

    /// Fetch a single page by object id.
    async fn page(&self, object_id: &str) -> Result<Page, RemoteError>;

    /// Apply a batch of mutations atomically.
    async fn batch_update(&self, requests: Vec<Request>) -> Result<(), RemoteError>;

    /// Download raw bytes from a service-hosted content URL.
    async fn download(&self, url: &str) -> Result<Bytes, FetchError>;
}
