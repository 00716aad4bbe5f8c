//! # deck-sync
//!
//! A reconciliation engine that pushes Markdown-derived slide decks to a
//! hosted presentation service.
//!
//! Given a "before" sequence (the presentation as currently hosted) and
//! an "after" sequence (the desired deck), the engine computes a minimal
//! ordered edit script of `Append`/`Update`/`Move`/`Delete` actions and
//! executes it through batched remote mutations, while pre-fetching
//! existing per-slide images in parallel, uploading new image blobs in
//! the background, and cleaning up transient uploads on exit.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`model`] - slides, rich text, images, the process-global image cache
//! - [`plan`] - similarity scoring, length equalization, Hungarian
//!   assignment and action generation
//! - [`remote`] - the presentation-service seam: snapshot model and
//!   batched mutation requests
//! - [`upload`] - image pre-fetch, background upload and cleanup
//! - [`apply`] - the executor and per-slide content synchroniser
//! - [`config`] - tunables and defaults
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use deck_sync::{Apply, CommandUploader, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remote = Arc::new(my_service_client());
//!     let uploader = Arc::new(CommandUploader::new("deck-upload-helper"));
//!     let apply = Apply::new(remote, uploader, Config::default());
//!
//!     let slides = parse_markdown_deck("slides.md")?;
//!     apply.run(&slides, &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod apply;
pub mod config;
pub mod error;
pub mod model;
pub mod plan;
pub mod remote;
pub mod upload;

// Re-export commonly used types
pub use apply::{Apply, Executor, IdGenerator};
pub use config::Config;
pub use error::{ApplyError, CleanupError, FetchError, PlanError, RemoteError, UploadError};
pub use model::{
    Alignment, BlockQuote, Body, Bullet, Fragment, Image, ImageCache, MatchOptions, Mime,
    Paragraph, Slide, Table, TableCell, TableRow, UploadState,
};
pub use plan::{
    adjust_slide_count, generate_actions, generate_actions_with, get_similarity,
    get_similarity_for_mapping, map_slides, map_slides_with, Action, Strategy, IDENTICAL,
};
pub use remote::{
    convert_to_slide, Layout, Page, PageElement, Presentation, RemoteSlides, Request,
    DEFAULT_BODY_LAYOUT, DEFAULT_TITLE_LAYOUT, IMAGE_ALT, TABLE_ALT, TEXTBOX_ALT,
};
pub use upload::{
    cleanup, collect_uploads, prefetch, start_uploads, CommandUploader, Prefetched, SlideImages,
    UploadedResource, Uploader, UPLOAD_FILENAME_PREFIX,
};
