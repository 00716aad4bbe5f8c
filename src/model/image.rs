//! Images and their upload lifecycle.
//!
//! An [`Image`] owns a raw byte buffer plus its declared MIME type and
//! provenance. Two lazily computed digests back the equivalence relation:
//! a CRC-32 checksum and, for JPEGs, an 8x8 average perceptual hash that
//! tolerates re-encoding noise.
//!
//! # Upload state machine
//!
//! ```text
//! NotStarted ──► InProgress ──► Completed { url, resource_id }
//!     │                   └───► Failed(err)
//!     └────────────────────────► Completed { url }   (public-web URL)
//! ```
//!
//! Terminal states never transition again. The state sits behind the
//! image's own read-write lock; readers poll it, the upload worker writes
//! it. Images are shared across slides via `Arc`, so the state is visible
//! to every holder.

use std::fmt;
use std::sync::{OnceLock, RwLock};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{DEFAULT_PHASH_THRESHOLD, DEFAULT_POLL_INTERVAL_MS};
use crate::error::{ApplyError, UploadError};

// =============================================================================
// MIME
// =============================================================================

/// Declared image MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mime {
    Png,
    Jpeg,
    Gif,
}

impl Mime {
    /// Canonical MIME string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mime::Png => "image/png",
            Mime::Jpeg => "image/jpeg",
            Mime::Gif => "image/gif",
        }
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Mime::Png => "png",
            Mime::Jpeg => "jpg",
            Mime::Gif => "gif",
        }
    }

    /// Parse a MIME string, tolerating the bare subtype.
    pub fn parse(s: &str) -> Option<Mime> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/png" | "png" => Some(Mime::Png),
            "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => Some(Mime::Jpeg),
            "image/gif" | "gif" => Some(Mime::Gif),
            _ => None,
        }
    }

    fn format(&self) -> image::ImageFormat {
        match self {
            Mime::Png => image::ImageFormat::Png,
            Mime::Jpeg => image::ImageFormat::Jpeg,
            Mime::Gif => image::ImageFormat::Gif,
        }
    }
}

impl fmt::Display for Mime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Upload state
// =============================================================================

/// Lifecycle state of an image's upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    /// No upload scheduled yet.
    NotStarted,
    /// An upload worker owns this image.
    InProgress,
    /// The image is addressable at `url`; `resource_id` is set for
    /// transient uploads that need cleanup, `None` for public-web URLs.
    Completed {
        url: String,
        resource_id: Option<String>,
    },
    /// The upload failed; consumers surface the error.
    Failed(UploadError),
}

// =============================================================================
// Match options
// =============================================================================

/// Policy knobs for the image equivalence relation.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Perceptual-hash distance below which two images are the same.
    pub phash_threshold: u32,

    /// Apply the perceptual-hash rule to all MIME types, not only JPEG.
    pub phash_any_mime: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            phash_threshold: DEFAULT_PHASH_THRESHOLD,
            phash_any_mime: false,
        }
    }
}

impl From<&crate::config::Config> for MatchOptions {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            phash_threshold: config.phash_threshold,
            phash_any_mime: config.phash_any_mime,
        }
    }
}

// =============================================================================
// Image
// =============================================================================

/// An image blob with provenance and upload lifecycle.
pub struct Image {
    bytes: Bytes,
    mime: Mime,
    source_url: Option<String>,
    from_markdown: bool,
    from_code_block: bool,
    external_link: Option<String>,
    mod_time: Option<SystemTime>,
    checksum: OnceLock<u32>,
    phash: OnceLock<Option<u64>>,
    state: RwLock<UploadState>,
}

impl Image {
    /// Create an image from raw bytes.
    pub fn new(bytes: impl Into<Bytes>, mime: Mime) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
            source_url: None,
            from_markdown: false,
            from_code_block: false,
            external_link: None,
            mod_time: None,
            checksum: OnceLock::new(),
            phash: OnceLock::new(),
            state: RwLock::new(UploadState::NotStarted),
        }
    }

    /// Create an image addressed by a public web URL.
    ///
    /// The upload is skipped entirely: the state is pre-marked
    /// `Completed` with the URL itself as result and no resource id, so
    /// cleanup never touches it.
    pub fn from_public_url(url: impl Into<String>, mime: Mime) -> Self {
        let url = url.into();
        let mut image = Self::new(Bytes::new(), mime);
        image.source_url = Some(url.clone());
        *image.state.get_mut().unwrap_or_else(|e| e.into_inner()) = UploadState::Completed {
            url,
            resource_id: None,
        };
        image
    }

    /// Set the source URL (remote content URL or local file path).
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Mark the image as generated from Markdown.
    pub fn with_from_markdown(mut self, from_markdown: bool) -> Self {
        self.from_markdown = from_markdown;
        self
    }

    /// Mark the image as rendered from a code block.
    pub fn with_from_code_block(mut self, from_code_block: bool) -> Self {
        self.from_code_block = from_code_block;
        self
    }

    /// Attach the caller-supplied external link.
    pub fn with_external_link(mut self, link: impl Into<String>) -> Self {
        self.external_link = Some(link.into());
        self
    }

    /// Set the local-file modification timestamp.
    pub fn with_mod_time(mut self, mod_time: SystemTime) -> Self {
        self.mod_time = Some(mod_time);
        self
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime(&self) -> Mime {
        self.mime
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn from_markdown(&self) -> bool {
        self.from_markdown
    }

    pub fn from_code_block(&self) -> bool {
        self.from_code_block
    }

    pub fn external_link(&self) -> Option<&str> {
        self.external_link.as_deref()
    }

    pub fn mod_time(&self) -> Option<SystemTime> {
        self.mod_time
    }

    /// Whether the source URL is a plain public web URL (http/https).
    pub fn is_public_url(&self) -> bool {
        self.source_url
            .as_deref()
            .and_then(|s| Url::parse(s).ok())
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    // =========================================================================
    // Digests and equivalence
    // =========================================================================

    /// CRC-32 checksum of the raw bytes, computed once on first use.
    pub fn checksum(&self) -> u32 {
        *self.checksum.get_or_init(|| crc32fast::hash(&self.bytes))
    }

    /// 8x8 average perceptual hash, computed once on first use.
    ///
    /// Returns `None` when the bytes cannot be decoded as the declared
    /// format.
    pub fn perceptual_hash(&self) -> Option<u64> {
        *self.phash.get_or_init(|| {
            let decoded =
                image::load_from_memory_with_format(&self.bytes, self.mime.format()).ok()?;
            Some(average_hash(&decoded))
        })
    }

    /// The image equivalence relation.
    ///
    /// Same MIME, same external link, and either an equal checksum or
    /// (for JPEG pairs, unless `phash_any_mime`) a perceptual-hash
    /// distance below the threshold.
    pub fn equivalent(&self, other: &Image, opts: &MatchOptions) -> bool {
        if self.mime != other.mime || self.external_link != other.external_link {
            return false;
        }
        if self.checksum() == other.checksum() {
            return true;
        }
        let phash_eligible =
            opts.phash_any_mime || (self.mime == Mime::Jpeg && other.mime == Mime::Jpeg);
        if !phash_eligible {
            return false;
        }
        match (self.perceptual_hash(), other.perceptual_hash()) {
            (Some(a), Some(b)) => (a ^ b).count_ones() < opts.phash_threshold,
            _ => false,
        }
    }

    // =========================================================================
    // Upload state transitions
    // =========================================================================

    /// Snapshot of the current upload state.
    pub fn upload_state(&self) -> UploadState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// `NotStarted -> InProgress`. Returns false if the image already
    /// left `NotStarted` (another holder claimed it).
    pub fn mark_in_progress(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == UploadState::NotStarted {
            *state = UploadState::InProgress;
            true
        } else {
            false
        }
    }

    /// `InProgress -> Completed`. Terminal states are never overwritten.
    pub fn complete(&self, url: impl Into<String>, resource_id: Option<String>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if matches!(*state, UploadState::Completed { .. } | UploadState::Failed(_)) {
            return;
        }
        *state = UploadState::Completed {
            url: url.into(),
            resource_id,
        };
    }

    /// `InProgress -> Failed`. Terminal states are never overwritten.
    pub fn fail(&self, err: UploadError) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if matches!(*state, UploadState::Completed { .. } | UploadState::Failed(_)) {
            return;
        }
        *state = UploadState::Failed(err);
    }

    /// Reset the upload state to `NotStarted`.
    ///
    /// Used between successive Apply invocations in one process, because
    /// upload state is per-image and survives in the cache.
    pub fn reset_upload_state(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = UploadState::NotStarted;
    }

    /// Block until the upload reaches a terminal state and return the URL.
    ///
    /// Polls the state machine at `poll_interval` while the upload is
    /// `InProgress`. A `NotStarted` image with a public-web source URL
    /// returns that URL immediately; a `NotStarted` image without one was
    /// never scheduled and errors out. Cancellation interrupts the poll.
    pub async fn upload_info(
        &self,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, ApplyError> {
        loop {
            match self.upload_state() {
                UploadState::Completed { url, .. } => return Ok(url),
                UploadState::Failed(err) => return Err(ApplyError::Upload(err)),
                UploadState::NotStarted => {
                    if self.is_public_url() {
                        // Unwrap is safe: is_public_url implies a source URL.
                        return Ok(self.source_url.clone().unwrap_or_default());
                    }
                    return Err(ApplyError::Upload(UploadError::NotStarted));
                }
                UploadState::InProgress => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ApplyError::Cancelled),
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Default poll interval for [`Image::upload_info`].
    pub fn default_poll_interval() -> Duration {
        Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
    }
}

impl Clone for Image {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            mime: self.mime,
            source_url: self.source_url.clone(),
            from_markdown: self.from_markdown,
            from_code_block: self.from_code_block,
            external_link: self.external_link.clone(),
            mod_time: self.mod_time,
            checksum: self.checksum.clone(),
            phash: self.phash.clone(),
            state: RwLock::new(self.upload_state()),
        }
    }
}

/// Value equality on the image's data fields; upload state and lazy
/// digests are excluded. Use [`Image::equivalent`] for the reconciliation
/// relation.
impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
            && self.mime == other.mime
            && self.source_url == other.source_url
            && self.from_markdown == other.from_markdown
            && self.from_code_block == other.from_code_block
            && self.external_link == other.external_link
            && self.mod_time == other.mod_time
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .field("source_url", &self.source_url)
            .field("from_markdown", &self.from_markdown)
            .field("from_code_block", &self.from_code_block)
            .field("external_link", &self.external_link)
            .field("state", &self.upload_state())
            .finish()
    }
}

/// Compute the 8x8 average hash of a decoded image.
///
/// Grayscale, downsample to 8x8, threshold each pixel against the mean.
/// Hamming distance between two such hashes is robust to re-encoding.
fn average_hash(img: &image::DynamicImage) -> u64 {
    use image::imageops::FilterType;

    let small = img.to_luma8();
    let small = image::imageops::resize(&small, 8, 8, FilterType::Triangle);

    let total: u64 = small.pixels().map(|p| u64::from(p.0[0])).sum();
    let mean = total / 64;

    let mut hash = 0u64;
    for (i, pixel) in small.pixels().enumerate() {
        if u64::from(pixel.0[0]) > mean {
            hash |= 1 << i;
        }
    }
    hash
}

// =============================================================================
// Serde for shared images
// =============================================================================

/// Fixture (de)serialization for `Vec<Arc<Image>>` slide fields.
///
/// Only the value fields travel; bytes are base64. Upload state and lazy
/// digests are reconstructed fresh on load.
pub mod images_serde {
    use std::sync::Arc;

    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Image, Mime};

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ImageRepr {
        mime: Mime,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_url: Option<String>,
        #[serde(default)]
        from_markdown: bool,
        #[serde(default)]
        from_code_block: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        external_link: Option<String>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        bytes: String,
    }

    pub fn serialize<S: Serializer>(
        images: &[Arc<Image>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let reprs: Vec<ImageRepr> = images
            .iter()
            .map(|img| ImageRepr {
                mime: img.mime(),
                source_url: img.source_url().map(String::from),
                from_markdown: img.from_markdown(),
                from_code_block: img.from_code_block(),
                external_link: img.external_link().map(String::from),
                bytes: base64::engine::general_purpose::STANDARD.encode(img.bytes()),
            })
            .collect();
        reprs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Arc<Image>>, D::Error> {
        let reprs = Vec::<ImageRepr>::deserialize(deserializer)?;
        reprs
            .into_iter()
            .map(|repr| {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(repr.bytes.as_bytes())
                    .map_err(serde::de::Error::custom)?;
                let mut image = Image::new(bytes, repr.mime)
                    .with_from_markdown(repr.from_markdown)
                    .with_from_code_block(repr.from_code_block);
                if let Some(url) = repr.source_url {
                    image = image.with_source_url(url);
                }
                if let Some(link) = repr.external_link {
                    image = image.with_external_link(link);
                }
                Ok(Arc::new(image))
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
