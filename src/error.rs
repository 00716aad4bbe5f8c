use thiserror::Error;

/// Planner invariant violations.
///
/// These indicate a programming error or corrupted input to the diff
/// planner. No remote mutation is ever attempted after a `PlanError`.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    /// The mapper requires equal-length sequences
    #[error("slide count mismatch: before has {before} slides, after has {after}")]
    LengthMismatch { before: usize, after: usize },

    /// The assignment is missing an index or is not a bijection
    #[error("mapping assertion failed: {0}")]
    MappingAssertion(String),

    /// A surrogate pair did not score as identical
    #[error("surrogate slide at index {index} is not identical to its assignment")]
    SurrogateNotIdentical { index: usize },

    /// A slide references a layout the presentation does not have
    #[error("layout not found: {0:?}")]
    MissingLayout(String),
}

/// Pre-fetch of an existing remote image failed.
///
/// Fatal to the Apply; background uploads are never started after one.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Downloading the image bytes failed
    #[error("failed to download image {url}: {reason}")]
    Download { url: String, reason: String },

    /// The remote element declared a MIME type we cannot handle
    #[error("unknown image MIME type: {0}")]
    UnknownMime(String),

    /// The image bytes could not be decoded
    #[error("failed to decode image {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Background upload of a new image failed.
///
/// Surfaced to the first action that needs the image's URL; actions
/// committed before that point stay committed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadError {
    /// The uploader collaborator rejected the blob
    #[error("upload failed for {filename}: {reason}")]
    Rejected { filename: String, reason: String },

    /// The uploader produced malformed output
    #[error("uploader returned malformed output: {0}")]
    MalformedOutput(String),

    /// The image has no bytes and no public URL to fall back to
    #[error("image has no uploadable content and no public URL")]
    NothingToUpload,

    /// Upload never started for this image
    #[error("upload was not started for this image")]
    NotStarted,

    /// The Apply was cancelled before this upload began
    #[error("upload cancelled")]
    Cancelled,
}

/// A batched mutation was rejected by the remote service.
///
/// The transport layer has already retried transient conditions, so a
/// `RemoteError` here is a semantic failure and fatal to the Apply.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The service rejected the batch
    #[error("batch of {count} requests rejected: {reason}")]
    BatchRejected { count: usize, reason: String },

    /// A referenced object does not exist on the remote
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The presentation snapshot could not be fetched
    #[error("failed to fetch presentation: {0}")]
    Snapshot(String),
}

/// Failures during deferred resource cleanup.
///
/// Logged and aggregated; never masks an earlier error.
#[derive(Debug, Clone, Error)]
#[error("cleanup failed for {failed} of {total} uploaded resources")]
pub struct CleanupError {
    pub failed: usize,
    pub total: usize,
}

/// Top-level error for a single Apply invocation.
#[derive(Debug, Clone, Error)]
pub enum ApplyError {
    /// Invalid plan input, nothing was sent to the remote
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    /// Pre-fetch failed, uploads were not started
    #[error("image pre-fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// An action depended on a failed upload
    #[error("image upload error: {0}")]
    Upload(#[from] UploadError),

    /// The remote rejected a batch; the caller retries the whole Apply
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The caller's cancellation token fired
    #[error("apply cancelled")]
    Cancelled,

    /// Deferred cleanup reported failures after an otherwise clean run
    #[error("cleanup error: {0}")]
    Cleanup(#[from] CleanupError),
}

impl ApplyError {
    /// Whether this error may have left the presentation partially mutated.
    ///
    /// Plan and pre-fetch errors fire before any remote call; everything
    /// else may have committed earlier actions.
    pub fn may_have_mutated(&self) -> bool {
        !matches!(self, ApplyError::Plan(_) | ApplyError::Fetch(_))
    }
}

// =============================================================================
// Tests
// =============================================================================
