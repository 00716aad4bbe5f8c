//! Configuration for the reconciliation engine.
//!
//! All tunables can be set via command-line flags or environment variables
//! with the `DECK_` prefix, with sensible defaults for every setting.
//!
//! # Environment Variables
//!
//! - `DECK_PREFETCH_WORKERS` - Parallel image pre-fetch workers (default: 4)
//! - `DECK_UPLOAD_WORKERS` - Parallel image upload workers (default: 4)
//! - `DECK_CLEANUP_WORKERS` - Parallel cleanup workers (default: 4)
//! - `DECK_BATCH_CAP` - Max mutation requests per remote batch (default: 1000)
//! - `DECK_POLL_INTERVAL_MS` - Upload-state poll interval (default: 10)
//! - `DECK_PHASH_THRESHOLD` - Perceptual-hash distance below which two
//!   images are considered equivalent (default: 5)
//! - `DECK_PHASH_ANY_MIME` - Apply the perceptual-hash rule to all MIME
//!   types instead of JPEG only (default: false)

use clap::Parser;

// =============================================================================
// Default Values
// =============================================================================

/// Default number of parallel image pre-fetch workers.
pub const DEFAULT_PREFETCH_WORKERS: usize = 4;

/// Default number of parallel image upload workers.
pub const DEFAULT_UPLOAD_WORKERS: usize = 4;

/// Default number of parallel cleanup workers.
pub const DEFAULT_CLEANUP_WORKERS: usize = 4;

/// Maximum mutation requests per batched remote call.
///
/// Empirically calibrated; the remote service publishes no hard limit.
pub const DEFAULT_BATCH_CAP: usize = 1000;

/// Upload-state poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Perceptual-hash distance below which two JPEGs count as the same image.
pub const DEFAULT_PHASH_THRESHOLD: u32 = 5;

// =============================================================================
// Config
// =============================================================================

/// Tunables for a single Apply invocation.
#[derive(Parser, Debug, Clone)]
#[command(name = "deck-sync")]
pub struct Config {
    /// Parallel workers for pre-fetching existing remote images.
    #[arg(long, default_value_t = DEFAULT_PREFETCH_WORKERS, env = "DECK_PREFETCH_WORKERS")]
    pub prefetch_workers: usize,

    /// Parallel workers for uploading new image blobs.
    #[arg(long, default_value_t = DEFAULT_UPLOAD_WORKERS, env = "DECK_UPLOAD_WORKERS")]
    pub upload_workers: usize,

    /// Parallel workers for deleting transient uploads on exit.
    #[arg(long, default_value_t = DEFAULT_CLEANUP_WORKERS, env = "DECK_CLEANUP_WORKERS")]
    pub cleanup_workers: usize,

    /// Maximum mutation requests per batched remote call.
    #[arg(long, default_value_t = DEFAULT_BATCH_CAP, env = "DECK_BATCH_CAP")]
    pub batch_cap: usize,

    /// Upload-state poll interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, env = "DECK_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Perceptual-hash distance threshold for image equivalence.
    #[arg(long, default_value_t = DEFAULT_PHASH_THRESHOLD, env = "DECK_PHASH_THRESHOLD")]
    pub phash_threshold: u32,

    /// Apply the perceptual-hash equivalence rule to every MIME type.
    ///
    /// By default only JPEG pairs are compared by perceptual hash; other
    /// formats must match by checksum.
    #[arg(long, default_value_t = false, env = "DECK_PHASH_ANY_MIME")]
    pub phash_any_mime: bool,

    /// Verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Config {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.prefetch_workers == 0 {
            return Err("prefetch_workers must be at least 1".to_string());
        }
        if self.upload_workers == 0 {
            return Err("upload_workers must be at least 1".to_string());
        }
        if self.cleanup_workers == 0 {
            return Err("cleanup_workers must be at least 1".to_string());
        }
        if self.batch_cap == 0 {
            return Err("batch_cap must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefetch_workers: DEFAULT_PREFETCH_WORKERS,
            upload_workers: DEFAULT_UPLOAD_WORKERS,
            cleanup_workers: DEFAULT_CLEANUP_WORKERS,
            batch_cap: DEFAULT_BATCH_CAP,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            phash_threshold: DEFAULT_PHASH_THRESHOLD,
            phash_any_mime: false,
            verbose: 0,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
