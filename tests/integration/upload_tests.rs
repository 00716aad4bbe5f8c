//! Upload lifecycle behavior observed through full Apply runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deck_sync::error::{ApplyError, UploadError};
use deck_sync::model::image::Mime;
use deck_sync::upload::Uploader;
use deck_sync::{Apply, Config, Image, Request};
use tokio_util::sync::CancellationToken;

use super::test_utils::{mock_pair, slide, titles};

/// Encode a JPEG with a caller-chosen pattern.
fn patterned_jpeg(f: impl Fn(u32, u32) -> u8) -> Vec<u8> {
    use image::codecs::jpeg::JpegEncoder;
    use image::{GrayImage, Luma};

    let img = GrayImage::from_fn(32, 32, |x, y| Luma([f(x, y)]));
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 85);
    encoder.encode_image(&img).unwrap();
    buf
}

#[tokio::test]
async fn test_executor_waits_for_slow_upload() {
    /// Uploader that takes its time before serving the mock CDN.
    struct SlowUploader {
        inner: Arc<super::test_utils::MockUploader>,
        delay: Duration,
    }

    #[async_trait]
    impl Uploader for SlowUploader {
        async fn upload(
            &self,
            bytes: Bytes,
            mime: Mime,
            filename: &str,
        ) -> Result<(String, String), UploadError> {
            tokio::time::sleep(self.delay).await;
            self.inner.upload(bytes, mime, filename).await
        }

        async fn delete(&self, resource_id: &str) -> Result<(), UploadError> {
            self.inner.delete(resource_id).await
        }
    }

    let (remote, uploader) = mock_pair();
    let slow = Arc::new(SlowUploader {
        inner: uploader.clone(),
        delay: Duration::from_millis(80),
    });
    let apply = Apply::new(remote.clone(), slow, Config::default());

    let mut s = slide("Slow pic");
    s.images.push(Arc::new(Image::new(
        patterned_jpeg(|x, y| ((x + y) * 4 % 256) as u8),
        Mime::Jpeg,
    )));
    apply.run(&[s], &CancellationToken::new()).await.unwrap();

    // The executor polled through InProgress and finished the slide.
    assert_eq!(uploader.upload_count(), 1);
    assert_eq!(remote.converted_slides()[0].images.len(), 1);
    assert_eq!(uploader.deleted_count(), 1);
}

#[tokio::test]
async fn test_distinct_jpegs_both_uploaded() {
    let (remote, uploader) = mock_pair();
    let apply = Apply::new(remote.clone(), uploader.clone(), Config::default());

    // A gradient and a checkerboard: hash distance is far above the
    // threshold, so these are genuinely different pictures.
    let gradient = patterned_jpeg(|x, _| (x * 8 % 256) as u8);
    let checker = patterned_jpeg(|x, y| if (x / 4 + y / 4) % 2 == 0 { 0 } else { 255 });

    let mut s = slide("Two pics");
    s.images.push(Arc::new(Image::new(gradient, Mime::Jpeg)));
    s.images.push(Arc::new(Image::new(checker, Mime::Jpeg)));
    apply.run(&[s], &CancellationToken::new()).await.unwrap();

    assert_eq!(uploader.upload_count(), 2);
    assert_eq!(remote.converted_slides()[0].images.len(), 2);
    assert_eq!(uploader.deleted_count(), 2);
}

#[tokio::test]
async fn test_public_url_resources_never_cleaned() {
    let (remote, uploader) = mock_pair();
    let apply = Apply::new(remote.clone(), uploader.clone(), Config::default());

    let mut s = slide("Linked");
    s.images.push(Arc::new(Image::from_public_url(
        "https://example.com/banner.png",
        Mime::Png,
    )));
    apply.run(&[s], &CancellationToken::new()).await.unwrap();

    assert_eq!(uploader.upload_count(), 0);
    assert_eq!(uploader.deleted_count(), 0);
}

#[tokio::test]
async fn test_upload_failure_keeps_committed_prefix() {
    /// Uploader that rejects everything.
    struct RejectingUploader;

    #[async_trait]
    impl Uploader for RejectingUploader {
        async fn upload(
            &self,
            _bytes: Bytes,
            _mime: Mime,
            filename: &str,
        ) -> Result<(String, String), UploadError> {
            Err(UploadError::Rejected {
                filename: filename.to_string(),
                reason: "quota exceeded".to_string(),
            })
        }

        async fn delete(&self, _resource_id: &str) -> Result<(), UploadError> {
            Ok(())
        }
    }

    let (remote, _uploader) = mock_pair();
    remote.seed_title_pages(&["Keep"]);
    let apply = Apply::new(remote.clone(), Arc::new(RejectingUploader), Config::default());

    // One clean append, then one that needs the doomed upload.
    let mut broken = slide("Broken");
    broken.images.push(Arc::new(Image::new(
        patterned_jpeg(|x, y| ((x * y) % 256) as u8),
        Mime::Jpeg,
    )));
    let after = vec![slide("Keep"), slide("Clean"), broken];

    let result = apply.run(&after, &CancellationToken::new()).await;
    assert!(matches!(result, Err(ApplyError::Upload(_))));

    // The pre-created pages survive: earlier committed work stays
    // committed, the caller retries the whole Apply.
    let converted = remote.converted_slides();
    assert_eq!(converted.len(), 3);
    assert_eq!(titles(&converted)[0], "Keep");
}

#[tokio::test]
async fn test_upload_counter_tracks_resource_ids() {
    let (remote, uploader) = mock_pair();
    let apply = Apply::new(remote.clone(), uploader.clone(), Config::default());

    let mut s = slide("Pic");
    s.images.push(Arc::new(Image::new(
        patterned_jpeg(|x, y| ((x ^ y) * 9 % 256) as u8),
        Mime::Jpeg,
    )));
    apply.run(&[s], &CancellationToken::new()).await.unwrap();

    // The created element references the CDN URL the uploader returned.
    let flat: Vec<Request> = remote.batches().into_iter().flatten().collect();
    let created_url = flat
        .iter()
        .find_map(|r| match r {
            Request::CreateImage { url, .. } => Some(url.clone()),
            _ => None,
        })
        .expect("no CreateImage in batches");
    assert!(created_url.starts_with("https://cdn.mock/"));
    assert!(created_url.contains("deck-sync-"));
}
