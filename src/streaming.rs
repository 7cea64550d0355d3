//! Chunked streaming upload/download with progress reporting and
//! cancellation cleanup (§4.3.2). Grounded on the byte-oriented
//! `read_binary`/`write_binary` provider calls this crate's storage layer is
//! built on, generalized to a chunked `async-stream` form.

use crate::error::GridResult;
use crate::storage::StorageProvider;
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// The outcome of a streamed upload: the final byte count and hex-encoded
/// sha256, computed incrementally as chunks arrive.
pub struct StreamUploadResult {
    pub bytes: u64,
    pub sha256: String,
}

/// Consumes `chunks` and writes them to `key` via `storage`. Since
/// `object_store` 0.9 has no universal incremental-put surface across all
/// backends, chunks are buffered into one payload before the single
/// provider `put` — still only one copy held at a time, not N.
pub async fn stream_upload<S>(
    storage: &dyn StorageProvider,
    key: &str,
    mime: &str,
    mut chunks: S,
    content_length: Option<u64>,
    progress: Option<ProgressCallback>,
) -> GridResult<StreamUploadResult>
where
    S: Stream<Item = GridResult<Bytes>> + Unpin,
{
    use futures_util::StreamExt;

    let mut buffer = BytesMut::new();
    let mut hasher = Sha256::new();
    let mut sent: u64 = 0;

    let upload = async {
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            sent += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);
            if let Some(cb) = &progress {
                cb(sent, content_length);
            }
        }
        GridResult::Ok(())
    };

    if let Err(e) = upload.await {
        // Best-effort cleanup: nothing was committed to the provider yet
        // since this path buffers before a single put, so there is no
        // partial object to delete. Kept as an explicit branch so a future
        // true-incremental implementation has a cleanup call site ready.
        return Err(e);
    }

    storage.put(key, buffer.freeze(), mime).await?;

    Ok(StreamUploadResult {
        bytes: sent,
        sha256: hex::encode(hasher.finalize()),
    })
}

/// Downloads the object at `key` as a finite stream of chunks no larger than
/// `chunk_size`, reporting progress after each chunk.
pub fn stream_download(
    storage: Arc<dyn StorageProvider>,
    key: String,
    chunk_size: usize,
    progress: Option<ProgressCallback>,
) -> impl Stream<Item = GridResult<Bytes>> {
    async_stream::try_stream! {
        let data = storage.get(&key).await?;
        let total = data.len() as u64;
        let mut offset = 0usize;
        let mut sent = 0u64;
        while offset < data.len() {
            let end = (offset + chunk_size).min(data.len());
            let chunk = data.slice(offset..end);
            sent += chunk.len() as u64;
            if let Some(cb) = &progress {
                cb(sent, Some(total));
            }
            yield chunk;
            offset = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageProviderConfig;
    use crate::storage::build_storage_provider;
    use futures_util::{stream, StreamExt};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn stream_upload_then_download_roundtrips() {
        let storage = build_storage_provider(&StorageProviderConfig::Memory).unwrap();
        let chunks = stream::iter(vec![
            GridResult::Ok(Bytes::from_static(b"hello ")),
            GridResult::Ok(Bytes::from_static(b"world")),
        ]);
        let result = stream_upload(storage.as_ref(), "grid/sb/shared/a1", "text/plain", chunks, None, None)
            .await
            .unwrap();
        assert_eq!(result.bytes, 11);

        let downloaded: Vec<Bytes> = stream_download(storage.clone(), "grid/sb/shared/a1".to_string(), 4, None)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        let joined: Vec<u8> = downloaded.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(joined, b"hello world".to_vec());
    }

    #[tokio::test]
    async fn progress_callback_reports_final_total() {
        let storage = build_storage_provider(&StorageProviderConfig::Memory).unwrap();
        storage.put("grid/sb/shared/a1", Bytes::from_static(b"0123456789"), "text/plain").await.unwrap();

        let received = Arc::new(AtomicU64::new(0));
        let received_clone = received.clone();
        let cb: ProgressCallback = Arc::new(move |sent, _total| {
            received_clone.store(sent, Ordering::SeqCst);
        });

        let chunks: Vec<_> = stream_download(storage, "grid/sb/shared/a1".to_string(), 3, Some(cb))
            .collect::<Vec<_>>()
            .await;
        assert_eq!(chunks.len(), 4);
        assert_eq!(received.load(Ordering::SeqCst), 10);
    }
}
