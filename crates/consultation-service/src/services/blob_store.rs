//! Blob store for chat uploads and generated artifacts.
//!
//! Objects are written under a caller-chosen key and addressed afterwards by
//! `<public_base_url>/<key>`.

use crate::errors::ConsultationError;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Instant;
use tracing::instrument;

/// Uploads an opaque byte stream and returns a stable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<String, ConsultationError>;
}

/// Join a base URL and an object key.
pub fn public_url(base_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// S3-backed blob store.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    /// Build a client from the ambient AWS environment (region, credentials,
    /// optional `AWS_ENDPOINT_URL`).
    pub async fn from_env(bucket: String, public_base_url: String) -> Self {
        let shared_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(Client::new(&shared_config), bucket, public_base_url)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip_all, name = "cs.blob.put", fields(key = %key, size = body.len()))]
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<String, ConsultationError> {
        let start = Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "cs.blob", error = %e, "Object upload failed");
                ConsultationError::Upstream(format!("blob upload failed: {e}"))
            })?;

        tracing::debug!(
            target: "cs.blob",
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Object uploaded"
        );
        Ok(public_url(&self.public_base_url, key))
    }
}

/// In-memory blob store for tests and the test harness.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Stored object.
    #[derive(Debug, Clone)]
    pub struct StoredObject {
        pub content_type: String,
        pub body: Bytes,
    }

    pub struct InMemoryBlobStore {
        public_base_url: String,
        objects: Mutex<HashMap<String, StoredObject>>,
        call_count: AtomicUsize,
        return_error: bool,
    }

    impl InMemoryBlobStore {
        /// Store that accepts every upload.
        pub fn accepting(public_base_url: &str) -> Self {
            Self {
                public_base_url: public_base_url.to_string(),
                objects: Mutex::new(HashMap::new()),
                call_count: AtomicUsize::new(0),
                return_error: false,
            }
        }

        /// Store whose uploads always fail with `Upstream`.
        pub fn failing() -> Self {
            Self {
                public_base_url: "https://blob.invalid".to_string(),
                objects: Mutex::new(HashMap::new()),
                call_count: AtomicUsize::new(0),
                return_error: true,
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub async fn get(&self, key: &str) -> Option<StoredObject> {
            self.objects.lock().await.get(key).cloned()
        }

        pub async fn keys(&self) -> Vec<String> {
            let mut keys: Vec<String> = self.objects.lock().await.keys().cloned().collect();
            keys.sort();
            keys
        }
    }

    #[async_trait]
    impl BlobStore for InMemoryBlobStore {
        async fn put(
            &self,
            key: &str,
            content_type: &str,
            body: Bytes,
        ) -> Result<String, ConsultationError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.return_error {
                return Err(ConsultationError::Upstream(
                    "blob upload failed: store unavailable".to_string(),
                ));
            }

            self.objects.lock().await.insert(
                key.to_string(),
                StoredObject {
                    content_type: content_type.to_string(),
                    body,
                },
            );
            Ok(public_url(&self.public_base_url, key))
        }
    }
}
