//! Object Store: chunked blob storage layered on JetStream, conforming to
//! ADR-20.

use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE_NO_PAD as BASE64_URL};
use base64::Engine;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::{NatsError, NatsResult};
use crate::headers::NatsHeaders;
use crate::jetstream::{
    Context, DirectGetRequest, DiscardPolicy, JetStreamError, RetentionPolicy, StorageType, StreamConfig,
    StreamPurgeRequest,
};
use crate::objectstore::error::ObjectStoreError;
use crate::objectstore::nuid::NuidGenerator;
use crate::objectstore::object::{ObjectMetadata, ObjectOptions};

fn validate_bucket_name(bucket: &str) -> NatsResult<()> {
    let valid = !bucket.is_empty()
        && !bucket.starts_with('.')
        && !bucket.ends_with('.')
        && bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ObjectStoreError::InvalidBucketName(bucket.to_string()).into())
    }
}

fn stream_name(bucket: &str) -> String {
    format!("OBJ_{bucket}")
}

fn chunk_subject(bucket: &str, nuid: &str) -> String {
    format!("$O.{bucket}.C.{nuid}")
}

fn metadata_subject(bucket: &str, name: &str) -> String {
    format!("$O.{bucket}.M.{}", BASE64_URL.encode(name))
}

/// Configuration accepted by [`ObjectStore::create`]; only `bucket` is
/// required, the rest mirror the backing stream's optional knobs.
#[derive(Debug, Clone, Default)]
pub struct BucketConfig {
    pub bucket: String,
    pub description: Option<String>,
    pub max_bytes: u64,
    pub max_age: u64,
    pub storage: Option<StorageType>,
    pub num_replicas: Option<u8>,
    pub compression: Option<String>,
}

impl BucketConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        BucketConfig {
            bucket: bucket.into(),
            ..Default::default()
        }
    }
}

/// A handle to one bucket's backing stream.
pub struct ObjectStore {
    js: Context,
    bucket: String,
    nuid: NuidGenerator,
}

impl ObjectStore {
    /// Creates the backing stream for a new bucket.
    pub async fn create(js: Context, config: BucketConfig, cancel: &CancellationToken) -> NatsResult<Self> {
        validate_bucket_name(&config.bucket)?;
        let mut builder = StreamConfig::builder();
        builder
            .name(stream_name(&config.bucket))
            .subjects(vec![
                format!("$O.{}.C.>", config.bucket),
                format!("$O.{}.M.>", config.bucket),
            ])
            .retention(RetentionPolicy::Limits)
            .discard(DiscardPolicy::New)
            .allow_rollup_hdrs(true)
            .allow_direct(true)
            .max_msgs_per_subject(1i64)
            .max_bytes(config.max_bytes)
            .max_age(config.max_age)
            .storage(config.storage.unwrap_or(StorageType::File))
            .num_replicas(config.num_replicas.unwrap_or(1));
        if let Some(compression) = &config.compression {
            builder.compression(compression.clone());
        }
        let stream_config = builder.build().expect("all required fields are set above");

        js.stream_create(stream_config, cancel).await?;
        Ok(ObjectStore {
            js,
            bucket: config.bucket,
            nuid: NuidGenerator::new(),
        })
    }

    /// Opens a handle to an existing bucket; not-found surfaces as
    /// [`ObjectStoreError::BucketNotFound`].
    pub async fn get(js: Context, bucket: impl Into<String>, cancel: &CancellationToken) -> NatsResult<Self> {
        let bucket = bucket.into();
        validate_bucket_name(&bucket)?;
        match js.stream_info(&stream_name(&bucket), cancel).await {
            Ok(_) => Ok(ObjectStore {
                js,
                bucket,
                nuid: NuidGenerator::new(),
            }),
            Err(NatsError::JetStream(JetStreamError::StreamNotFound { .. })) => {
                Err(ObjectStoreError::BucketNotFound(bucket).into())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_or_create(js: Context, config: BucketConfig, cancel: &CancellationToken) -> NatsResult<Self> {
        let bucket = config.bucket.clone();
        match Self::get(js.clone(), bucket.clone(), cancel).await {
            Ok(store) => Ok(store),
            Err(NatsError::ObjectStore(ObjectStoreError::BucketNotFound(_))) => {
                Self::create(js, config, cancel).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn delete_bucket(js: &Context, bucket: &str, cancel: &CancellationToken) -> NatsResult<()> {
        js.stream_delete(&stream_name(bucket), cancel).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Reads `source` in `chunk_size`-sized chunks (default 128 KiB),
    /// publishing each as it goes, then publishes a rollup metadata record.
    /// Best-effort purges orphan chunks if any step after the first chunk
    /// fails.
    pub async fn put(
        &self,
        name: &str,
        source: &[u8],
        opts: PutOptions,
        cancel: &CancellationToken,
    ) -> NatsResult<ObjectMetadata> {
        let nuid = self.nuid.next();
        let chunk_size = opts.max_chunk_size.unwrap_or(crate::objectstore::object::DEFAULT_CHUNK_SIZE);
        let chunk_subj = chunk_subject(&self.bucket, &nuid);

        let mut hasher = Sha256::new();
        let mut chunk_count: u64 = 0;
        let mut published_any = false;

        for chunk in source.chunks(chunk_size.max(1)) {
            if chunk.is_empty() {
                continue;
            }
            hasher.update(chunk);
            if let Err(e) = self
                .js
                .publish(&chunk_subj, Bytes::copy_from_slice(chunk), None, cancel)
                .await
            {
                if published_any {
                    self.purge_chunks(&nuid, cancel).await;
                }
                return Err(e);
            }
            published_any = true;
            chunk_count += 1;
        }

        let digest = format!("SHA-256={}", BASE64_STANDARD.encode(hasher.finalize()));
        let metadata = ObjectMetadata {
            name: name.to_string(),
            bucket: self.bucket.clone(),
            nuid,
            size: source.len() as u64,
            chunks: chunk_count,
            digest: Some(digest),
            description: opts.description,
            deleted: false,
            headers: opts.headers,
            metadata: opts.metadata,
            options: Some(ObjectOptions {
                max_chunk_size: Some(chunk_size),
            }),
        };

        if let Err(e) = self.publish_metadata(&metadata, cancel).await {
            if published_any {
                self.purge_chunks(&metadata.nuid, cancel).await;
            }
            return Err(e);
        }

        Ok(metadata)
    }

    async fn publish_metadata(&self, metadata: &ObjectMetadata, cancel: &CancellationToken) -> NatsResult<()> {
        let subject = metadata_subject(&self.bucket, &metadata.name);
        let payload = Bytes::from(serde_json::to_vec(metadata)?);
        self.js.publish_with_rollup(&subject, payload, cancel).await?;
        Ok(())
    }

    async fn purge_chunks(&self, nuid: &str, cancel: &CancellationToken) {
        let _ = self
            .js
            .stream_purge(
                &stream_name(&self.bucket),
                StreamPurgeRequest {
                    filter: Some(chunk_subject(&self.bucket, nuid)),
                    ..Default::default()
                },
                cancel,
            )
            .await;
    }

    /// Fetches the latest metadata for `name`, or object-not-found if
    /// absent or soft-deleted.
    pub async fn get_info(&self, name: &str, cancel: &CancellationToken) -> NatsResult<ObjectMetadata> {
        let subject = metadata_subject(&self.bucket, name);
        let reply = self
            .js
            .direct_get(
                &stream_name(&self.bucket),
                DirectGetRequest::last_by_subject(subject),
                cancel,
            )
            .await?;

        let message = reply.ok_or_else(|| ObjectStoreError::ObjectNotFound(name.to_string()))?;
        let metadata: ObjectMetadata = serde_json::from_slice(&message.payload)?;
        if metadata.deleted {
            return Err(ObjectStoreError::ObjectNotFound(name.to_string()).into());
        }
        Ok(metadata)
    }

    pub async fn exists(&self, name: &str, cancel: &CancellationToken) -> bool {
        matches!(self.get_info(name, cancel).await, Ok(meta) if !meta.deleted)
    }

    /// Fetches an object's full contents, verifying its digest.
    pub async fn get(&self, name: &str, cancel: &CancellationToken) -> NatsResult<Bytes> {
        let metadata = self.get_info(name, cancel).await?;
        if metadata.chunks == 0 {
            return Ok(Bytes::new());
        }

        let chunk_subj = chunk_subject(&self.bucket, &metadata.nuid);
        let mut out = Vec::with_capacity(metadata.size as usize);
        let mut hasher = Sha256::new();
        let mut cursor: u64 = 0;

        for _ in 0..metadata.chunks {
            let reply = self
                .js
                .direct_get(
                    &stream_name(&self.bucket),
                    DirectGetRequest::next_by_subject(chunk_subj.as_str(), cursor),
                    cancel,
                )
                .await?;
            let message = reply.ok_or_else(|| ObjectStoreError::MissingChunk {
                name: name.to_string(),
                expected: cursor + 1,
            })?;
            let sequence: u64 = message
                .headers
                .as_ref()
                .and_then(|h| h.get("Nats-Sequence"))
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| ObjectStoreError::MissingChunk {
                    name: name.to_string(),
                    expected: cursor + 1,
                })?;
            cursor = sequence + 1;

            hasher.update(&message.payload);
            out.extend_from_slice(&message.payload);
        }

        if let Some(expected) = &metadata.digest {
            let actual = format!("SHA-256={}", BASE64_STANDARD.encode(hasher.finalize()));
            if &actual != expected {
                return Err(ObjectStoreError::DigestMismatch {
                    name: name.to_string(),
                    expected: expected.clone(),
                    actual,
                }
                .into());
            }
        }

        Ok(Bytes::from(out))
    }

    /// Soft-deletes `name`: rewrites metadata with `deleted=true`, then
    /// best-effort purges the backing chunks.
    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> NatsResult<()> {
        let existing = match self.get_info(name, cancel).await {
            Ok(meta) => meta,
            Err(NatsError::ObjectStore(ObjectStoreError::ObjectNotFound(_))) => return Ok(()),
            Err(e) => return Err(e),
        };

        let tombstone = ObjectMetadata {
            size: 0,
            chunks: 0,
            digest: None,
            deleted: true,
            ..existing.clone()
        };
        self.publish_metadata(&tombstone, cancel).await?;
        self.purge_chunks(&existing.nuid, cancel).await;
        Ok(())
    }

    /// Lists current objects. Not paginated; concurrent modification during
    /// listing may yield a consistent-but-stale view.
    pub async fn list(&self, include_deleted: bool, cancel: &CancellationToken) -> NatsResult<Vec<ObjectMetadata>> {
        let filter = format!("$O.{}.M.>", self.bucket);
        let info = self
            .js
            .stream_info_with_subjects(&stream_name(&self.bucket), Some(&filter), cancel)
            .await?;

        let mut objects = Vec::with_capacity(info.state.subjects.len());
        for subject in info.state.subjects.keys() {
            let reply = self
                .js
                .direct_get(
                    &stream_name(&self.bucket),
                    DirectGetRequest::last_by_subject(subject.as_str()),
                    cancel,
                )
                .await?;
            let Some(message) = reply else { continue };
            let metadata: ObjectMetadata = serde_json::from_slice(&message.payload)?;
            if include_deleted || !metadata.deleted {
                objects.push(metadata);
            }
        }
        Ok(objects)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub max_chunk_size: Option<usize>,
    pub description: Option<String>,
    pub headers: Option<NatsHeaders>,
    pub metadata: std::collections::HashMap<String, String>,
}
