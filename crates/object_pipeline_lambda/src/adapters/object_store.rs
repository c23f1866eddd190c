use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use object_pipeline_core::error::StageError;
use object_pipeline_core::ports::{BlobStore, StoredObject};

/// S3-backed [`BlobStore`]. The client is cheap to clone and pools
/// connections across invocations.
#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|error| {
                StageError::storage(format!(
                    "failed to read s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&error)
                ))
            })?;

        let metadata: BTreeMap<String, String> = output
            .metadata()
            .map(|values| {
                values
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let body = output.body.collect().await.map_err(|error| {
            StageError::storage(format!("failed to read body of s3://{bucket}/{key}: {error}"))
        })?;

        Ok(StoredObject {
            body: body.into_bytes().to_vec(),
            metadata,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), StageError> {
        let metadata: HashMap<String, String> = metadata.into_iter().collect();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/json")
            .set_metadata((!metadata.is_empty()).then_some(metadata))
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                StageError::storage(format!(
                    "failed to write s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&error)
                ))
            })
    }

    /// Deletes page by page; each listing page holds at most the 1000 keys a
    /// single `DeleteObjects` call accepts.
    async fn delete_all_objects(&self, bucket: &str) -> Result<usize, StageError> {
        let mut deleted = 0;
        let mut failed_keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|error| {
                    StageError::storage(format!(
                        "failed to list s3://{bucket}: {}",
                        DisplayErrorContext(&error)
                    ))
                })?;

            let identifiers = page
                .contents()
                .iter()
                .filter_map(|object| object.key())
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|error| StageError::storage(format!("invalid object key: {error}")))?;

            if !identifiers.is_empty() {
                let requested = identifiers.len();
                let delete = Delete::builder()
                    .set_objects(Some(identifiers))
                    .quiet(true)
                    .build()
                    .map_err(|error| {
                        StageError::storage(format!("invalid delete request: {error}"))
                    })?;
                let output = self
                    .client
                    .delete_objects()
                    .bucket(bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|error| {
                        StageError::storage(format!(
                            "failed to delete objects in s3://{bucket}: {}",
                            DisplayErrorContext(&error)
                        ))
                    })?;

                let errors = output.errors();
                deleted += requested - errors.len();
                failed_keys.extend(errors.iter().map(|error| {
                    format!(
                        "{} ({})",
                        error.key().unwrap_or("<unknown>"),
                        error.message().unwrap_or("no message")
                    )
                }));
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        if failed_keys.is_empty() {
            Ok(deleted)
        } else {
            Err(StageError::storage(format!(
                "failed to delete {} object(s) from s3://{bucket}: {}",
                failed_keys.len(),
                failed_keys.join(", ")
            )))
        }
    }
}
