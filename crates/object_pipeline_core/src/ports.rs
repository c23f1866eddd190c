use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::StageError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// A missing bucket or key is a [`StageError::Storage`].
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), StageError>;

    /// Lists and removes every object in `bucket`, returning how many were
    /// deleted. Keys the store refused to delete are reported as an error.
    async fn delete_all_objects(&self, bucket: &str) -> Result<usize, StageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub queue_url: String,
    pub body: String,
    pub group_id: String,
    pub attributes: BTreeMap<String, String>,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Returns the id the queue assigned to the message.
    async fn send(&self, message: OutboundMessage) -> Result<String, StageError>;
}
