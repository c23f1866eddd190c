use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageAttributeValue;
use object_pipeline_core::error::StageError;
use object_pipeline_core::ports::{MessageQueue, OutboundMessage};

#[derive(Clone)]
pub struct SqsMessageQueue {
    client: aws_sdk_sqs::Client,
}

impl SqsMessageQueue {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageQueue for SqsMessageQueue {
    async fn send(&self, message: OutboundMessage) -> Result<String, StageError> {
        let attributes = message
            .attributes
            .into_iter()
            .map(|(name, value)| {
                MessageAttributeValue::builder()
                    .data_type("String")
                    .string_value(value)
                    .build()
                    .map(|attribute| (name, attribute))
            })
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|error| StageError::queue(format!("invalid message attribute: {error}")))?;

        let output = self
            .client
            .send_message()
            .queue_url(&message.queue_url)
            .message_body(message.body)
            .message_group_id(message.group_id)
            .set_message_attributes((!attributes.is_empty()).then_some(attributes))
            .send()
            .await
            .map_err(|error| {
                StageError::queue(format!(
                    "failed to send message to {}: {}",
                    message.queue_url,
                    DisplayErrorContext(&error)
                ))
            })?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }
}
