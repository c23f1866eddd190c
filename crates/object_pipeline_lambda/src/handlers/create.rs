use lambda_runtime::Context;
use object_pipeline_core::ports::BlobStore;
use object_pipeline_core::stages::{CreateStage, StageContext};
use object_pipeline_core::triggers::HttpResponse;
use serde_json::Value;

use crate::runtime::with_deadline;

/// Always answers the caller; a deadline overrun becomes the opaque 500.
pub async fn handle_create<S: BlobStore>(
    ctx: &StageContext<'_>,
    store: &S,
    invocation: &Context,
    payload: Value,
) -> HttpResponse {
    let stage = CreateStage::new(ctx, store);
    match with_deadline(invocation, stage.handle_event(payload)).await {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(stage = "create", error = %error, "invocation timed out");
            HttpResponse::failed()
        }
    }
}
