use lambda_runtime::{service_fn, Error, LambdaEvent};
use object_pipeline_core::contract::Stage;
use object_pipeline_core::triggers::HttpResponse;
use object_pipeline_lambda::handlers::handle_create;
use object_pipeline_lambda::runtime::PipelineRuntime;
use serde_json::Value;

async fn handle_request(
    runtime: &PipelineRuntime,
    event: LambdaEvent<Value>,
) -> Result<HttpResponse, Error> {
    let (payload, invocation) = event.into_parts();
    let ctx = runtime.stage_context(&invocation);
    let response = handle_create(&ctx, &runtime.store, &invocation, payload).await;
    runtime.flush();
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let runtime = PipelineRuntime::init(Stage::Create).await?;
    let shared = &runtime;

    let result =
        lambda_runtime::run(service_fn(move |event| async move { handle_request(shared, event).await }))
            .await;
    runtime.shutdown();
    result
}
