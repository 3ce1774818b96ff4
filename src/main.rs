use anyhow::{anyhow, Context, Result};
use aws_lambda_events::event::sqs::SqsEvent;
use blob_event_bridge::app::{App, Clients};
use blob_event_bridge::conf::Settings;
use lambda_runtime::{run, service_fn, LambdaEvent};

/// Handle each queue-delivered notification body through the
/// screening and processing pipeline.
async fn function_handler(
    event: LambdaEvent<SqsEvent>,
    app: &App,
    clients: &Clients,
) -> Result<()> {
    for record in event.payload.records {
        if let Some(body) = record.body {
            app.handle(&body, clients)
                .await
                .with_context(|| format!("Failed to handle message {:?}", record.message_id))?;
        }
    }
    Ok(())
}

/// Run an AWS Lambda function that listens to queue messages carrying
/// blob-created notifications, screens them through the admission
/// filter, and processes the admitted blobs.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let app = App::new(Settings::from_env()?);
    let clients = Clients::build().await;
    let app = &app;
    let clients = &clients;

    run(service_fn(move |event| async move {
        function_handler(event, app, clients).await
    }))
    .await
    .map_err(|e| anyhow!("{:?}", e))
}
