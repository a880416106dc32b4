use anyhow::Context as _;
use checkin_common::{telemetry, CheckinConfig};
use identify_patient::IdentificationService;
use lambda_http::{run, service_fn, Error, Request};

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init_tracing();

    let config = CheckinConfig::from_env().context("loading check-in configuration")?;
    let service = IdentificationService::from_config(config).await;
    let service = &service;

    run(service_fn(move |request: Request| async move { service.handle(request).await })).await
}
