use anyhow::Context as _;
use checkin_common::{telemetry, CheckinConfig};
use lambda_http::{run, service_fn, Error, Request};
use register_patient::RegistrationService;

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init_tracing();

    let config = CheckinConfig::from_env().context("loading check-in configuration")?;
    let service = RegistrationService::from_config(config).await;
    let service = &service;

    run(service_fn(move |request: Request| async move { service.handle(request).await })).await
}
