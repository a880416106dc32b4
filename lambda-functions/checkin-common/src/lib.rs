pub mod budget;
pub mod config;
pub mod error;
pub mod face;
pub mod http;
pub mod image;
pub mod metrics;
pub mod model;
pub mod store;
pub mod telemetry;

pub use budget::ExecutionBudget;
pub use config::CheckinConfig;
pub use error::{CheckinError, CheckinResult};
pub use face::{FaceCollection, FaceMatch, IndexedFace, RekognitionFaceCollection};
pub use http::{error_response, json_response, parse_body, request_budget};
pub use metrics::{CheckinMetric, CloudWatchMetrics, MetricsSink, NoopMetrics};
pub use model::{PatientAttributes, PatientRecord};
pub use store::{DynamoPatientStore, PatientStore};

pub async fn load_aws_config(config: &CheckinConfig) -> aws_config::SdkConfig {
    let retry = aws_config::retry::RetryConfig::standard().with_max_attempts(config.max_attempts);
    let timeouts = aws_config::timeout::TimeoutConfig::builder()
        .operation_timeout(config.execution_timeout)
        .build();

    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .retry_config(retry)
        .timeout_config(timeouts)
        .load()
        .await
}
