use async_trait::async_trait;
use aws_sdk_cloudwatch::{
    types::{MetricDatum, StandardUnit},
    Client as CloudWatchClient,
};
use tracing::{debug, error};

/// Outcomes worth counting. Publishing is best effort.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckinMetric {
    Registered,
    Identified { similarity: f32 },
    Rejected {
        operation: &'static str,
        kind: &'static str,
    },
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, metric: CheckinMetric);
}

pub struct NoopMetrics;

#[async_trait]
impl MetricsSink for NoopMetrics {
    async fn record(&self, metric: CheckinMetric) {
        debug!("Metrics disabled, dropping {:?}", metric);
    }
}

pub struct CloudWatchMetrics {
    client: CloudWatchClient,
    namespace: String,
}

impl CloudWatchMetrics {
    pub fn new(sdk_config: &aws_config::SdkConfig, namespace: impl Into<String>) -> Self {
        Self {
            client: CloudWatchClient::new(sdk_config),
            namespace: namespace.into(),
        }
    }

    fn datum(metric: &CheckinMetric) -> MetricDatum {
        let timestamp = aws_sdk_cloudwatch::primitives::DateTime::from(std::time::SystemTime::now());

        let builder = match metric {
            CheckinMetric::Registered => MetricDatum::builder()
                .metric_name("PatientRegistered")
                .value(1.0)
                .unit(StandardUnit::Count),
            CheckinMetric::Identified { similarity } => MetricDatum::builder()
                .metric_name("IdentificationSimilarity")
                .value(f64::from(*similarity))
                .unit(StandardUnit::Percent),
            CheckinMetric::Rejected { operation, kind } => MetricDatum::builder()
                .metric_name(format!("{operation}.{kind}"))
                .value(1.0)
                .unit(StandardUnit::Count),
        };

        builder.timestamp(timestamp).build()
    }
}

#[async_trait]
impl MetricsSink for CloudWatchMetrics {
    async fn record(&self, metric: CheckinMetric) {
        let result = self
            .client
            .put_metric_data()
            .namespace(&self.namespace)
            .metric_data(Self::datum(&metric))
            .send()
            .await;

        if let Err(e) = result {
            error!("Failed to publish metric {:?}: {}", metric, e);
        }
    }
}
