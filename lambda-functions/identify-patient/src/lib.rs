use bon::Builder;
use checkin_common::image::decode_image;
use checkin_common::{
    error_response, json_response, load_aws_config, parse_body, request_budget, CheckinConfig,
    CheckinError, CheckinMetric, CheckinResult, CloudWatchMetrics, DynamoPatientStore,
    ExecutionBudget, FaceCollection, MetricsSink, NoopMetrics, PatientAttributes, PatientStore,
    RekognitionFaceCollection,
};
use lambda_http::{Body, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const OPERATION: &str = "identify";

#[derive(Deserialize, Debug, Clone)]
pub struct Request {
    pub image_base64: String,
}

// Stored attributes (name, dob, appointment_id, ...) sit at the top level.
#[derive(Builder, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    #[builder(into)]
    pub patient_id: String,
    #[builder(into)]
    pub face_id: String,
    pub similarity: f32,
    #[serde(flatten)]
    #[builder(default)]
    pub attributes: PatientAttributes,
}

pub struct IdentificationService {
    config: CheckinConfig,
    faces: Box<dyn FaceCollection>,
    store: Box<dyn PatientStore>,
    metrics: Box<dyn MetricsSink>,
}

impl IdentificationService {
    pub fn new(
        config: CheckinConfig,
        faces: Box<dyn FaceCollection>,
        store: Box<dyn PatientStore>,
        metrics: Box<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            faces,
            store,
            metrics,
        }
    }

    pub async fn from_config(config: CheckinConfig) -> Self {
        let sdk_config = load_aws_config(&config).await;

        let metrics: Box<dyn MetricsSink> = if config.metrics_enabled {
            Box::new(CloudWatchMetrics::new(&sdk_config, &config.metrics_namespace))
        } else {
            Box::new(NoopMetrics)
        };

        Self::new(
            config.clone(),
            Box::new(RekognitionFaceCollection::new(
                &sdk_config,
                &config.collection_id,
            )),
            Box::new(DynamoPatientStore::new(
                &sdk_config,
                &config.table_name,
                &config.face_id_index,
            )),
            metrics,
        )
    }

    pub async fn handle(
        &self,
        request: lambda_http::Request,
    ) -> Result<lambda_http::Response<Body>, Error> {
        let budget = request_budget(&request, self.config.execution_timeout);

        let result = match parse_body::<Request>(&request) {
            Ok(request) => self.identify(request, &budget).await,
            Err(e) => Err(e),
        };

        let (metric, response) = match result {
            Ok(response) => (
                CheckinMetric::Identified {
                    similarity: response.similarity,
                },
                json_response(200, &response),
            ),
            Err(err) => {
                err.report(OPERATION);
                (
                    CheckinMetric::Rejected {
                        operation: OPERATION,
                        kind: err.kind(),
                    },
                    error_response(&err),
                )
            }
        };

        budget.run_within("metrics", self.metrics.record(metric)).await;
        response
    }

    pub async fn identify(
        &self,
        request: Request,
        budget: &ExecutionBudget,
    ) -> CheckinResult<Response> {
        let image = decode_image(&request.image_base64)?;
        let threshold = self.config.match_threshold;

        let best = self
            .faces
            .search_face(&image.bytes, threshold)
            .await?
            .ok_or(CheckinError::NoMatch)?;

        // The collection filters by threshold already; never hand back a
        // weaker match if it ever returns one.
        if best.similarity < threshold {
            debug!(
                face_id = %best.face_id,
                similarity = best.similarity,
                threshold,
                "Discarding match below threshold"
            );
            return Err(CheckinError::NoMatch);
        }

        budget.ensure(self.config.min_remaining)?;
        let record = self
            .store
            .find_by_face_id(&best.face_id)
            .await?
            .ok_or_else(|| CheckinError::RecordNotFound {
                face_id: best.face_id.clone(),
            })?;

        info!(
            patient_id = %record.patient_id,
            face_id = %record.face_id,
            similarity = best.similarity,
            appointment_id = record.attributes.appointment_id().unwrap_or("-"),
            "Identified patient"
        );

        Ok(Response::builder()
            .patient_id(record.patient_id)
            .face_id(record.face_id)
            .similarity(best.similarity)
            .attributes(record.attributes)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let request: Request = serde_json::from_str(r#"{"image_base64": "aGVsbG8="}"#).unwrap();
        assert_eq!(request.image_base64, "aGVsbG8=");
    }

    #[test]
    fn test_request_requires_image() {
        assert!(serde_json::from_str::<Request>("{}").is_err());
    }

    #[test]
    fn test_response_flattens_attributes() {
        let response = Response::builder()
            .patient_id("P-TEST-001")
            .face_id("test-face-id-12345")
            .similarity(97.5)
            .attributes(
                [
                    ("name", "Test Patient"),
                    ("dob", "1990-01-01"),
                    ("phone", "+1234567890"),
                ]
                .into_iter()
                .collect(),
            )
            .build();

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["patient_id"], "P-TEST-001");
        assert_eq!(json["face_id"], "test-face-id-12345");
        assert_eq!(json["similarity"], 97.5);
        assert_eq!(json["name"], "Test Patient");
        assert_eq!(json["phone"], "+1234567890");
    }
}
