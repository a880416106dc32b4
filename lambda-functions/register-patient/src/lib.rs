use bon::Builder;
use chrono::Utc;
use checkin_common::image::decode_image;
use checkin_common::{
    error_response, json_response, load_aws_config, parse_body, request_budget, CheckinConfig,
    CheckinError, CheckinMetric, CheckinResult, CloudWatchMetrics, DynamoPatientStore,
    ExecutionBudget, FaceCollection, MetricsSink, NoopMetrics, PatientAttributes, PatientRecord,
    PatientStore, RekognitionFaceCollection,
};
use lambda_http::{Body, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

pub const OPERATION: &str = "register";

pub const MAX_PATIENT_ID_LEN: usize = 255;

#[derive(Deserialize, Debug, Clone)]
pub struct Request {
    pub patient_id: String,
    pub image_base64: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Builder, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    #[builder(into)]
    pub patient_id: String,
    #[builder(into)]
    pub face_id: String,
    #[builder(into, default = "registered".to_string())]
    pub status: String,
    #[builder(into)]
    pub timestamp: String,
}

pub struct RegistrationService {
    config: CheckinConfig,
    faces: Box<dyn FaceCollection>,
    store: Box<dyn PatientStore>,
    metrics: Box<dyn MetricsSink>,
}

impl RegistrationService {
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

    // Request-level failures become error responses; Err is reserved for
    // responses that cannot be built at all.
    pub async fn handle(
        &self,
        request: lambda_http::Request,
    ) -> Result<lambda_http::Response<Body>, Error> {
        let budget = request_budget(&request, self.config.execution_timeout);

        let result = match parse_body::<Request>(&request) {
            Ok(request) => self.register(request, &budget).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                budget
                    .run_within("metrics", self.metrics.record(CheckinMetric::Registered))
                    .await;
                json_response(201, &response)
            }
            Err(err) => {
                err.report(OPERATION);
                let metric = CheckinMetric::Rejected {
                    operation: OPERATION,
                    kind: err.kind(),
                };
                budget.run_within("metrics", self.metrics.record(metric)).await;
                error_response(&err)
            }
        }
    }

    pub async fn register(
        &self,
        request: Request,
        budget: &ExecutionBudget,
    ) -> CheckinResult<Response> {
        let patient_id = request.patient_id.trim().to_string();
        validate_patient_id(&patient_id)?;
        let image = decode_image(&request.image_base64)?;
        let attributes = PatientAttributes::from_json(request.attributes)?;

        if self.store.get_patient(&patient_id).await?.is_some() {
            return Err(CheckinError::PatientExists(patient_id));
        }
        self.ensure_face_unclaimed(&image.bytes, &patient_id).await?;

        budget.ensure(self.config.min_remaining)?;
        let indexed = self
            .faces
            .index_face(&image.bytes, &patient_id)
            .await?
            .ok_or_else(|| {
                CheckinError::NoFaceDetected("No face detected or poor quality.".to_string())
            })?;

        if indexed.confidence < self.config.min_face_confidence {
            self.release_face(&indexed.face_id, budget).await;
            return Err(CheckinError::NoFaceDetected(format!(
                "Face detection confidence {:.1}% is below the required {:.1}%",
                indexed.confidence, self.config.min_face_confidence
            )));
        }

        let record = PatientRecord::new(patient_id, indexed.face_id.clone(), attributes);

        let stored = match budget.ensure(self.config.min_remaining) {
            Ok(()) => self.store.insert_patient(&record).await,
            Err(e) => Err(e),
        };
        if let Err(err) = stored {
            self.release_face(&indexed.face_id, budget).await;
            return Err(err);
        }

        info!(
            patient_id = %record.patient_id,
            face_id = %record.face_id,
            confidence = indexed.confidence,
            "Registered patient"
        );

        Ok(Response::builder()
            .patient_id(record.patient_id)
            .face_id(record.face_id)
            .timestamp(Utc::now().to_rfc3339())
            .build())
    }

    // Owner comes from the face index, or from the tagged patient while the
    // index lags. Faces owned by nobody are orphans and do not block.
    async fn ensure_face_unclaimed(&self, image: &[u8], patient_id: &str) -> CheckinResult<()> {
        let Some(existing) = self
            .faces
            .search_face(image, self.config.match_threshold)
            .await?
        else {
            return Ok(());
        };

        if let Some(owner) = self.store.find_by_face_id(&existing.face_id).await? {
            if owner.patient_id != patient_id {
                return Err(CheckinError::FaceAlreadyRegistered(owner.patient_id));
            }
            return Ok(());
        }

        if let Some(tagged) = existing.external_image_id.as_deref() {
            if tagged != patient_id && self.store.get_patient(tagged).await?.is_some() {
                return Err(CheckinError::FaceAlreadyRegistered(tagged.to_string()));
            }
        }

        warn!(
            face_id = %existing.face_id,
            similarity = existing.similarity,
            "Photo matches an orphaned face with no patient record"
        );
        Ok(())
    }

    async fn release_face(&self, face_id: &str, budget: &ExecutionBudget) {
        match budget
            .run_within("delete_face", self.faces.delete_face(face_id))
            .await
        {
            Some(Ok(())) => info!(face_id, "Removed face indexed by an incomplete registration"),
            Some(Err(e)) => error!(
                face_id,
                "Failed to remove face indexed by an incomplete registration, face is orphaned: {}",
                e
            ),
            None => error!(
                face_id,
                "No time left to remove face indexed by an incomplete registration, face is orphaned"
            ),
        }
    }
}

// Doubles as the face collection's external image id: [A-Za-z0-9_.\-:]{1,255}
pub fn validate_patient_id(patient_id: &str) -> CheckinResult<()> {
    if patient_id.is_empty() {
        return Err(CheckinError::Validation(
            "patient_id must not be empty".to_string(),
        ));
    }
    if patient_id.len() > MAX_PATIENT_ID_LEN {
        return Err(CheckinError::Validation(format!(
            "patient_id must be at most {MAX_PATIENT_ID_LEN} characters"
        )));
    }
    let valid = patient_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | ':'));
    if !valid {
        return Err(CheckinError::Validation(format!(
            "patient_id {patient_id:?} may only contain letters, digits, '_', '.', '-' and ':'"
        )));
    }
    Ok(())
}
