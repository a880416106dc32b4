use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum CheckinError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NoFaceDetected(String),

    #[error("No confident match")]
    NoMatch,

    #[error("Face {face_id} mapped but no patient record")]
    RecordNotFound { face_id: String },

    #[error("Patient {0} is already registered")]
    PatientExists(String),

    #[error("Face is already registered to patient {0}")]
    FaceAlreadyRegistered(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("face service error: {0}")]
    FaceService(String),

    #[error("insufficient execution time remaining ({remaining_ms} ms)")]
    BudgetExhausted { remaining_ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type CheckinResult<T> = Result<T, CheckinError>;

impl CheckinError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NoMatch | Self::RecordNotFound { .. } => 404,
            Self::PatientExists(_) | Self::FaceAlreadyRegistered(_) => 409,
            Self::NoFaceDetected(_) => 422,
            Self::BudgetExhausted { .. } => 503,
            Self::Storage(_) | Self::FaceService(_) | Self::Config(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NoFaceDetected(_) => "no_face_detected",
            Self::NoMatch => "no_match_found",
            Self::RecordNotFound { .. } => "record_not_found",
            Self::PatientExists(_) => "patient_exists",
            Self::FaceAlreadyRegistered(_) => "face_already_registered",
            Self::Storage(_) => "storage_error",
            Self::FaceService(_) => "face_service_error",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Config(_) => "configuration_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::FaceService(_) | Self::BudgetExhausted { .. }
        )
    }

    pub fn report(&self, operation: &str) {
        match self {
            Self::Storage(_) | Self::FaceService(_) | Self::Config(_) => {
                error!(operation, kind = self.kind(), "{}", self)
            }
            Self::RecordNotFound { face_id } => warn!(
                operation,
                face_id = %face_id,
                "Face collection and patient table have diverged: {}",
                self
            ),
            Self::BudgetExhausted { .. } => warn!(operation, kind = self.kind(), "{}", self),
            _ => info!(operation, kind = self.kind(), "{}", self),
        }
    }
}
