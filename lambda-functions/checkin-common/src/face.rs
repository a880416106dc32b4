use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::operation::index_faces::IndexFacesError;
use aws_sdk_rekognition::operation::search_faces_by_image::SearchFacesByImageError;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Attribute, Image, QualityFilter};
use aws_sdk_rekognition::Client as RekognitionClient;
use tracing::{debug, info};

use crate::error::{CheckinError, CheckinResult};

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedFace {
    pub face_id: String,
    // percent
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub face_id: String,
    pub similarity: f32,
    pub external_image_id: Option<String>,
}

/// The external face-recognition collection. Matching itself is opaque.
#[async_trait]
pub trait FaceCollection: Send + Sync {
    // Ok(None): no usable face in the image.
    async fn index_face(&self, image: &[u8], external_id: &str)
        -> CheckinResult<Option<IndexedFace>>;

    async fn search_face(&self, image: &[u8], threshold: f32) -> CheckinResult<Option<FaceMatch>>;

    async fn delete_face(&self, face_id: &str) -> CheckinResult<()>;
}

pub struct RekognitionFaceCollection {
    client: RekognitionClient,
    collection_id: String,
}

impl RekognitionFaceCollection {
    pub fn new(sdk_config: &aws_config::SdkConfig, collection_id: impl Into<String>) -> Self {
        Self {
            client: RekognitionClient::new(sdk_config),
            collection_id: collection_id.into(),
        }
    }

    fn image(bytes: &[u8]) -> Image {
        Image::builder().bytes(Blob::new(bytes.to_vec())).build()
    }
}

#[async_trait]
impl FaceCollection for RekognitionFaceCollection {
    async fn index_face(
        &self,
        image: &[u8],
        external_id: &str,
    ) -> CheckinResult<Option<IndexedFace>> {
        let result = self
            .client
            .index_faces()
            .collection_id(&self.collection_id)
            .image(Self::image(image))
            .external_image_id(external_id)
            .detection_attributes(Attribute::Default)
            .max_faces(1)
            .quality_filter(QualityFilter::Auto)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                return match err.into_service_error() {
                    IndexFacesError::InvalidImageFormatException(_)
                    | IndexFacesError::ImageTooLargeException(_) => {
                        Err(CheckinError::Validation(format!("Image rejected: {message}")))
                    }
                    IndexFacesError::InvalidParameterException(_) => {
                        debug!("Face service found no face to index: {}", message);
                        Ok(None)
                    }
                    _ => Err(CheckinError::FaceService(message)),
                };
            }
        };

        if !output.unindexed_faces().is_empty() {
            info!(
                "{} face(s) in the image were not indexed",
                output.unindexed_faces().len()
            );
        }

        let indexed = output
            .face_records()
            .first()
            .and_then(|record| record.face())
            .and_then(|face| {
                face.face_id().map(|face_id| IndexedFace {
                    face_id: face_id.to_string(),
                    confidence: face.confidence().unwrap_or(0.0),
                })
            });

        Ok(indexed)
    }

    async fn search_face(&self, image: &[u8], threshold: f32) -> CheckinResult<Option<FaceMatch>> {
        let result = self
            .client
            .search_faces_by_image()
            .collection_id(&self.collection_id)
            .image(Self::image(image))
            .face_match_threshold(threshold)
            .max_faces(1)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                return match err.into_service_error() {
                    SearchFacesByImageError::InvalidImageFormatException(_)
                    | SearchFacesByImageError::ImageTooLargeException(_) => {
                        Err(CheckinError::Validation(format!("Image rejected: {message}")))
                    }
                    SearchFacesByImageError::InvalidParameterException(_) => {
                        debug!("Face service found no face to search with: {}", message);
                        Ok(None)
                    }
                    _ => Err(CheckinError::FaceService(message)),
                };
            }
        };

        let best = output.face_matches().first().and_then(|candidate| {
            let face = candidate.face()?;
            Some(FaceMatch {
                face_id: face.face_id()?.to_string(),
                similarity: candidate.similarity().unwrap_or(0.0),
                external_image_id: face.external_image_id().map(str::to_string),
            })
        });

        Ok(best)
    }

    async fn delete_face(&self, face_id: &str) -> CheckinResult<()> {
        self.client
            .delete_faces()
            .collection_id(&self.collection_id)
            .face_ids(face_id)
            .send()
            .await
            .map_err(|e| CheckinError::FaceService(DisplayErrorContext(&e).to_string()))?;

        info!(face_id, "Deleted face from collection");
        Ok(())
    }
}
