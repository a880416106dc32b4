use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde_dynamo::{from_item, to_item};
use tracing::info;

use crate::error::{CheckinError, CheckinResult};
use crate::model::PatientRecord;

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn get_patient(&self, patient_id: &str) -> CheckinResult<Option<PatientRecord>>;

    // Eventually consistent.
    async fn find_by_face_id(&self, face_id: &str) -> CheckinResult<Option<PatientRecord>>;

    async fn insert_patient(&self, record: &PatientRecord) -> CheckinResult<()>;
}

pub struct DynamoPatientStore {
    client: DynamoClient,
    table_name: String,
    face_id_index: String,
}

impl DynamoPatientStore {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        table_name: impl Into<String>,
        face_id_index: impl Into<String>,
    ) -> Self {
        Self {
            client: DynamoClient::new(sdk_config),
            table_name: table_name.into(),
            face_id_index: face_id_index.into(),
        }
    }

    fn decode(item: HashMap<String, AttributeValue>) -> CheckinResult<PatientRecord> {
        from_item(item).map_err(|e| CheckinError::Storage(format!("Malformed patient record: {e}")))
    }
}

#[async_trait]
impl PatientStore for DynamoPatientStore {
    async fn get_patient(&self, patient_id: &str) -> CheckinResult<Option<PatientRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("patient_id", AttributeValue::S(patient_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| CheckinError::Storage(DisplayErrorContext(&e).to_string()))?;

        output.item.map(Self::decode).transpose()
    }

    async fn find_by_face_id(&self, face_id: &str) -> CheckinResult<Option<PatientRecord>> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(&self.face_id_index)
            .key_condition_expression("face_id = :f")
            .expression_attribute_values(":f", AttributeValue::S(face_id.to_string()))
            .limit(1)
            .send()
            .await
            .map_err(|e| CheckinError::Storage(DisplayErrorContext(&e).to_string()))?;

        output
            .items
            .and_then(|items| items.into_iter().next())
            .map(Self::decode)
            .transpose()
    }

    async fn insert_patient(&self, record: &PatientRecord) -> CheckinResult<()> {
        let item: HashMap<String, AttributeValue> = to_item(record)
            .map_err(|e| CheckinError::Storage(format!("Failed to encode patient record: {e}")))?;

        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(patient_id)")
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(patient_id = %record.patient_id, "Stored patient record");
                Ok(())
            }
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                match err.into_service_error() {
                    PutItemError::ConditionalCheckFailedException(_) => {
                        Err(CheckinError::PatientExists(record.patient_id.clone()))
                    }
                    _ => Err(CheckinError::Storage(message)),
                }
            }
        }
    }
}
