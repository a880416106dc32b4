use std::time::Duration;

use lambda_http::http::header::{CONTENT_TYPE, RETRY_AFTER};
use lambda_http::{Body, Error, Request, RequestExt, RequestPayloadExt, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::budget::ExecutionBudget;
use crate::error::{CheckinError, CheckinResult};

/// Deserializes the JSON body of a gateway request. Bodies sent without a
/// `Content-Type` header are still read as JSON.
pub fn parse_body<T: DeserializeOwned>(request: &Request) -> CheckinResult<T> {
    let parsed = request
        .payload::<T>()
        .map_err(|e| CheckinError::Validation(format!("Invalid request body: {e}")))?;
    if let Some(body) = parsed {
        return Ok(body);
    }

    let raw: &[u8] = request.body().as_ref();
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(CheckinError::Validation(
            "Request body is required".to_string(),
        ));
    }
    serde_json::from_slice(raw)
        .map_err(|e| CheckinError::Validation(format!("Invalid request body: {e}")))
}

pub fn request_budget(request: &Request, fallback: Duration) -> ExecutionBudget {
    match request.lambda_context_ref() {
        Some(context) => ExecutionBudget::from_context(context, fallback),
        None => ExecutionBudget::starting_now(fallback),
    }
}

pub fn json_response<T: Serialize>(status: u16, payload: &T) -> Result<Response<Body>, Error> {
    let body = serde_json::to_string(payload)?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))?)
}

pub fn error_body(err: &CheckinError) -> Value {
    json!({"error": err.kind(), "message": err.to_string()})
}

pub fn error_response(err: &CheckinError) -> Result<Response<Body>, Error> {
    let mut builder = Response::builder()
        .status(err.status_code())
        .header(CONTENT_TYPE, "application/json");
    if err.status_code() == 503 {
        builder = builder.header(RETRY_AFTER, "1");
    }
    Ok(builder.body(Body::from(error_body(err).to_string()))?)
}
