//! HTTP client for the external extraction service.
//!
//! Routes: `POST /process`, `POST /batch-process`, `GET /health`.
//!
//! The service's JSON is loosely shaped: field names come in camelCase or
//! snake_case, extraction fields may sit at the top level or under
//! `extracted_data`, amenities may be a string or a list, and the `success`
//! flag is sometimes missing. Decoding folds all of that into the typed
//! [`BatchResponse`] / [`MessageResponse`] variants.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    BatchResponse, ClassificationResult, ExternalClassifier, ExtractionResult, HealthStatus,
    MessageOutcome, MessageResponse, ResultSource, SecurityStatus,
};
use crate::config::ClassifierConfig;
use crate::error::ClassifierError;

/// Client for the extraction service.
pub struct HttpClassifier {
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
    message_timeout: Duration,
    batch_timeout: Duration,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
            message_timeout: config.message_timeout,
            batch_timeout: config.batch_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    /// Send a request and return the status plus raw body.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<(StatusCode, String), ClassifierError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                ClassifierError::Timeout { operation, timeout }
            } else {
                ClassifierError::from(e)
            }
        };

        let response = self
            .authorize(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(&map_err)?;
        let status = response.status();
        let body = response.text().await.map_err(&map_err)?;
        debug!(operation, status = status.as_u16(), bytes = body.len(), "Classifier responded");
        Ok((status, body))
    }
}

#[async_trait]
impl ExternalClassifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn process_message(&self, content: &str) -> Result<MessageResponse, ClassifierError> {
        let request = self
            .client
            .post(self.url("process"))
            .json(&serde_json::json!({ "message": content }));
        let (status, body) = self
            .send("process_message", request, self.message_timeout)
            .await?;
        parse_message_response(status, &body)
    }

    async fn batch_process(&self, contents: &[String]) -> Result<BatchResponse, ClassifierError> {
        let request = self
            .client
            .post(self.url("batch-process"))
            .json(&serde_json::json!({ "messages": contents }));
        let (status, body) = self
            .send("batch_process", request, self.batch_timeout)
            .await?;
        parse_batch_response(status, &body, contents)
    }

    async fn health_check(&self) -> Result<HealthStatus, ClassifierError> {
        let request = self.client.get(self.url("health"));
        let (status, body) = self
            .send("health_check", request, self.message_timeout)
            .await?;
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ClassifierError::InvalidResponse(e.to_string()))
    }
}

// ── Wire decoding ───────────────────────────────────────────────────

/// First of `keys` present on `object` with a non-null value. The service
/// may send both spellings of a field; the earlier key wins.
fn first<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

fn invalid(message: impl Into<String>) -> ClassifierError {
    ClassifierError::InvalidResponse(format!("bad result: {}", message.into()))
}

fn read_f64(object: &Value, keys: &[&str]) -> Result<Option<f64>, ClassifierError> {
    first(object, keys)
        .map(|v| v.as_f64().ok_or_else(|| invalid(format!("{} is not a number", keys[0]))))
        .transpose()
}

/// Extraction fields as the service sends them.
#[derive(Debug, Default)]
struct WireExtraction {
    location: Option<Value>,
    price: Option<Value>,
    room_type: Option<Value>,
    availability: Option<Value>,
    contact_info: Option<Value>,
    amenities: Option<Value>,
    extraction_method: Option<String>,
    confidence: Option<f32>,
}

impl WireExtraction {
    fn read(object: &Value) -> Result<Self, ClassifierError> {
        let field = |keys: &[&str]| first(object, keys).cloned();
        Ok(Self {
            location: field(&["location"]),
            price: field(&["price", "rent_price"]),
            room_type: field(&["room_type", "roomType"]),
            availability: field(&["availability", "availability_date"]),
            contact_info: field(&["contact_info", "contactInfo"]),
            amenities: field(&["amenities", "additional_notes"]),
            extraction_method: first(object, &["extraction_method", "extractionMethod"])
                .and_then(Value::as_str)
                .map(String::from),
            confidence: read_f64(object, &["confidence"])?.map(|c| c as f32),
        })
    }

    fn has_fields(&self) -> bool {
        [
            &self.location,
            &self.price,
            &self.room_type,
            &self.availability,
            &self.contact_info,
            &self.amenities,
        ]
        .iter()
        .any(|v| v.is_some())
    }

    /// Fill fields missing here from `other`.
    fn or(self, other: WireExtraction) -> WireExtraction {
        WireExtraction {
            location: self.location.or(other.location),
            price: self.price.or(other.price),
            room_type: self.room_type.or(other.room_type),
            availability: self.availability.or(other.availability),
            contact_info: self.contact_info.or(other.contact_info),
            amenities: self.amenities.or(other.amenities),
            extraction_method: self.extraction_method.or(other.extraction_method),
            confidence: self.confidence.or(other.confidence),
        }
    }
}

/// One per-message result as the service sends it.
#[derive(Debug)]
struct WireResult {
    is_housing: bool,
    confidence: f32,
    reasoning: String,
    security_status: Option<String>,
    threats: Vec<String>,
    errors: Vec<String>,
    processing_time: f64,
    extracted_data: Option<WireExtraction>,
}

impl WireResult {
    fn read(object: &Value) -> Result<Self, ClassifierError> {
        if !object.is_object() {
            return Err(invalid("result is not an object"));
        }
        let strings = |key: &str| -> Vec<String> {
            first(object, &[key])
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(|i| field_text(Some(i.clone()))).collect())
                .unwrap_or_default()
        };

        let is_housing = match first(object, &["is_housing", "isHousing"]) {
            Some(v) => v
                .as_bool()
                .ok_or_else(|| invalid("is_housing is not a boolean"))?,
            None => false,
        };
        let extracted_data = match first(object, &["extracted_data", "extractedData"]) {
            Some(nested) if nested.is_object() => Some(WireExtraction::read(nested)?),
            Some(_) => return Err(invalid("extracted_data is not an object")),
            None => None,
        };

        Ok(Self {
            is_housing,
            confidence: read_f64(object, &["confidence", "confidence_score"])?.unwrap_or(0.0) as f32,
            reasoning: first(object, &["reasoning", "classification_reasoning"])
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            security_status: first(object, &["security_status", "securityStatus"])
                .and_then(Value::as_str)
                .map(String::from),
            threats: strings("threats"),
            errors: strings("errors"),
            processing_time: read_f64(object, &["processing_time", "processingTime"])?
                .unwrap_or(0.0),
            extracted_data,
        })
    }

    /// Why the service could not classify this message, if it says so.
    fn service_error(&self) -> Option<String> {
        if !self.errors.is_empty() {
            return Some(self.errors.join("; "));
        }
        self.security_status
            .as_deref()
            .filter(|s| s.eq_ignore_ascii_case("ERROR"))
            .map(|_| "service reported an error for this message".to_string())
    }

    /// `inline` holds extraction fields found at the top level of the result.
    fn into_outcome(self, inline: WireExtraction) -> MessageOutcome {
        let confidence = self.confidence.clamp(0.0, 1.0);
        let security_status = match self.security_status.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("THREAT_BLOCKED") || s.eq_ignore_ascii_case("COMPROMISED") => {
                SecurityStatus::ThreatBlocked
            }
            _ => SecurityStatus::Safe,
        };

        let fields = match self.extracted_data {
            Some(nested) => nested.or(inline),
            None => inline,
        };
        let extraction = (self.is_housing && fields.has_fields()).then(|| ExtractionResult {
            location: field_text(fields.location),
            price: field_text(fields.price),
            room_type: field_text(fields.room_type),
            availability: field_text(fields.availability),
            contact_info: field_text(fields.contact_info),
            amenities: field_text(fields.amenities),
            confidence: fields.confidence.unwrap_or(confidence).clamp(0.0, 1.0),
            extraction_method: fields
                .extraction_method
                .unwrap_or_else(|| "external".to_string()),
        });

        MessageOutcome {
            classification: ClassificationResult {
                is_housing: self.is_housing,
                confidence,
                reasoning: self.reasoning,
                security_status,
                threats: self.threats,
            },
            extraction,
            processing_time: self.processing_time.max(0.0),
            source: ResultSource::External,
        }
    }
}

/// A decoded per-message result.
#[derive(Debug)]
enum Decoded {
    Classified(MessageOutcome),
    /// The service answered but could not classify the message.
    ServiceError(String),
}

/// Decode one result object. Extraction fields are read both from the top
/// level and from `extracted_data`; the nested copy wins.
fn decode_result(value: &Value) -> Result<Decoded, ClassifierError> {
    let wire = WireResult::read(value)?;
    if let Some(reason) = wire.service_error() {
        return Ok(Decoded::ServiceError(reason));
    }
    let inline = WireExtraction::read(value)?;
    Ok(Decoded::Classified(wire.into_outcome(inline)))
}

/// Render a loosely typed JSON field as text.
fn field_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .into_iter()
                .filter_map(|item| field_text(Some(item)))
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Null | Value::Bool(_) | Value::Object(_) => None,
    }
}

/// Reason string for an explicit failure body, if the body says it failed.
fn failure_reason(status: StatusCode, body: &Value) -> Option<String> {
    let error = body.get("error").and_then(Value::as_str);
    let success = body.get("success").and_then(Value::as_bool);

    if !status.is_success() {
        return Some(format!(
            "HTTP {}: {}",
            status.as_u16(),
            error.unwrap_or("no error message")
        ));
    }
    if success == Some(false) || error.is_some() {
        return Some(error.unwrap_or("service reported failure").to_string());
    }
    None
}

/// Decode a `/batch-process` response for `contents`.
///
/// A missing `success` flag with a results array counts as success. A result
/// count different from `contents.len()` is a failure: partial batches are
/// not trusted. A result the service marks as errored is replaced by the
/// keyword fallback for that message alone.
pub fn parse_batch_response(
    status: StatusCode,
    body: &str,
    contents: &[String],
) -> Result<BatchResponse, ClassifierError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if status.is_success() => {
            return Err(ClassifierError::InvalidResponse(format!("JSON parse error: {e}")));
        }
        Err(_) => {
            return Ok(BatchResponse::Failure {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
    };

    if let Some(reason) = failure_reason(status, &value) {
        return Ok(BatchResponse::Failure { reason });
    }

    let Some(raw_results) = value.get("results") else {
        return Ok(BatchResponse::Failure {
            reason: "response has no results".to_string(),
        });
    };
    let Some(items) = raw_results.as_array() else {
        return Err(ClassifierError::InvalidResponse(
            "results is not an array".to_string(),
        ));
    };

    if items.len() != contents.len() {
        return Ok(BatchResponse::Failure {
            reason: format!("expected {} results, got {}", contents.len(), items.len()),
        });
    }

    let mut results = Vec::with_capacity(items.len());
    for (index, (item, content)) in items.iter().zip(contents).enumerate() {
        let outcome = match decode_result(item)? {
            Decoded::Classified(outcome) => outcome,
            Decoded::ServiceError(reason) => {
                warn!(index, %reason, "Service failed one message, using keyword fallback");
                MessageOutcome::fallback(content)
            }
        };
        results.push(outcome);
    }
    Ok(BatchResponse::Success { results })
}

/// Decode a `/process` response, wrapped (`{"success", "result"}`) or bare.
pub fn parse_message_response(
    status: StatusCode,
    body: &str,
) -> Result<MessageResponse, ClassifierError> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if status.is_success() => {
            return Err(ClassifierError::InvalidResponse(format!("JSON parse error: {e}")));
        }
        Err(_) => {
            return Ok(MessageResponse::Failure {
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
    };

    if let Some(reason) = failure_reason(status, &value) {
        return Ok(MessageResponse::Failure { reason });
    }

    let raw = match value.get("result") {
        Some(inner) if inner.is_object() => inner,
        _ => &value,
    };

    Ok(match decode_result(raw)? {
        Decoded::Classified(result) => MessageResponse::Success { result },
        Decoded::ServiceError(reason) => MessageResponse::Failure { reason },
    })
}
