use reqwest::header;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::request::Expect;
use super::ApiError;

/// A decoded success payload, shaped by what the server declared.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
    Empty,
}

impl ResponseBody {
    /// Classify a raw response: non-2xx becomes an `ApiError`, 2xx is decoded.
    pub async fn read(response: reqwest::Response, expect: Expect) -> Result<Self, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(is_json_content_type)
            .unwrap_or(false);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        debug!(status = %status, len = bytes.len(), json = is_json, "Decoding response body");
        Self::decode_bytes(bytes.to_vec(), is_json, expect)
    }

    fn decode_bytes(bytes: Vec<u8>, is_json: bool, expect: Expect) -> Result<Self, ApiError> {
        if expect == Expect::Binary {
            return Ok(ResponseBody::Binary(bytes));
        }
        if bytes.is_empty() {
            return Ok(ResponseBody::Empty);
        }
        if is_json {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| ApiError::InvalidResponse(format!("malformed JSON body: {}", e)))?;
            return Ok(ResponseBody::Json(value));
        }
        match String::from_utf8(bytes) {
            Ok(text) => Ok(ResponseBody::Text(text)),
            Err(e) => Ok(ResponseBody::Binary(e.into_bytes())),
        }
    }

    /// Convert into the caller's type. An empty body decodes as `{}` and a
    /// text body as a JSON string.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let value = match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Empty => Value::Object(Default::default()),
            ResponseBody::Text(text) => Value::String(text),
            ResponseBody::Binary(_) => {
                return Err(ApiError::InvalidResponse(
                    "binary body cannot be decoded as a typed payload".to_string(),
                ))
            }
        };
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("unexpected payload shape: {}", e)))
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            ResponseBody::Json(value) => value.to_string().into_bytes(),
            ResponseBody::Text(text) => text.into_bytes(),
            ResponseBody::Binary(bytes) => bytes,
            ResponseBody::Empty => Vec::new(),
        }
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}
