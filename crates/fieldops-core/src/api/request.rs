//! Per-call request descriptions.
//!
//! A `RequestDescriptor` is plain data: it never carries the bearer token.
//! The token is attached when the request is built for sending, so a resend
//! after a refresh always picks up the fresh one.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;

use super::ApiError;

/// What the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expect {
    /// Decide from the response's content type
    #[default]
    Auto,
    /// Raw bytes regardless of content type
    Binary,
}

/// A text or numeric form field sent alongside an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text(String),
    Number(f64),
}

impl FormField {
    pub fn to_form_value(&self) -> String {
        match self {
            FormField::Text(s) => s.clone(),
            FormField::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for FormField {
    fn from(value: &str) -> Self {
        FormField::Text(value.to_string())
    }
}

impl From<String> for FormField {
    fn from(value: String) -> Self {
        FormField::Text(value)
    }
}

impl From<i64> for FormField {
    fn from(value: i64) -> Self {
        FormField::Number(value as f64)
    }
}

impl From<f64> for FormField {
    fn from(value: f64) -> Self {
        FormField::Number(value)
    }
}

/// A file to attach to a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Form field the file goes under
    pub field_name: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            mime_type: None,
            bytes,
        }
    }

    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct MultipartPayload {
    pub file: UploadFile,
    pub fields: BTreeMap<String, FormField>,
}

impl MultipartPayload {
    /// Encode as a fresh form. Forms are single-use, so this runs per attempt.
    pub fn to_form(&self) -> Result<reqwest::multipart::Form, ApiError> {
        let mut part = reqwest::multipart::Part::bytes(self.file.bytes.clone())
            .file_name(self.file.file_name.clone());
        if let Some(ref mime) = self.file.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| ApiError::InvalidRequest(format!("bad mime type {}: {}", mime, e)))?;
        }

        let form = self
            .fields
            .iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.to_form_value())
            });
        Ok(form.part(self.file.field_name.clone(), part))
    }
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    None,
    Json(serde_json::Value),
    Multipart(MultipartPayload),
}

impl RequestBody {
    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Multipart(_))
    }
}

/// One logical API call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub endpoint: String,
    pub method: Method,
    pub body: RequestBody,
    pub headers: Vec<(String, String)>,
    /// Send without a bearer token and never refresh
    pub skip_auth: bool,
    /// Keep failures of this call away from the notifier
    pub skip_error_toast: bool,
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
    pub expect: Expect,
}

impl RequestDescriptor {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            body: RequestBody::None,
            headers: Vec::new(),
            skip_auth: false,
            skip_error_toast: false,
            timeout: None,
            expect: Expect::Auto,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("body is not serializable: {}", e)))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn multipart(mut self, payload: MultipartPayload) -> Self {
        self.body = RequestBody::Multipart(payload);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn skip_error_toast(mut self) -> Self {
        self.skip_error_toast = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn expect_binary(mut self) -> Self {
        self.expect = Expect::Binary;
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}
