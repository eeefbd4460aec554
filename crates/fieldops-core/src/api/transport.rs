use std::time::Duration;

use reqwest::{header, Client};
use tracing::{debug, warn};

use super::request::{RequestBody, RequestDescriptor};
use super::ApiError;
use crate::config::Config;

/// Builds and sends single HTTP exchanges. Knows nothing about sessions:
/// the caller decides which token, if any, goes on the request.
///
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    default_timeout: Duration,
}

impl Transport {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            default_timeout: config.request_timeout(),
        })
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Send `request` once. The bearer header is built from `token` on every
    /// call, never cached on the descriptor.
    pub async fn send(
        &self,
        request: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url_for(&request.endpoint);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .timeout(request.timeout.unwrap_or(self.default_timeout));

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // Multipart bodies get their content type (with boundary) from the encoder
        if !request.body.is_multipart() && !request.has_header(header::CONTENT_TYPE.as_str()) {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            RequestBody::None => builder,
            RequestBody::Json(ref value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| {
                    ApiError::InvalidRequest(format!("body is not serializable: {}", e))
                })?;
                builder.body(bytes)
            }
            RequestBody::Multipart(ref payload) => builder.multipart(payload.to_form()?),
        };

        debug!(method = %request.method, url = %url, authenticated = token.is_some(), "Sending HTTP request");

        match builder.send().await {
            Ok(response) => {
                debug!(status = %response.status(), url = %url, "Received HTTP response");
                Ok(response)
            }
            Err(e) => {
                warn!(error = %e, url = %url, timeout = e.is_timeout(), "HTTP request error");
                Err(ApiError::from_transport(&e))
            }
        }
    }
}
