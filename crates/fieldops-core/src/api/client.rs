//! API client for the dashboard's REST endpoints.
//!
//! Every domain service goes through `ApiClient`: it attaches the bearer
//! token, classifies failures and recovers from an expired token with one
//! shared refresh and a single resend.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::notify::{LogNotifier, Notifier};
use super::refresh::RefreshCoordinator;
use super::request::RequestDescriptor;
use super::transport::Transport;
use super::{ApiError, ResponseBody};
use crate::auth::{self, CredentialStore, SessionEvent, SessionManager};
use crate::config::Config;
use crate::models::{Credentials, Session};

/// Clone is cheap - all state is shared behind Arcs.
#[derive(Clone)]
pub struct ApiClient {
    transport: Transport,
    session: Arc<SessionManager>,
    refresh: Arc<RefreshCoordinator>,
    notifier: Arc<dyn Notifier>,
}

impl ApiClient {
    /// Create a client over an already opened credential store.
    pub fn new(config: &Config, store: CredentialStore) -> Result<Self, ApiError> {
        let transport = Transport::new(config)?;
        let session = SessionManager::new(store, transport.clone(), config);

        Ok(Self {
            transport,
            session: Arc::new(session),
            refresh: Arc::new(RefreshCoordinator::new()),
            notifier: Arc::new(LogNotifier),
        })
    }

    /// Create a client using the slot backend named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = CredentialStore::open(auth::slots_for(config)?)?;
        Ok(Self::new(config, store)?)
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// True while a token refresh is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let result = self.session.login(credentials).await;
        if let Err(ref e) = result {
            if e.is_reportable() {
                self.notifier.notify(&e.to_string());
            }
        }
        result
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    /// Run one logical request to completion.
    ///
    /// Callers see either the final payload or the final error; a 401 that
    /// was recovered by refreshing is never surfaced.
    ///
    /// A timeout on the descriptor bounds the whole logical request,
    /// including any wait on a shared refresh and the resend. Expiry is a
    /// network failure and leaves the session and the in-flight refresh
    /// untouched for other callers.
    pub async fn execute(&self, request: RequestDescriptor) -> Result<ResponseBody, ApiError> {
        let result = match request.timeout {
            Some(limit) => tokio::time::timeout(limit, self.execute_with_refresh(&request))
                .await
                .unwrap_or_else(|_| {
                    warn!(endpoint = %request.endpoint, ?limit, "Request deadline expired");
                    Err(ApiError::Network(format!("request timed out after {:?}", limit)))
                }),
            None => self.execute_with_refresh(&request).await,
        };
        if let Err(ref e) = result {
            if e.is_reportable() && !request.skip_error_toast {
                self.notifier.notify(&e.to_string());
            }
        }
        result
    }

    pub async fn execute_as<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T, ApiError> {
        self.execute(request).await?.decode()
    }

    async fn execute_with_refresh(&self, request: &RequestDescriptor) -> Result<ResponseBody, ApiError> {
        let token = if request.skip_auth {
            None
        } else {
            match self.session.token() {
                Some(token) => Some(token),
                None => {
                    warn!(endpoint = %request.endpoint, "Authenticated request without a session");
                    self.session.emit(SessionEvent::LoginRequired);
                    return Err(ApiError::Unauthenticated);
                }
            }
        };

        let response = self.transport.send(request, token.as_deref()).await?;

        let stale = match token {
            Some(token) if response.status() == reqwest::StatusCode::UNAUTHORIZED => token,
            _ => return ResponseBody::read(response, request.expect).await,
        };

        warn!(endpoint = %request.endpoint, "Received 401, refreshing token and retrying");
        let fresh = self.refresh.fresh_token(&self.session, &stale).await?;

        debug!(endpoint = %request.endpoint, "Resending with refreshed token");
        let response = self.transport.send(request, Some(&fresh)).await?;
        // Final answer, a second 401 is an ordinary request error
        ResponseBody::read(response, request.expect).await
    }

    // ===== Convenience verbs =====

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute_as(RequestDescriptor::get(endpoint)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_as(RequestDescriptor::post(endpoint).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_as(RequestDescriptor::put(endpoint).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.execute_as(RequestDescriptor::patch(endpoint).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.execute_as(RequestDescriptor::delete(endpoint)).await
    }
}
