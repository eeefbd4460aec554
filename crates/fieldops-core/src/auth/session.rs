use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::CredentialStore;
use crate::api::request::{Expect, RequestDescriptor};
use crate::api::transport::Transport;
use crate::api::{ApiError, ResponseBody};
use crate::config::Config;
use crate::models::{Credentials, LoginResponse, RefreshResponse, Session, UserProfile};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_BUFFER_SIZE: usize = 16;

/// Session lifecycle notifications. The front end's navigation layer
/// subscribes and sends the user to the login surface on `Expired` and
/// `LoginRequired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    LoggedOut,
    /// A refresh failed and the session was cleared
    Expired,
    /// An authenticated call was attempted with no session
    LoginRequired,
}

impl SessionEvent {
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionEvent::Expired | SessionEvent::LoginRequired)
    }
}

/// Login, logout and token refresh on top of the credential store.
pub struct SessionManager {
    store: CredentialStore,
    transport: Transport,
    login_path: String,
    refresh_path: String,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(store: CredentialStore, transport: Transport, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self {
            store,
            transport,
            login_path: config.login_path.clone(),
            refresh_path: config.refresh_path.clone(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.has_token()
    }

    pub fn token(&self) -> Option<String> {
        self.store.token()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.store.profile()
    }

    /// Exchange credentials for a session. Nothing is stored unless the
    /// whole exchange succeeds.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let request = RequestDescriptor::post(&self.login_path)
            .json(credentials)?
            .skip_auth();

        let response = self.transport.send(&request, None).await?;
        let body = ResponseBody::read(response, Expect::Auto)
            .await
            .map_err(|e| match e {
                ApiError::Http { status: 400 | 401 | 403, message } => {
                    ApiError::InvalidCredentials(message)
                }
                other => other,
            })?;
        let login: LoginResponse = body.decode()?;

        self.store
            .set_session(&login.token, &login.user)
            .map_err(|e| ApiError::Storage(format!("{:#}", e)))?;

        info!(user = %login.user.email, role = ?login.user.role, "Signed in");
        self.emit(SessionEvent::LoggedIn);

        Ok(Session {
            token: login.token,
            user: login.user,
        })
    }

    /// Replace the stored profile after the server accepted an update.
    pub fn update_current_user(&self, profile: &UserProfile) -> Result<(), ApiError> {
        if !self.store.has_token() {
            return Err(ApiError::Unauthenticated);
        }
        self.store
            .set_profile(profile)
            .map_err(|e| ApiError::Storage(format!("{:#}", e)))
    }

    /// Clear the session. Safe to call when signed out.
    pub fn logout(&self) {
        self.end_session(SessionEvent::LoggedOut);
    }

    fn end_session(&self, event: SessionEvent) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential slots");
        }
        info!(?event, "Session ended");
        self.emit(event);
    }

    /// Trade the current token for a new one.
    ///
    /// Any failure ends the session: the store is cleared, `Expired` is
    /// emitted and `SessionExpired` returned. Callers must not retry.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let Some(current) = self.store.token() else {
            // Already signed out, nothing left to end
            return Err(ApiError::SessionExpired);
        };

        match self.exchange_refresh(&current).await {
            Ok(token) => {
                if let Err(e) = self.store.set_token(&token) {
                    error!(error = %e, "Failed to persist refreshed token");
                    self.end_session(SessionEvent::Expired);
                    return Err(ApiError::SessionExpired);
                }
                info!("Session token refreshed");
                self.emit(SessionEvent::Refreshed);
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                self.end_session(SessionEvent::Expired);
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn exchange_refresh(&self, current: &str) -> Result<String, ApiError> {
        let request = RequestDescriptor::post(&self.refresh_path).skip_error_toast();
        let response = self.transport.send(&request, Some(current)).await?;
        let refreshed: RefreshResponse = ResponseBody::read(response, Expect::Auto).await?.decode()?;

        if refreshed.token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "refresh response does not contain a token".to_string(),
            ));
        }
        Ok(refreshed.token)
    }
}
