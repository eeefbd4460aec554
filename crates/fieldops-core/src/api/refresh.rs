use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use super::ApiError;
use crate::auth::SessionManager;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, ApiError>>>;

/// Makes sure concurrent 401s share one refresh call.
///
/// The first request to see a 401 creates the in-flight refresh; every other
/// request that sees one before it settles awaits the same future. The
/// handle is dropped once it settles so the next 401 can start a new one.
#[derive(Default)]
pub struct RefreshCoordinator {
    in_flight: Mutex<Option<RefreshFuture>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<RefreshFuture>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_refreshing(&self) -> bool {
        self.slot().is_some()
    }

    /// Token to resend with after `stale` was rejected.
    pub async fn fresh_token(
        &self,
        session: &Arc<SessionManager>,
        stale: &str,
    ) -> Result<String, ApiError> {
        let refresh = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    // The store is written before a refresh settles, so a
                    // different token here means one already finished while
                    // this request was on the wire.
                    match session.token() {
                        None => return Err(ApiError::SessionExpired),
                        Some(current) if current != stale => return Ok(current),
                        Some(_) => {}
                    }

                    debug!("Starting token refresh");
                    // Spawned so it still settles if every waiter gives up
                    let session = Arc::clone(session);
                    let task = tokio::spawn(async move { session.refresh().await });
                    let refresh = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(ApiError::Network(format!("token refresh did not finish: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        let result = refresh.clone().await;

        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&refresh)) {
            *slot = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::Transport;
    use crate::auth::{CredentialStore, MemorySlots, SessionEvent};
    use crate::config::Config;
    use crate::models::{Role, UserProfile};

    fn session_at(base_url: &str, token: Option<&str>) -> Arc<SessionManager> {
        let config = Config::for_base_url(base_url);
        let store = CredentialStore::open(Box::new(MemorySlots::new())).unwrap();
        if let Some(token) = token {
            let profile = UserProfile {
                id: "u-1".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Okafor".to_string(),
                email: "a@b.com".to_string(),
                role: Role::Officer,
                field_office: None,
                job_title: None,
                active: true,
                last_login: None,
            };
            store.set_session(token, &profile).unwrap();
        }
        let transport = Transport::new(&config).unwrap();
        Arc::new(SessionManager::new(store, transport, &config))
    }

    #[tokio::test]
    async fn test_settled_refresh_token_reused() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/api/auth/refresh-token")
            .expect(0)
            .create_async()
            .await;

        // T1 was rejected, but a refresh already replaced it with T2
        let session = session_at(&server.url(), Some("T2"));
        let mut events = session.subscribe();
        let coordinator = RefreshCoordinator::new();

        let token = coordinator.fresh_token(&session, "T1").await.unwrap();

        refresh.assert_async().await;
        assert_eq!(token, "T2");
        assert!(!coordinator.is_refreshing());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ended_session_not_refreshed_again() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/api/auth/refresh-token")
            .match_header("authorization", "Bearer T1")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let session = session_at(&server.url(), Some("T1"));
        let mut events = session.subscribe();
        let coordinator = RefreshCoordinator::new();

        let first = coordinator.fresh_token(&session, "T1").await;
        assert_eq!(first, Err(ApiError::SessionExpired));
        assert!(!coordinator.is_refreshing());

        // A straggling 401 for the same token after the session ended
        let late = coordinator.fresh_token(&session, "T1").await;
        assert_eq!(late, Err(ApiError::SessionExpired));

        refresh.assert_async().await;
        assert!(!session.is_authenticated());
        assert!(!coordinator.is_refreshing());

        let mut expired = 0;
        while let Ok(event) = events.try_recv() {
            if event == SessionEvent::Expired {
                expired += 1;
            }
        }
        assert_eq!(expired, 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_token() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/api/auth/refresh-token")
            .match_header("authorization", "Bearer T1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"token":"T2"}"#)
            .expect(1)
            .create_async()
            .await;

        let session = session_at(&server.url(), Some("T1"));
        let coordinator = RefreshCoordinator::new();

        assert_eq!(coordinator.fresh_token(&session, "T1").await.unwrap(), "T2");
        // Same stale token again: the settled refresh is reused, not repeated
        assert_eq!(coordinator.fresh_token(&session, "T1").await.unwrap(), "T2");

        refresh.assert_async().await;
        assert_eq!(session.token().as_deref(), Some("T2"));
        assert!(!coordinator.is_refreshing());
    }
}
