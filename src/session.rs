//! Application-visible authentication state
use crate::api::SpotifyApi;
use crate::error::{AuthError, Result};
use crate::models::User;
use crate::navigator::{Navigator, Route};
use crate::oauth::AuthClient;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Session state as observed by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// A code exchange or profile fetch is pending
    Authenticating,
    /// Holds a profile fetched after the current token was issued
    Authenticated(User),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    /// Whether nothing is pending any more
    pub fn is_settled(&self) -> bool {
        !matches!(self, SessionState::Authenticating)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Drives the session through login, callback and logout
///
/// Every transition is published on a watch channel, so a waiter is woken by
/// the transition itself rather than by polling.
pub struct SessionController {
    client: Arc<AuthClient>,
    api: SpotifyApi,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    /// Starts in `Authenticating` when a token is already stored, since its
    /// profile still has to be fetched by [`SessionController::initialize`].
    pub fn new(client: Arc<AuthClient>, navigator: Arc<dyn Navigator>) -> Self {
        let initial = if client.tokens().has_access_token() {
            SessionState::Authenticating
        } else {
            SessionState::Unauthenticated
        };
        let (state, _) = watch::channel(initial);

        Self {
            api: SpotifyApi::new(client.clone()),
            client,
            navigator,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    pub fn api(&self) -> &SpotifyApi {
        &self.api
    }

    fn transition(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    /// Settle the startup state
    ///
    /// With a stored token the profile is fetched; any failure clears the
    /// token and leaves the session unauthenticated.
    pub async fn initialize(&self) -> SessionState {
        if !self.client.tokens().has_access_token() {
            self.transition(SessionState::Unauthenticated);
            return self.state();
        }

        self.transition(SessionState::Authenticating);
        match self.api.current_user().await {
            Ok(user) => {
                info!("Restored session for {}", user.name());
                self.transition(SessionState::Authenticated(user));
            }
            Err(e) => {
                warn!("Failed to restore session: {}", e);
                self.client.tokens().clear();
                self.transition(SessionState::Unauthenticated);
            }
        }

        self.state()
    }

    /// Send the user to the authorization server's consent dialog
    pub fn login(&self) -> Result<()> {
        let url = self.client.begin_authorization()?;
        info!("Redirecting to authorization endpoint");
        self.navigator.navigate(Route::External(url));
        Ok(())
    }

    /// Check a returned `state` against the pending authorization
    pub fn verify_state(&self, state: Option<&str>) -> Result<()> {
        self.client.verify_state(state)
    }

    /// Exchange a received code and load the profile
    ///
    /// The token is persisted before the profile request is issued, and the
    /// profile is in hand before `Authenticated` becomes visible. Callers
    /// must invoke this at most once per code.
    pub async fn handle_callback(&self, code: &str) -> Result<User> {
        self.transition(SessionState::Authenticating);

        if let Err(e) = self.client.exchange_code(code).await {
            self.transition(SessionState::Unauthenticated);
            return Err(e);
        }

        match self.api.current_user().await {
            Ok(user) => {
                info!("Signed in as {}", user.name());
                self.transition(SessionState::Authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                self.client.tokens().clear();
                self.transition(SessionState::Unauthenticated);
                Err(AuthError::ProfileFetchFailed(Box::new(e)))
            }
        }
    }

    pub fn logout(&self) {
        self.client.tokens().clear();
        self.transition(SessionState::Unauthenticated);
        info!("Signed out");
    }
}

/// Wait until the observed session becomes authenticated
///
/// Resolves as soon as the transition is published. Fails with
/// `CallbackTimeout` when `timeout` elapses first or the controller is gone.
pub async fn wait_for_authenticated(
    receiver: &mut watch::Receiver<SessionState>,
    timeout: Duration,
) -> Result<User> {
    match tokio::time::timeout(timeout, receiver.wait_for(SessionState::is_authenticated)).await {
        Ok(Ok(state)) => state.user().cloned().ok_or(AuthError::CallbackTimeout),
        Ok(Err(_)) | Err(_) => Err(AuthError::CallbackTimeout),
    }
}
