//! One-shot processing of the authorization redirect
use crate::config::CallbackTiming;
use crate::error::{AuthError, Result};
use crate::models::User;
use crate::navigator::{Navigator, Route};
use crate::session::{wait_for_authenticated, SessionController, SessionState};
use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Url;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Query parameters of the redirect, parsed once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    /// Extract `code`, `error` and `state`; empty values count as absent
    /// and only the first occurrence of a key is used.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();

        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "error" => &mut params.error,
                "state" => &mut params.state,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        params
    }

    /// Parse an absolute URL or a request target such as `/callback?code=...`
    pub fn parse(target: &str) -> Self {
        let url = Url::parse(target)
            .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(target)));

        match url {
            Ok(url) => Self::from_url(&url),
            Err(e) => {
                warn!("Unparseable redirect target: {}", e);
                Self::default()
            }
        }
    }
}

/// The part of the session the callback handler drives
#[async_trait]
pub trait CallbackSession: Send + Sync {
    fn verify_state(&self, state: Option<&str>) -> Result<()>;

    async fn handle_callback(&self, code: &str) -> Result<User>;

    fn subscribe(&self) -> watch::Receiver<SessionState>;
}

#[async_trait]
impl CallbackSession for SessionController {
    fn verify_state(&self, state: Option<&str>) -> Result<()> {
        SessionController::verify_state(self, state)
    }

    async fn handle_callback(&self, code: &str) -> Result<User> {
        SessionController::handle_callback(self, code).await
    }

    fn subscribe(&self) -> watch::Receiver<SessionState> {
        SessionController::subscribe(self)
    }
}

/// Progress of a callback as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackStatus {
    Processing,
    /// Recorded before the delayed redirect
    Failed { message: String },
    Completed,
}

impl CallbackStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, CallbackStatus::Processing)
    }
}

/// Result of one callback attempt
#[derive(Debug)]
pub struct CallbackOutcome {
    /// Where the user was sent; `None` when nothing was done
    pub route: Option<Route>,
    pub result: Result<User>,
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Handler bound to the redirect landing
///
/// Processes at most one redirect and navigates at most once.
pub struct CallbackHandler<S: ?Sized> {
    session: Arc<S>,
    navigator: Arc<dyn Navigator>,
    timing: CallbackTiming,
    started: AtomicBool,
    status: watch::Sender<CallbackStatus>,
}

impl<S: CallbackSession + ?Sized> CallbackHandler<S> {
    pub fn new(session: Arc<S>, navigator: Arc<dyn Navigator>, timing: CallbackTiming) -> Self {
        let (status, _) = watch::channel(CallbackStatus::Processing);
        Self {
            session,
            navigator,
            timing,
            started: AtomicBool::new(false),
            status,
        }
    }

    pub fn status(&self) -> CallbackStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<CallbackStatus> {
        self.status.subscribe()
    }

    /// Process the redirect
    ///
    /// Failures record a message, then navigate after the redirect delay:
    /// to the landing page when the user denied access, to the login page
    /// otherwise. A successful exchange navigates to the landing page once
    /// the session is observed authenticated, bounded by the settle timeout.
    pub async fn run(&self, params: CallbackParams) -> CallbackOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Ignoring a second redirect for the same callback");
            return CallbackOutcome {
                route: None,
                result: Err(AuthError::CallbackAlreadyHandled),
            };
        }

        if let Some(reason) = params.error {
            info!("Authorization cancelled or failed: {}", reason);
            return self
                .fail(AuthError::AuthorizationDenied(reason), Route::Landing)
                .await;
        }

        let Some(code) = params.code else {
            return self.fail(AuthError::MissingCode, Route::Login).await;
        };

        if let Err(e) = self.session.verify_state(params.state.as_deref()) {
            return self.fail(e, Route::Login).await;
        }

        let mut states = self.session.subscribe();

        if let Err(e) = self.session.handle_callback(&code).await {
            return self.fail(e, Route::Login).await;
        }

        match wait_for_authenticated(&mut states, self.timing.settle_timeout).await {
            Ok(user) => {
                self.status.send_replace(CallbackStatus::Completed);
                self.navigator.navigate(Route::Landing);
                CallbackOutcome {
                    route: Some(Route::Landing),
                    result: Ok(user),
                }
            }
            Err(e) => {
                error!("Session did not settle after the code exchange: {}", e);
                self.record_failure(&e);
                self.navigator.navigate(Route::Login);
                CallbackOutcome {
                    route: Some(Route::Login),
                    result: Err(e),
                }
            }
        }
    }

    fn record_failure(&self, failure: &AuthError) {
        self.status.send_replace(CallbackStatus::Failed {
            message: failure.user_message().to_string(),
        });
    }

    async fn fail(&self, failure: AuthError, route: Route) -> CallbackOutcome {
        warn!("Callback failed: {}", failure);
        self.record_failure(&failure);

        tokio::time::sleep(self.timing.redirect_delay).await;
        self.navigator.navigate(route.clone());

        CallbackOutcome {
            route: Some(route),
            result: Err(failure),
        }
    }
}

impl<S: CallbackSession + ?Sized + 'static> CallbackHandler<S> {
    /// Run on a background task
    ///
    /// Dropping the returned [`CallbackTask`] tears the handler down, which
    /// cancels its pending timers; it will not navigate afterwards.
    pub fn spawn(self: Arc<Self>, params: CallbackParams) -> CallbackTask {
        let handle = tokio::spawn(async move { self.run(params).await });
        CallbackTask {
            handle: Some(handle),
        }
    }
}

/// Handle to a spawned callback handler
pub struct CallbackTask {
    handle: Option<JoinHandle<CallbackOutcome>>,
}

impl CallbackTask {
    /// Wait for the handler to finish; `None` if it was torn down
    pub async fn join(mut self) -> Option<CallbackOutcome> {
        let handle = self.handle.take()?;
        handle.await.ok()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for CallbackTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
