//! OAuth 2.0 authorization code flow against the Spotify accounts service
use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::pkce::{generate_state, PendingAuthorization, Pkce};
use crate::storage::KeyValueStore;
use crate::token::TokenStore;
use log::{debug, info, warn};
use parking_lot::Mutex;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth 2.0 client
///
/// Builds authorization URLs, exchanges codes for tokens and issues
/// bearer-authenticated requests. This is a public client: no secret is
/// ever sent.
pub struct AuthClient {
    config: OAuthConfig,
    tokens: Arc<TokenStore>,
    storage: Arc<dyn KeyValueStore>,
    http: reqwest::Client,
    exchanges_in_flight: Mutex<HashSet<String>>,
}

impl AuthClient {
    /// Create a new client
    ///
    /// `storage` holds pending hardening values; it is normally the same
    /// store that backs `tokens`.
    pub fn new(
        config: OAuthConfig,
        tokens: Arc<TokenStore>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        Url::parse(&config.authorization_endpoint).map_err(|e| {
            AuthError::InvalidConfig(format!("Invalid authorization endpoint: {}", e))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            tokens,
            storage,
            http,
            exchanges_in_flight: Mutex::new(HashSet::new()),
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Authorization request URL for the plain flow
    ///
    /// Pure function of the configuration. It carries no `state`, so any
    /// code arriving at the redirect URI is accepted as-is; see
    /// [`AuthClient::begin_authorization`] for the hardened variant.
    pub fn build_authorization_url(&self) -> Result<Url> {
        self.authorization_url(&[])
    }

    fn authorization_url(&self, extra: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.config.authorization_endpoint).map_err(|e| {
            AuthError::InvalidConfig(format!("Invalid authorization endpoint: {}", e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("scope", &self.config.scope());
            if self.config.show_dialog {
                query.append_pair("show_dialog", "true");
            }
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Authorization URL for the login navigation
    ///
    /// Identical to [`AuthClient::build_authorization_url`] unless hardening
    /// is enabled, in which case a fresh state and/or PKCE verifier is
    /// generated and persisted for the callback.
    pub fn begin_authorization(&self) -> Result<Url> {
        let hardening = self.config.hardening;
        if !hardening.state && !hardening.pkce {
            return self.build_authorization_url();
        }

        let state = hardening.state.then(generate_state);
        let pkce = hardening.pkce.then(Pkce::generate);

        PendingAuthorization {
            state: state.clone(),
            code_verifier: pkce.as_ref().map(|p| p.code_verifier().to_string()),
        }
        .save(self.storage.as_ref())
        .map_err(AuthError::StorageError)?;

        let mut extra = Vec::new();
        if let Some(state) = &state {
            extra.push(("state", state.as_str()));
        }
        if let Some(pkce) = &pkce {
            extra.push(("code_challenge", pkce.code_challenge()));
            extra.push(("code_challenge_method", Pkce::code_challenge_method()));
        }

        self.authorization_url(&extra)
    }

    /// Check the `state` returned on the redirect against the pending one
    ///
    /// A no-op unless state hardening is enabled. The pending value is
    /// consumed either way.
    pub fn verify_state(&self, returned: Option<&str>) -> Result<()> {
        if !self.config.hardening.state {
            return Ok(());
        }

        let expected =
            PendingAuthorization::take_state(self.storage.as_ref()).map_err(AuthError::StorageError)?;

        match (expected.as_deref(), returned) {
            (Some(expected), Some(returned)) if expected == returned => Ok(()),
            _ => {
                warn!("Rejecting redirect with unexpected state parameter");
                Err(AuthError::InvalidState)
            }
        }
    }

    /// Exchange an authorization code for tokens
    ///
    /// On success the access token (and refresh token, if returned) is
    /// persisted. On failure nothing is written.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        let _claim = ExchangeClaim::acquire(&self.exchanges_in_flight, code)?;

        let code_verifier = if self.config.hardening.pkce {
            PendingAuthorization::take_code_verifier(self.storage.as_ref())
                .map_err(AuthError::StorageError)?
        } else {
            None
        };

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(verifier) = &code_verifier {
            form.push(("code_verifier", verifier.as_str()));
        }

        debug!("Exchanging authorization code at {}", self.config.token_endpoint);

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::AuthExchangeFailed(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::AuthExchangeFailed(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::AuthExchangeFailed(format!("invalid token response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(AuthError::AuthExchangeFailed(
                "token response carried an empty access_token".to_string(),
            ));
        }

        self.tokens
            .save(&token.access_token, token.refresh_token.as_deref())?;

        info!(
            "Authorization code exchanged (expires in {}s)",
            token.expires_in.unwrap_or_default()
        );
        Ok(())
    }

    /// GET a resource with the stored bearer token
    ///
    /// Fails fast with `NoToken` when logged out. A 401 clears the token
    /// store before surfacing `TokenExpired`.
    pub async fn authorized_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let access_token = self.tokens.access_token().ok_or(AuthError::NoToken)?;

        let url = format!(
            "{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            if self.tokens.clear_if_current(&access_token) {
                warn!("Access token rejected by {}, clearing session", path);
            } else {
                debug!("Stale access token rejected by {}, keeping the newer one", path);
            }
            return Err(AuthError::TokenExpired);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("{}: {}", path, e)))
    }
}

/// Marks a code as being exchanged until dropped
struct ExchangeClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    code: String,
}

impl<'a> ExchangeClaim<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, code: &str) -> Result<Self> {
        if !in_flight.lock().insert(code.to_string()) {
            return Err(AuthError::AuthExchangeFailed(
                "an exchange for this code is already in progress".to_string(),
            ));
        }

        Ok(Self {
            in_flight,
            code: code.to_string(),
        })
    }
}

impl Drop for ExchangeClaim<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.code);
    }
}
