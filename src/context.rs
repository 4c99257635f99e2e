//! Wiring of the storage, token store and client shared by one process
use crate::api::SpotifyApi;
use crate::config::OAuthConfig;
use crate::error::Result;
use crate::navigator::Navigator;
use crate::oauth::AuthClient;
use crate::session::SessionController;
use crate::storage::KeyValueStore;
use crate::token::TokenStore;
use std::sync::Arc;

/// One token store and one client per process
///
/// Every session and API handle built from a context shares the same
/// in-memory token state.
#[derive(Clone)]
pub struct Context {
    tokens: Arc<TokenStore>,
    client: Arc<AuthClient>,
}

impl Context {
    pub fn new(config: OAuthConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let tokens = Arc::new(TokenStore::new(storage.clone()));
        let client = Arc::new(AuthClient::new(config, tokens.clone(), storage)?);
        Ok(Self { tokens, client })
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn client(&self) -> &Arc<AuthClient> {
        &self.client
    }

    pub fn api(&self) -> SpotifyApi {
        SpotifyApi::new(self.client.clone())
    }

    pub fn session(&self, navigator: Arc<dyn Navigator>) -> SessionController {
        SessionController::new(self.client.clone(), navigator)
    }
}
