//! Spotify session - OAuth 2.0 sign-in and library browsing for the terminal
//!
//! This library implements the Spotify authorization code flow for a
//! public client, keeps the resulting tokens in a pluggable store, and
//! tracks the session lifecycle from login through callback to logout.
//!
//! # Features
//!
//! - Authorization code flow with optional `state` and PKCE (RFC 7636)
//! - Pluggable storage backend: memory, file or OS keyring
//! - Session state published on a watch channel
//! - One-shot callback handling with a bounded wait for the session
//! - Typed access to the profile, playlists, top tracks and Liked Songs
//!
//! # Example
//!
//! ```no_run
//! use spotify_session::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> spotify_session::error::Result<()> {
//! let config = OAuthConfig::spotify("your-client-id", "http://127.0.0.1:8888/callback");
//! let context = Context::new(config, Arc::new(MemoryStore::new()))?;
//!
//! let session = context.session(Arc::new(BrowserNavigator));
//! if !session.initialize().await.is_authenticated() {
//!     session.login()?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod callback;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod navigator;
pub mod oauth;
pub mod pkce;
pub mod server;
pub mod session;
pub mod storage;
pub mod token;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::{SpotifyApi, TimeRange};
    pub use crate::callback::{CallbackHandler, CallbackParams, CallbackStatus, CallbackTask};
    pub use crate::config::{CallbackTiming, Hardening, OAuthConfig};
    pub use crate::context::Context;
    pub use crate::error::{AuthError, Result};
    pub use crate::models::{Library, Playlist, Track, User};
    pub use crate::navigator::{BrowserNavigator, Navigator, Route};
    pub use crate::server::CallbackServer;
    pub use crate::session::{SessionController, SessionState};
    pub use crate::storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
    pub use crate::token::TokenStore;
}
