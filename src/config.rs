//! Client configuration for the Spotify authorization code flow
use crate::error::{AuthError, Result};
use std::time::Duration;

pub const AUTHORIZATION_ENDPOINT: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Scopes requested on every authorization.
///
/// - user-read-private / user-read-email: profile and email
/// - playlist-read-private: private playlists
/// - user-top-read: top tracks
/// - user-library-read: Liked Songs
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "playlist-read-private",
    "user-top-read",
    "user-library-read",
];

/// Opt-in protections that the plain flow does not use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hardening {
    /// Send an anti-forgery `state` and verify it on the redirect.
    pub state: bool,
    /// Use PKCE (S256) for the code exchange.
    pub pkce: bool,
}

/// OAuth 2.0 configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
    /// Force the consent dialog even when the user already approved the app.
    pub show_dialog: bool,
    pub hardening: Hardening,
}

impl OAuthConfig {
    /// Configuration against the public Spotify endpoints
    pub fn spotify(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            authorization_endpoint: AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            api_base_url: API_BASE_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            show_dialog: true,
            hardening: Hardening::default(),
        }
    }

    /// Load configuration from the process environment
    ///
    /// - `SPOTIFY_CLIENT_ID` (required)
    /// - `SPOTIFY_REDIRECT_URI` (defaults to `http://127.0.0.1:8888/callback`)
    /// - `SPOTIFY_VERIFY_STATE`, `SPOTIFY_USE_PKCE` (booleans, default off)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup("SPOTIFY_CLIENT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AuthError::InvalidConfig("Missing SPOTIFY_CLIENT_ID".to_string()))?;

        let redirect_uri = lookup("SPOTIFY_REDIRECT_URI")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        reqwest::Url::parse(&redirect_uri).map_err(|e| {
            AuthError::InvalidConfig(format!("Invalid SPOTIFY_REDIRECT_URI {}: {}", redirect_uri, e))
        })?;

        let mut config = Self::spotify(client_id.trim(), redirect_uri);
        config.hardening = Hardening {
            state: parse_flag(lookup("SPOTIFY_VERIFY_STATE").as_deref()),
            pkce: parse_flag(lookup("SPOTIFY_USE_PKCE").as_deref()),
        };

        Ok(config)
    }

    /// Space-delimited scope list as sent to the authorization endpoint
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Delays used by the callback handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackTiming {
    /// How long a failure message stays up before redirecting.
    pub redirect_delay: Duration,
    /// Upper bound on waiting for the session to become authenticated.
    pub settle_timeout: Duration,
}

impl Default for CallbackTiming {
    fn default() -> Self {
        Self {
            redirect_delay: Duration::from_secs(3),
            settle_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_spotify_defaults() {
        let config = OAuthConfig::spotify("client", "http://localhost:5173/callback");
        assert_eq!(config.authorization_endpoint, AUTHORIZATION_ENDPOINT);
        assert_eq!(config.token_endpoint, TOKEN_ENDPOINT);
        assert!(config.show_dialog);
        assert_eq!(
            config.scope(),
            "user-read-private user-read-email playlist-read-private user-top-read user-library-read"
        );
        assert_eq!(config.hardening, Hardening::default());
    }

    #[test]
    fn test_from_lookup_requires_client_id() {
        let err = OAuthConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_lookup_defaults_redirect_uri() {
        let config = OAuthConfig::from_lookup(lookup_from(&[("SPOTIFY_CLIENT_ID", "abc")])).unwrap();
        assert_eq!(config.client_id, "abc");
        assert_eq!(config.redirect_uri, DEFAULT_REDIRECT_URI);
        assert!(!config.hardening.state);
        assert!(!config.hardening.pkce);
    }

    #[test]
    fn test_from_lookup_reads_hardening_flags() {
        let config = OAuthConfig::from_lookup(lookup_from(&[
            ("SPOTIFY_CLIENT_ID", "abc"),
            ("SPOTIFY_REDIRECT_URI", "http://127.0.0.1:9000/cb"),
            ("SPOTIFY_VERIFY_STATE", "true"),
            ("SPOTIFY_USE_PKCE", "1"),
        ]))
        .unwrap();
        assert_eq!(config.redirect_uri, "http://127.0.0.1:9000/cb");
        assert!(config.hardening.state);
        assert!(config.hardening.pkce);
    }

    #[test]
    fn test_from_lookup_rejects_bad_redirect() {
        let err = OAuthConfig::from_lookup(lookup_from(&[
            ("SPOTIFY_CLIENT_ID", "abc"),
            ("SPOTIFY_REDIRECT_URI", "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfig(_)));
    }

    #[test]
    fn test_default_timing() {
        let timing = CallbackTiming::default();
        assert_eq!(timing.redirect_delay, Duration::from_secs(3));
        assert_eq!(timing.settle_timeout, Duration::from_secs(10));
    }
}
