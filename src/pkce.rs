//! Optional authorization hardening: anti-forgery state and PKCE
//! RFC 7636: https://tools.ietf.org/html/rfc7636
use crate::storage::KeyValueStore;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

pub const STATE_KEY: &str = "spotify_auth_state";
pub const CODE_VERIFIER_KEY: &str = "spotify_code_verifier";

/// PKCE challenge pair containing code verifier and code challenge
#[derive(Debug, Clone)]
pub struct Pkce {
    code_verifier: String,
    code_challenge: String,
}

impl Pkce {
    /// Generate a new PKCE challenge pair from 32 random bytes
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        Self::from_verifier(URL_SAFE_NO_PAD.encode(random_bytes))
    }

    /// Derive the S256 challenge for an existing verifier
    pub fn from_verifier(code_verifier: String) -> Self {
        let hash = Sha256::digest(code_verifier.as_bytes());
        let code_challenge = URL_SAFE_NO_PAD.encode(hash);

        Self {
            code_verifier,
            code_challenge,
        }
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn code_challenge(&self) -> &str {
        &self.code_challenge
    }

    pub fn code_challenge_method() -> &'static str {
        "S256"
    }
}

/// Random anti-forgery value for the `state` parameter
pub fn generate_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Values that must survive the trip to the authorization server
///
/// The login navigation leaves the process, so they are persisted and
/// consumed exactly once when the redirect comes back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub state: Option<String>,
    pub code_verifier: Option<String>,
}

impl PendingAuthorization {
    pub fn save(&self, storage: &dyn KeyValueStore) -> Result<(), String> {
        for (key, value) in [
            (STATE_KEY, &self.state),
            (CODE_VERIFIER_KEY, &self.code_verifier),
        ] {
            match value {
                Some(value) => storage.set(key, value)?,
                None => storage.remove(key)?,
            }
        }
        Ok(())
    }

    pub fn take_state(storage: &dyn KeyValueStore) -> Result<Option<String>, String> {
        take(storage, STATE_KEY)
    }

    pub fn take_code_verifier(storage: &dyn KeyValueStore) -> Result<Option<String>, String> {
        take(storage, CODE_VERIFIER_KEY)
    }
}

fn take(storage: &dyn KeyValueStore, key: &str) -> Result<Option<String>, String> {
    let value = storage.get(key)?;
    if value.is_some() {
        storage.remove(key)?;
    }
    Ok(value)
}
