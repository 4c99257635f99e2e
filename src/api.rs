//! Typed calls against the Spotify Web API resource endpoints
use crate::error::{AuthError, Result};
use crate::models::{Library, Page, Playlist, PlaylistItem, SavedTrack, Track, User};
use crate::oauth::AuthClient;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_LIMIT: u32 = 20;
pub const DEFAULT_PLAYLIST_TRACKS_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 50;

/// Affinity window for top items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeRange {
    /// Roughly the last four weeks
    ShortTerm,
    /// Roughly the last six months
    #[default]
    MediumTerm,
    /// Several years of history
    LongTerm,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "short_term" | "short" => Ok(TimeRange::ShortTerm),
            "medium_term" | "medium" => Ok(TimeRange::MediumTerm),
            "long_term" | "long" => Ok(TimeRange::LongTerm),
            other => Err(format!(
                "unknown time range '{}', expected short_term, medium_term or long_term",
                other
            )),
        }
    }
}

/// Resource API facade over an [`AuthClient`]
#[derive(Clone)]
pub struct SpotifyApi {
    client: Arc<AuthClient>,
}

impl SpotifyApi {
    pub fn new(client: Arc<AuthClient>) -> Self {
        Self { client }
    }

    /// Profile of the signed-in user
    pub async fn current_user(&self) -> Result<User> {
        self.client.authorized_get("/me", &[]).await
    }

    pub async fn playlists(&self, limit: u32) -> Result<Page<Playlist>> {
        self.client
            .authorized_get("/me/playlists", &[limit_param(limit)])
            .await
    }

    pub async fn top_tracks(&self, limit: u32, time_range: TimeRange) -> Result<Page<Track>> {
        self.client
            .authorized_get(
                "/me/top/tracks",
                &[
                    limit_param(limit),
                    ("time_range", time_range.as_str().to_string()),
                ],
            )
            .await
    }

    /// Liked Songs
    pub async fn saved_tracks(&self, limit: u32) -> Result<Page<SavedTrack>> {
        self.client
            .authorized_get("/me/tracks", &[limit_param(limit)])
            .await
    }

    pub async fn playlist_tracks(&self, playlist_id: &str, limit: u32) -> Result<Page<PlaylistItem>> {
        validate_id(playlist_id)?;
        self.client
            .authorized_get(
                &format!("/playlists/{}/tracks", playlist_id),
                &[limit_param(limit)],
            )
            .await
    }

    /// Playlists, top tracks and Liked Songs, fetched concurrently
    ///
    /// Fails as a whole on the first error.
    pub async fn library(&self, limit: u32) -> Result<Library> {
        let (playlists, top_tracks, saved_tracks) = tokio::try_join!(
            self.playlists(limit),
            self.top_tracks(limit, TimeRange::default()),
            self.saved_tracks(limit)
        )?;

        Ok(Library {
            playlists: playlists.items,
            top_tracks: top_tracks.items,
            saved_tracks: saved_tracks.items.into_iter().map(|saved| saved.track).collect(),
        })
    }
}

fn limit_param(limit: u32) -> (&'static str, String) {
    ("limit", limit.clamp(1, MAX_LIMIT).to_string())
}

/// Spotify IDs are base62; anything else would alter the request path.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AuthError::InvalidId(id.to_string()));
    }
    Ok(())
}
