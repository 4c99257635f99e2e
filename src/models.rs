//! Spotify Web API payloads used by the session and the CLI
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

const OPEN_SPOTIFY_URL: &str = "https://open.spotify.com";

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Followers {
    #[serde(default)]
    pub total: u32,
}

/// Profile of the current user (`GET /me`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub followers: Followers,
    #[serde(default)]
    pub country: Option<String>,
}

impl User {
    /// Display name, falling back to the user id
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }

    pub fn follower_count(&self) -> u32 {
        self.followers.total
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.images.first().map(|image| image.url.as_str())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id)?;
        if let Some(email) = &self.email {
            write!(f, " <{}>", email)?;
        }
        if let Some(country) = &self.country {
            write!(f, " [{}]", country)?;
        }
        write!(f, " - {} followers", self.follower_count())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackCount {
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracks: TrackCount,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: Owner,
    #[serde(default)]
    pub public: Option<bool>,
}

impl Playlist {
    pub fn open_url(&self) -> String {
        playlist_url(&self.id)
    }
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = self
            .owner
            .display_name
            .as_deref()
            .or(self.owner.id.as_deref())
            .unwrap_or("unknown");
        write!(
            f,
            "{} ({} tracks) by {}",
            self.name, self.tracks.total, owner
        )
    }
}

/// Public web player URL for a playlist
pub fn playlist_url(playlist_id: &str) -> String {
    format!("{}/playlist/{}", OPEN_SPOTIFY_URL, playlist_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// `None` for local files
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<Artist>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub album: Album,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_urls: ExternalUrls,
}

impl Track {
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn duration(&self) -> String {
        format_duration(self.duration_ms)
    }

    /// Preview clip if Spotify offers one, else the track page
    pub fn listen_url(&self) -> Option<&str> {
        self.preview_url
            .as_deref()
            .or(self.external_urls.spotify.as_deref())
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.name, self.artist_names(), self.duration())
    }
}

/// `m:ss` rendering of a duration in milliseconds
pub fn format_duration(duration_ms: u64) -> String {
    let minutes = duration_ms / 60_000;
    let seconds = (duration_ms % 60_000) / 1000;
    format!("{}:{:02}", minutes, seconds)
}

/// Entry of the user's Liked Songs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTrack {
    #[serde(default)]
    pub added_at: Option<String>,
    pub track: Track,
}

/// Entry of a playlist; the track is `None` when it was removed from Spotify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub track: Option<Track>,
}

/// One page of a paged collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Everything the library overview shows at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Library {
    pub playlists: Vec<Playlist>,
    pub top_tracks: Vec<Track>,
    pub saved_tracks: Vec<Track>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn track(name: &str, artists: &[&str], duration_ms: u64) -> Track {
        Track {
            id: Some("t1".to_string()),
            name: name.to_string(),
            artists: artists
                .iter()
                .map(|a| Artist {
                    id: None,
                    name: a.to_string(),
                })
                .collect(),
            album: Album::default(),
            duration_ms,
            preview_url: None,
            external_urls: ExternalUrls::default(),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(59_999), "0:59");
        assert_eq!(format_duration(60_000), "1:00");
        assert_eq!(format_duration(225_000), "3:45");
        assert_eq!(format_duration(3_605_000), "60:05");
    }

    #[test]
    fn test_track_display() {
        let t = track("Hey Jude", &["The Beatles"], 431_333);
        assert_eq!(t.to_string(), "Hey Jude - The Beatles (7:11)");

        let duet = track("Under Pressure", &["Queen", "David Bowie"], 248_000);
        assert_eq!(duet.artist_names(), "Queen, David Bowie");
    }

    #[test]
    fn test_listen_url_prefers_preview() {
        let mut t = track("Song", &["Artist"], 1000);
        assert_eq!(t.listen_url(), None);

        t.external_urls.spotify = Some("https://open.spotify.com/track/t1".to_string());
        assert_eq!(t.listen_url(), Some("https://open.spotify.com/track/t1"));

        t.preview_url = Some("https://p.scdn.co/mp3-preview/abc".to_string());
        assert_eq!(t.listen_url(), Some("https://p.scdn.co/mp3-preview/abc"));
    }

    #[test]
    fn test_user_profile_deserialization() {
        let user: User = serde_json::from_value(json!({
            "id": "wizzler",
            "display_name": "JM Wizzler",
            "email": "email@example.com",
            "images": [{ "url": "https://i.scdn.co/image/abc", "height": 300, "width": 300 }],
            "followers": { "href": null, "total": 3829 },
            "country": "SE",
            "product": "premium"
        }))
        .unwrap();

        assert_eq!(user.name(), "JM Wizzler");
        assert_eq!(user.follower_count(), 3829);
        assert_eq!(user.avatar_url(), Some("https://i.scdn.co/image/abc"));
        assert_eq!(
            user.to_string(),
            "JM Wizzler (wizzler) <email@example.com> [SE] - 3829 followers"
        );
    }

    #[test]
    fn test_user_without_display_name() {
        let user: User = serde_json::from_value(json!({
            "id": "anon",
            "display_name": null,
            "images": null,
            "followers": { "total": 0 }
        }))
        .unwrap();

        assert_eq!(user.name(), "anon");
        assert!(user.images.is_empty());
        assert_eq!(user.avatar_url(), None);
    }

    #[test]
    fn test_playlist_display_and_url() {
        let playlist: Playlist = serde_json::from_value(json!({
            "id": "37i9dQZF1DXcBWIGoYBM5M",
            "name": "Today's Top Hits",
            "description": null,
            "images": null,
            "tracks": { "total": 50 },
            "owner": { "id": "spotify", "display_name": "Spotify" },
            "public": true
        }))
        .unwrap();

        assert_eq!(playlist.to_string(), "Today's Top Hits (50 tracks) by Spotify");
        assert_eq!(
            playlist.open_url(),
            "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"
        );
    }

    #[test]
    fn test_page_of_playlist_items_with_removed_track() {
        let page: Page<PlaylistItem> = serde_json::from_value(json!({
            "items": [
                { "added_at": "2024-01-01T00:00:00Z", "track": null },
                { "track": { "id": null, "name": "Local file", "artists": [], "duration_ms": 1000 } }
            ],
            "total": 2,
            "limit": 50,
            "offset": 0,
            "next": null
        }))
        .unwrap();

        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].track.is_none());
        let local = page.items[1].track.as_ref().unwrap();
        assert_eq!(local.id, None);
        assert_eq!(local.to_string(), "Local file -  (0:01)");
    }
}
