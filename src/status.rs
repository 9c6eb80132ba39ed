use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed currently-playing payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload reports playback but has no item")]
    MissingItem,
    #[error("track '{0}' has no album artwork")]
    MissingArtwork(String),
}

/// Snapshot of the endpoint's answer for a single poll tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub track: Option<Track>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub artist_names: Vec<String>,
    pub artwork_url: String,
}

impl Track {
    pub fn artist_line(&self) -> String {
        self.artist_names.join(", ")
    }

    /// True when the rendered text of `other` would differ from this track's.
    pub fn metadata_differs(&self, other: &Track) -> bool {
        self.title != other.title || self.artist_names != other.artist_names
    }
}

impl PlaybackStatus {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn from_json(body: &str) -> Result<Self, PayloadError> {
        let payload: CurrentlyPlayingPayload = serde_json::from_str(body)?;
        payload.try_into()
    }

    pub fn playing_track(&self) -> Option<&Track> {
        if self.is_playing {
            self.track.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentlyPlayingPayload {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    item: Option<ItemPayload>,
}

#[derive(Debug, Deserialize)]
struct ItemPayload {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistPayload>,
    #[serde(default)]
    album: Option<AlbumPayload>,
}

#[derive(Debug, Deserialize)]
struct ArtistPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumPayload {
    #[serde(default)]
    images: Vec<ImagePayload>,
}

#[derive(Debug, Deserialize)]
struct ImagePayload {
    url: String,
}

impl TryFrom<CurrentlyPlayingPayload> for PlaybackStatus {
    type Error = PayloadError;

    fn try_from(value: CurrentlyPlayingPayload) -> Result<Self, Self::Error> {
        // Only a playing item has to be renderable. A paused one may be an
        // episode without album art and still means idle.
        let track = match value.item {
            Some(item) if value.is_playing => Some(item.try_into()?),
            Some(item) => Track::try_from(item).ok(),
            None if value.is_playing => return Err(PayloadError::MissingItem),
            None => None,
        };

        Ok(PlaybackStatus {
            is_playing: value.is_playing,
            track,
        })
    }
}

impl TryFrom<ItemPayload> for Track {
    type Error = PayloadError;

    fn try_from(item: ItemPayload) -> Result<Self, Self::Error> {
        let artwork_url = item
            .album
            .and_then(|album| album.images.into_iter().next())
            .map(|image| image.url)
            .ok_or_else(|| PayloadError::MissingArtwork(item.name.clone()))?;

        Ok(Track {
            title: item.name,
            artist_names: item.artists.into_iter().map(|artist| artist.name).collect(),
            artwork_url,
        })
    }
}
