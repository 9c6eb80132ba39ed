use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::{
    artwork::{SampleMessage, SampleRequest},
    color::AccentColor,
    status::{PlaybackStatus, Track},
};

/// What the view should show for the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState<'a> {
    Idle,
    Playing(&'a Track),
}

pub struct LoadedArtwork {
    pub url: String,
    pub image: RgbaImage,
    /// Bumped on every replacement so the view knows to re-upload its texture.
    pub generation: u64,
}

/// Everything the widget knows, owned by the app and only mutated on the UI
/// thread. Worker results come in through [`Self::apply_status`] and
/// [`Self::apply_sample`].
#[derive(Default)]
pub struct NowPlayingState {
    status: Option<PlaybackStatus>,
    accent: Option<AccentColor>,
    artwork: Option<LoadedArtwork>,
    artwork_generation: u64,
    requested_artwork: Option<String>,
    inflight_request: Option<u64>,
    next_request_id: u64,
    metadata_revision: u64,
}

impl NowPlayingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view_state(&self) -> ViewState<'_> {
        match self.status.as_ref().and_then(PlaybackStatus::playing_track) {
            Some(track) => ViewState::Playing(track),
            None => ViewState::Idle,
        }
    }

    pub fn track(&self) -> Option<&Track> {
        self.status.as_ref().and_then(|status| status.track.as_ref())
    }

    pub fn accent(&self) -> Option<AccentColor> {
        self.accent
    }

    pub fn artwork(&self) -> Option<&LoadedArtwork> {
        self.artwork.as_ref()
    }

    /// Changes whenever the artist or title text changes.
    pub fn metadata_revision(&self) -> u64 {
        self.metadata_revision
    }

    /// Replaces the status wholesale. Returns the artwork request to dispatch
    /// when a playing track shows artwork that was not requested yet.
    pub fn apply_status(&mut self, status: PlaybackStatus) -> Option<SampleRequest> {
        let metadata_changed = match (self.track(), status.track.as_ref()) {
            (Some(old), Some(new)) => old.metadata_differs(new),
            (None, None) => false,
            _ => true,
        };
        let was_playing = matches!(self.view_state(), ViewState::Playing(_));

        self.status = Some(status);
        if metadata_changed {
            self.metadata_revision += 1;
        }

        let track = match self.view_state() {
            ViewState::Playing(track) => track.clone(),
            ViewState::Idle => {
                if was_playing {
                    info!("playback stopped");
                }
                return None;
            }
        };

        if metadata_changed || !was_playing {
            info!(title = %track.title, artists = %track.artist_line(), "now playing");
        }

        if self
            .artwork
            .as_ref()
            .is_some_and(|artwork| artwork.url != track.artwork_url)
        {
            self.artwork = None;
        }

        if self.requested_artwork.as_deref() == Some(track.artwork_url.as_str()) {
            return None;
        }

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.requested_artwork = Some(track.artwork_url.clone());
        self.inflight_request = Some(request_id);

        Some(SampleRequest {
            request_id,
            artwork_url: track.artwork_url,
        })
    }

    /// Applies a sampler result if it answers the latest request and the
    /// current track still shows that artwork. Returns whether it was applied.
    pub fn apply_sample(&mut self, message: SampleMessage) -> bool {
        let SampleMessage {
            request_id,
            artwork_url,
            result,
        } = message;

        if self.inflight_request != Some(request_id) {
            debug!(request_id, url = %artwork_url, "discarding superseded artwork result");
            return false;
        }
        self.inflight_request = None;

        let still_current = self
            .track()
            .is_some_and(|track| track.artwork_url == artwork_url);
        if !still_current {
            debug!(url = %artwork_url, "discarding artwork result for a previous track");
            self.requested_artwork = None;
            return false;
        }

        match result {
            Ok(sampled) => {
                if let Some(accent) = sampled.accent {
                    self.accent = Some(accent);
                }
                self.artwork_generation += 1;
                self.artwork = Some(LoadedArtwork {
                    url: artwork_url,
                    image: sampled.image,
                    generation: self.artwork_generation,
                });
                true
            }
            Err(err) => {
                warn!(url = %artwork_url, error = %err, "failed to load artwork");
                self.requested_artwork = None;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{ArtworkError, SampledArtwork};
    use image::Rgba;

    fn track(title: &str, artwork_url: &str) -> Track {
        Track {
            title: title.to_owned(),
            artist_names: vec!["Artist X".to_owned()],
            artwork_url: artwork_url.to_owned(),
        }
    }

    fn playing(title: &str, artwork_url: &str) -> PlaybackStatus {
        PlaybackStatus {
            is_playing: true,
            track: Some(track(title, artwork_url)),
        }
    }

    fn sampled(request: &SampleRequest, accent: AccentColor) -> SampleMessage {
        SampleMessage {
            request_id: request.request_id,
            artwork_url: request.artwork_url.clone(),
            result: Ok(SampledArtwork {
                image: RgbaImage::from_pixel(1, 1, Rgba([accent.r, accent.g, accent.b, 255])),
                accent: Some(accent),
            }),
        }
    }

    #[test]
    fn starts_idle() {
        assert_eq!(NowPlayingState::new().view_state(), ViewState::Idle);
    }

    #[test]
    fn not_playing_is_idle_even_with_a_track() {
        let mut state = NowPlayingState::new();
        let request = state.apply_status(PlaybackStatus {
            is_playing: false,
            track: Some(track("Song A", "a.png")),
        });
        assert_eq!(request, None);
        assert_eq!(state.view_state(), ViewState::Idle);
    }

    #[test]
    fn playing_status_requests_artwork_once() {
        let mut state = NowPlayingState::new();
        let first = state.apply_status(playing("Song A", "a.png")).unwrap();
        assert_eq!(first.artwork_url, "a.png");
        assert!(matches!(state.view_state(), ViewState::Playing(t) if t.title == "Song A"));

        let revision = state.metadata_revision();
        assert_eq!(state.apply_status(playing("Song A", "a.png")), None);
        assert_eq!(state.metadata_revision(), revision);
    }

    #[test]
    fn accent_follows_sample_result() {
        let mut state = NowPlayingState::new();
        let request = state.apply_status(playing("Song A", "a.png")).unwrap();
        let red = AccentColor::from_rgb(200, 0, 0);
        assert!(state.apply_sample(sampled(&request, red)));
        assert_eq!(state.accent(), Some(red));
        assert_eq!(state.artwork().map(|a| a.url.as_str()), Some("a.png"));
    }

    #[test]
    fn stale_sample_never_overwrites_newer_track() {
        let mut state = NowPlayingState::new();
        let old = state.apply_status(playing("Song A", "a.png")).unwrap();
        let new = state.apply_status(playing("Song B", "b.png")).unwrap();

        let blue = AccentColor::from_rgb(0, 0, 200);
        assert!(state.apply_sample(sampled(&new, blue)));

        let red = AccentColor::from_rgb(200, 0, 0);
        assert!(!state.apply_sample(sampled(&old, red)));
        assert_eq!(state.accent(), Some(blue));
        assert_eq!(state.artwork().map(|a| a.url.as_str()), Some("b.png"));
    }

    #[test]
    fn result_for_a_track_that_is_gone_is_dropped_and_rerequested() {
        let mut state = NowPlayingState::new();
        let request = state.apply_status(playing("Song A", "a.png")).unwrap();
        state.apply_status(PlaybackStatus::idle());

        assert!(!state.apply_sample(sampled(&request, AccentColor::from_rgb(1, 2, 3))));
        assert_eq!(state.accent(), None);
        assert!(state.apply_status(playing("Song A", "a.png")).is_some());
    }

    #[test]
    fn failed_sample_keeps_accent_and_retries_next_tick() {
        let mut state = NowPlayingState::new();
        let first = state.apply_status(playing("Song A", "a.png")).unwrap();
        let green = AccentColor::from_rgb(0, 200, 0);
        state.apply_sample(sampled(&first, green));

        let second = state.apply_status(playing("Song B", "b.png")).unwrap();
        assert!(state.artwork().is_none());
        let failed = SampleMessage {
            request_id: second.request_id,
            artwork_url: second.artwork_url.clone(),
            result: Err(ArtworkError::RelativeUrl("b.png".into())),
        };
        assert!(!state.apply_sample(failed));
        assert_eq!(state.accent(), Some(green));

        let retry = state.apply_status(playing("Song B", "b.png")).unwrap();
        assert_eq!(retry.artwork_url, "b.png");
        assert_ne!(retry.request_id, second.request_id);
    }

    #[test]
    fn missing_accent_keeps_previous_color_but_shows_artwork() {
        let mut state = NowPlayingState::new();
        let first = state.apply_status(playing("Song A", "a.png")).unwrap();
        let green = AccentColor::from_rgb(0, 200, 0);
        state.apply_sample(sampled(&first, green));

        let second = state.apply_status(playing("Song B", "b.png")).unwrap();
        let message = SampleMessage {
            request_id: second.request_id,
            artwork_url: second.artwork_url.clone(),
            result: Ok(SampledArtwork {
                image: RgbaImage::new(1, 1),
                accent: None,
            }),
        };
        assert!(state.apply_sample(message));
        assert_eq!(state.accent(), Some(green));
        assert_eq!(state.artwork().map(|a| a.url.as_str()), Some("b.png"));
    }

    #[test]
    fn paused_episode_without_artwork_goes_idle() {
        let mut state = NowPlayingState::new();
        state.apply_status(playing("Song A", "a.png")).unwrap();
        assert!(matches!(state.view_state(), ViewState::Playing(_)));

        let paused = PlaybackStatus::from_json(
            r#"{ "is_playing": false, "item": { "name": "Episode 1", "album": { "images": [] } } }"#,
        )
        .unwrap();
        assert_eq!(state.apply_status(paused), None);
        assert_eq!(state.view_state(), ViewState::Idle);
    }

    #[test]
    fn metadata_revision_tracks_text_changes_only() {
        let mut state = NowPlayingState::new();
        state.apply_status(playing("Song A", "a.png"));
        let revision = state.metadata_revision();

        state.apply_status(playing("Song A", "a-large.png"));
        assert_eq!(state.metadata_revision(), revision);

        state.apply_status(playing("Song B", "a-large.png"));
        assert_eq!(state.metadata_revision(), revision + 1);
    }
}
