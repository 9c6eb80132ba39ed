use std::{
    sync::{mpsc::Sender, Arc},
    thread,
    time::Duration,
};

use eframe::egui::ColorImage;
use image::RgbaImage;
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{debug, warn};
use url::{ParseError, Url};

use crate::color::{dominant_color, AccentColor, ExtractionOptions};

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("artwork request for '{url}' failed: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
    #[error("no artwork client for '{url}': {reason}")]
    Unavailable { url: String, reason: String },
    #[error("artwork url '{0}' is relative and no base url is known")]
    RelativeUrl(String),
    #[error("artwork request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode artwork: {0}")]
    Decode(#[from] image::ImageError),
}

/// Source of raw artwork bytes.
pub trait ArtworkFetcher: Send + Sync {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ArtworkError>;
}

pub struct HttpArtworkFetcher {
    client: Client,
    base: Option<Url>,
}

impl HttpArtworkFetcher {
    /// `base` resolves artwork paths the endpoint hands out relative to itself.
    pub fn new(base: Option<&str>, timeout: Duration) -> Result<Self, ArtworkError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base = base.and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(base = raw, error = %err, "ignoring unparsable artwork base url");
                None
            }
        });
        Ok(Self { client, base })
    }

    fn resolve(&self, url: &str) -> Result<Url, ArtworkError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(ParseError::RelativeUrlWithoutBase) => self
                .base
                .as_ref()
                .ok_or_else(|| ArtworkError::RelativeUrl(url.to_owned()))?
                .join(url)
                .map_err(|_| ArtworkError::RelativeUrl(url.to_owned())),
            Err(_) => Err(ArtworkError::RelativeUrl(url.to_owned())),
        }
    }
}

impl ArtworkFetcher for HttpArtworkFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ArtworkError> {
        let resolved = self.resolve(url)?;
        let response = self
            .client
            .get(resolved)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|source| ArtworkError::Request {
                url: url.to_owned(),
                source,
            })?;
        Ok(response.bytes()?.to_vec())
    }
}

pub fn decode_artwork(bytes: &[u8]) -> Result<RgbaImage, ArtworkError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

pub fn to_color_image(image: &RgbaImage) -> ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, image.as_raw())
}

/// Decoded artwork plus the accent derived from it. `accent` is `None` when
/// no pixel was opaque enough to count.
pub struct SampledArtwork {
    pub image: RgbaImage,
    pub accent: Option<AccentColor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRequest {
    pub request_id: u64,
    pub artwork_url: String,
}

pub struct SampleMessage {
    pub request_id: u64,
    pub artwork_url: String,
    pub result: Result<SampledArtwork, ArtworkError>,
}

#[derive(Clone)]
pub struct ImageColorSampler {
    fetcher: Arc<dyn ArtworkFetcher>,
    options: ExtractionOptions,
}

impl ImageColorSampler {
    pub fn new(fetcher: Arc<dyn ArtworkFetcher>, options: ExtractionOptions) -> Self {
        Self { fetcher, options }
    }

    pub fn set_options(&mut self, options: ExtractionOptions) {
        self.options = options;
    }

    pub fn set_fetcher(&mut self, fetcher: Arc<dyn ArtworkFetcher>) {
        self.fetcher = fetcher;
    }

    /// Fetches and decodes the artwork, then picks its dominant color.
    /// Only fetching and decoding fail; an image without qualifying pixels
    /// yields `accent: None`.
    pub fn sample_dominant_color(&self, url: &str) -> Result<SampledArtwork, ArtworkError> {
        let bytes = self.fetcher.fetch_bytes(url)?;
        let image = decode_artwork(&bytes)?;
        let accent = dominant_color(&image, &self.options);

        match accent {
            Some(color) => debug!(url, accent = %color.hex(), "sampled artwork"),
            None => warn!(url, "artwork has no qualifying color"),
        }

        Ok(SampledArtwork { image, accent })
    }

    /// Runs [`Self::sample_dominant_color`] on a worker thread and reports
    /// back over `tx`, tagged with the request it answers.
    pub fn spawn<F>(&self, request: SampleRequest, tx: Sender<SampleMessage>, wake: F)
    where
        F: Fn() + Send + 'static,
    {
        let sampler = self.clone();
        thread::spawn(move || {
            let SampleRequest {
                request_id,
                artwork_url,
            } = request;
            let result = sampler.sample_dominant_color(&artwork_url);
            if tx
                .send(SampleMessage {
                    request_id,
                    artwork_url,
                    result,
                })
                .is_ok()
            {
                wake();
            }
        });
    }
}
