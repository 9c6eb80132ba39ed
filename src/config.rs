use anyhow::Context;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    time::Duration,
};
use tracing::warn;

use crate::color::{
    ExtractionOptions, DEFAULT_ALPHA_CUTOFF, DEFAULT_DISTANCE, DEFAULT_HUE_DISTANCE,
    DEFAULT_LIGHTNESS_DISTANCE, DEFAULT_PIXELS, DEFAULT_SATURATION_DISTANCE,
};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8888/currently-playing";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 4_000;
pub const DEFAULT_MARQUEE_PERIOD_SECS: f32 = 10.0;
pub const DEFAULT_ARTWORK_SIZE: f32 = 96.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub extraction: ExtractionOptions,
    pub ui: UiConfig,
}

impl Config {
    /// First existing config file, looked up beside the working directory
    /// and then beside the executable.
    pub fn locate() -> Option<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.extend(candidate_paths(&current_dir));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.extend(candidate_paths(dir));
            }
        }

        candidates.into_iter().find(|path| path.exists())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        Ok(doc.into())
    }

    /// Loads the located config, or defaults when there is none.
    pub fn load() -> anyhow::Result<(Self, Option<PathBuf>)> {
        match Self::locate() {
            Some(path) => Ok((Self::load_from(&path)?, Some(path))),
            None => Ok((Config::default(), None)),
        }
    }
}

fn candidate_paths(dir: &Path) -> [PathBuf; 3] {
    [
        dir.join("config.toml"),
        dir.join("config").join("config.toml"),
        dir.join("config").join("nowplaying.toml"),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_owned(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiConfig {
    pub artwork_size: f32,
    pub marquee_period: Duration,
    pub window_size: [f32; 2],
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            artwork_size: DEFAULT_ARTWORK_SIZE,
            marquee_period: Duration::from_secs_f32(DEFAULT_MARQUEE_PERIOD_SECS),
            window_size: [420.0, 128.0],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    endpoint: EndpointSection,
    #[serde(default)]
    extraction: ExtractionSection,
    #[serde(default)]
    ui: UiSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let poll_interval_ms = value
            .endpoint
            .poll_interval_ms
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .clamp(250, 3_600_000);
        let request_timeout_ms = value
            .endpoint
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS)
            .clamp(100, 60_000);

        let endpoint = EndpointConfig {
            url: value
                .endpoint
                .url
                .map(|url| url.trim().to_owned())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
        };

        let section = value.extraction;
        let extraction = ExtractionOptions {
            pixels: section.pixels.unwrap_or(DEFAULT_PIXELS).clamp(1, 4_000_000),
            distance: unit(section.distance, DEFAULT_DISTANCE),
            alpha_cutoff: section.alpha_cutoff.unwrap_or(DEFAULT_ALPHA_CUTOFF),
            saturation_distance: unit(section.saturation_distance, DEFAULT_SATURATION_DISTANCE),
            lightness_distance: unit(section.lightness_distance, DEFAULT_LIGHTNESS_DISTANCE),
            hue_distance: unit(section.hue_distance, DEFAULT_HUE_DISTANCE),
        };

        let defaults = UiConfig::default();
        let ui = UiConfig {
            artwork_size: value
                .ui
                .artwork_size
                .unwrap_or(DEFAULT_ARTWORK_SIZE)
                .clamp(16.0, 1024.0),
            marquee_period: Duration::from_secs_f32(
                value
                    .ui
                    .marquee_period_secs
                    .unwrap_or(DEFAULT_MARQUEE_PERIOD_SECS)
                    .clamp(1.0, 120.0),
            ),
            window_size: [
                value
                    .ui
                    .window_width
                    .unwrap_or(defaults.window_size[0])
                    .max(120.0),
                value
                    .ui
                    .window_height
                    .unwrap_or(defaults.window_size[1])
                    .max(48.0),
            ],
        };

        Config {
            endpoint,
            extraction,
            ui,
        }
    }
}

fn unit(value: Option<f32>, default: f32) -> f32 {
    value
        .filter(|v| v.is_finite())
        .unwrap_or(default)
        .clamp(0.0, 1.0)
}

#[derive(Debug, Default, Deserialize)]
struct EndpointSection {
    url: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionSection {
    pixels: Option<usize>,
    distance: Option<f32>,
    alpha_cutoff: Option<u8>,
    saturation_distance: Option<f32>,
    lightness_distance: Option<f32>,
    hue_distance: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct UiSection {
    artwork_size: Option<f32>,
    marquee_period_secs: Option<f32>,
    window_width: Option<f32>,
    window_height: Option<f32>,
}

/// Watches the directory holding the config file, since editors often
/// replace the file instead of writing it in place.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    changes_rx: Receiver<notify::Result<notify::Event>>,
}

impl ConfigWatcher {
    pub fn watch(path: &Path) -> anyhow::Result<Self> {
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            _watcher: watcher,
            changes_rx: rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drains pending events; true when any of them touched the config file.
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.changes_rx.try_recv() {
            match event {
                Ok(evt) => {
                    if !evt.kind.is_access()
                        && evt
                            .paths
                            .iter()
                            .any(|p| p.file_name() == self.path.file_name())
                    {
                        changed = true;
                    }
                }
                Err(err) => warn!(error = %err, "config watcher error"),
            }
        }
        changed
    }
}
