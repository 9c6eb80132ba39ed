use std::{
    path::PathBuf,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    time::Duration,
};

use eframe::egui;
use tracing::{error, info, warn};

use crate::{
    artwork::{
        ArtworkError, ArtworkFetcher, HttpArtworkFetcher, ImageColorSampler, SampleMessage,
    },
    config::{Config, ConfigWatcher},
    poller::{HttpStatusSource, PlaybackPoller, StatusSource},
    state::NowPlayingState,
    status::PlaybackStatus,
    view::NowPlayingView,
};

const IDLE_REPAINT: Duration = Duration::from_millis(500);

pub struct App {
    config: Config,
    state: NowPlayingState,
    view: NowPlayingView,
    poller: Option<PlaybackPoller>,
    status_rx: Option<Receiver<PlaybackStatus>>,
    sampler: ImageColorSampler,
    sample_tx: Sender<SampleMessage>,
    sample_rx: Receiver<SampleMessage>,
    config_watcher: Option<ConfigWatcher>,
    egui_ctx: egui::Context,
}

impl App {
    pub fn new(cc: &eframe::CreationContext<'_>, config: Config, config_path: Option<PathBuf>) -> Self {
        let egui_ctx = cc.egui_ctx.clone();
        let sampler = ImageColorSampler::new(artwork_fetcher(&config), config.extraction.clone());
        let mut app = Self::with_sampler(egui_ctx, config, sampler);

        app.config_watcher = config_path.and_then(|path| match ConfigWatcher::watch(&path) {
            Ok(watcher) => {
                info!(path = %path.display(), "watching config for changes");
                Some(watcher)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config hot reload unavailable");
                None
            }
        });

        match HttpStatusSource::new(
            app.config.endpoint.url.clone(),
            app.config.endpoint.request_timeout,
        ) {
            Ok(source) => app.start_polling(source),
            Err(err) => error!(error = %err, "failed to build status client"),
        }

        app
    }

    /// App without a running poller; [`Self::start_polling`] attaches one.
    pub fn with_sampler(egui_ctx: egui::Context, config: Config, sampler: ImageColorSampler) -> Self {
        let (sample_tx, sample_rx) = mpsc::channel();
        Self {
            config,
            state: NowPlayingState::new(),
            view: NowPlayingView::new(),
            poller: None,
            status_rx: None,
            sampler,
            sample_tx,
            sample_rx,
            config_watcher: None,
            egui_ctx,
        }
    }

    pub fn state(&self) -> &NowPlayingState {
        &self.state
    }

    /// Replaces any running poller with one reading from `source`.
    pub fn start_polling<S: StatusSource>(&mut self, source: S) {
        self.stop_polling();
        let ctx = self.egui_ctx.clone();
        let (poller, rx) =
            PlaybackPoller::spawn(source, self.config.endpoint.poll_interval, move || {
                ctx.request_repaint()
            });
        self.poller = Some(poller);
        self.status_rx = Some(rx);
    }

    pub fn stop_polling(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
        self.status_rx = None;
    }

    /// Moves worker results into the state. Returns true if anything changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;

        let mut statuses = Vec::new();
        let mut disconnected = false;
        if let Some(rx) = self.status_rx.as_ref() {
            loop {
                match rx.try_recv() {
                    Ok(status) => statuses.push(status),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            warn!("status channel closed");
            self.poller = None;
            self.status_rx = None;
        }

        for status in statuses {
            changed = true;
            if let Some(request) = self.state.apply_status(status) {
                let ctx = self.egui_ctx.clone();
                self.sampler
                    .spawn(request, self.sample_tx.clone(), move || ctx.request_repaint());
            }
        }

        while let Ok(message) = self.sample_rx.try_recv() {
            changed |= self.state.apply_sample(message);
        }

        changed
    }

    fn maintain_config_watcher(&mut self) {
        let Some(watcher) = self.config_watcher.as_ref() else {
            return;
        };
        if !watcher.poll_changed() {
            return;
        }

        let path = watcher.path().to_path_buf();
        match Config::load_from(&path) {
            Ok(config) => self.apply_config(config),
            Err(err) => warn!(path = %path.display(), error = %format!("{err:#}"), "keeping previous config"),
        }
    }

    fn apply_config(&mut self, config: Config) {
        if config == self.config {
            return;
        }
        info!("config reloaded");

        let endpoint_changed = config.endpoint != self.config.endpoint;
        if config.ui.window_size != self.config.ui.window_size {
            let [width, height] = config.ui.window_size;
            self.egui_ctx
                .send_viewport_cmd(egui::ViewportCommand::InnerSize(egui::vec2(width, height)));
        }
        self.sampler.set_options(config.extraction.clone());
        if endpoint_changed {
            self.sampler.set_fetcher(artwork_fetcher(&config));
        }
        self.config = config;

        if endpoint_changed {
            match HttpStatusSource::new(
                self.config.endpoint.url.clone(),
                self.config.endpoint.request_timeout,
            ) {
                Ok(source) => self.start_polling(source),
                Err(err) => error!(error = %err, "failed to rebuild status client"),
            }
        }
    }

    fn desired_repaint_interval(&self) -> Duration {
        self.view
            .repaint_after(&self.state)
            .unwrap_or(IDLE_REPAINT)
    }
}

fn artwork_fetcher(config: &Config) -> Arc<dyn ArtworkFetcher> {
    match HttpArtworkFetcher::new(Some(&config.endpoint.url), config.endpoint.request_timeout) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(err) => {
            error!(error = %err, "failed to build artwork client");
            Arc::new(UnavailableFetcher(err.to_string()))
        }
    }
}

struct UnavailableFetcher(String);

impl ArtworkFetcher for UnavailableFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ArtworkError> {
        Err(ArtworkError::Unavailable {
            url: url.to_owned(),
            reason: self.0.clone(),
        })
    }
}

impl eframe::App for App {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        egui::Rgba::TRANSPARENT.to_array()
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.maintain_config_watcher();
        self.pump();

        let mut panel_frame = egui::Frame::central_panel(&ctx.style());
        panel_frame.fill = egui::Color32::TRANSPARENT;

        egui::CentralPanel::default()
            .frame(panel_frame)
            .show(ctx, |ui| {
                self.view.show(ui, &self.state, &self.config.ui);
            });

        ctx.request_repaint_after(self.desired_repaint_interval());
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.stop_polling();
    }
}
