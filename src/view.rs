use std::time::{Duration, Instant};

use eframe::egui::{
    self, Color32, CornerRadius, FontId, Rect, Sense, TextureHandle, TextureOptions,
};

use crate::{
    artwork::to_color_image,
    config::UiConfig,
    state::{NowPlayingState, ViewState},
};

const ARTWORK_GAP: f32 = 12.0;
const LINE_GAP: f32 = 4.0;
const MARQUEE_GAP: f32 = 48.0;
const ARTIST_FONT_SIZE: f32 = 20.0;
const TITLE_FONT_SIZE: f32 = 16.0;
const TITLE_COLOR: Color32 = Color32::from_rgb(235, 235, 235);
const FALLBACK_ACCENT: Color32 = Color32::WHITE;
const PLACEHOLDER_FILL: Color32 = Color32::from_rgba_premultiplied(40, 40, 40, 200);
const MARQUEE_FRAME: Duration = Duration::from_millis(16);

/// A line scrolls only when its text is strictly wider than its container.
pub fn needs_scroll(text_width: f32, container_width: f32) -> bool {
    text_width > container_width
}

/// Horizontal offset of a looping marquee after `elapsed`, moving `travel`
/// points once per `period` at constant speed.
pub fn marquee_offset(elapsed: Duration, period: Duration, travel: f32) -> f32 {
    let period = period.as_secs_f32();
    if period <= f32::EPSILON || travel <= 0.0 {
        return 0.0;
    }
    let phase = (elapsed.as_secs_f32() % period) / period;
    phase * travel
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ScrollState {
    pub needs_scroll: bool,
}

impl ScrollState {
    pub fn measure(&mut self, text_width: f32, container_width: f32) {
        self.needs_scroll = needs_scroll(text_width, container_width);
    }
}

/// Renders the state and owns the per-line scroll decisions plus the
/// artwork texture.
pub struct NowPlayingView {
    artist: ScrollState,
    title: ScrollState,
    measured: Option<(u64, f32)>,
    scroll_started: Instant,
    texture: Option<(u64, TextureHandle)>,
}

impl Default for NowPlayingView {
    fn default() -> Self {
        Self {
            artist: ScrollState::default(),
            title: ScrollState::default(),
            measured: None,
            scroll_started: Instant::now(),
            texture: None,
        }
    }
}

impl NowPlayingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artist_scroll(&self) -> ScrollState {
        self.artist
    }

    pub fn title_scroll(&self) -> ScrollState {
        self.title
    }

    pub fn is_scrolling(&self) -> bool {
        self.artist.needs_scroll || self.title.needs_scroll
    }

    /// Re-measures both lines when the text or the column width changed.
    /// Returns true when a new measurement was taken.
    pub fn remeasure(
        &mut self,
        revision: u64,
        artist_width: f32,
        title_width: f32,
        container_width: f32,
    ) -> bool {
        let key = (revision, container_width);
        if self.measured == Some(key) {
            return false;
        }

        let was_scrolling = self.is_scrolling();
        self.artist.measure(artist_width, container_width);
        self.title.measure(title_width, container_width);
        if self.is_scrolling() && (!was_scrolling || self.measured.map(|m| m.0) != Some(revision)) {
            self.scroll_started = Instant::now();
        }
        self.measured = Some(key);
        true
    }

    /// How soon the next frame is needed for the view alone.
    pub fn repaint_after(&self, state: &NowPlayingState) -> Option<Duration> {
        match state.view_state() {
            ViewState::Playing(_) if self.is_scrolling() => Some(MARQUEE_FRAME),
            _ => None,
        }
    }

    pub fn show(&mut self, ui: &mut egui::Ui, state: &NowPlayingState, config: &UiConfig) {
        let track = match state.view_state() {
            ViewState::Idle => return,
            ViewState::Playing(track) => track,
        };

        self.sync_texture(ui.ctx(), state);

        let accent = state
            .accent()
            .map(|color| color.to_color32())
            .unwrap_or(FALLBACK_ACCENT);
        let artist_galley = ui.painter().layout_no_wrap(
            track.artist_line(),
            FontId::proportional(ARTIST_FONT_SIZE),
            accent,
        );
        let title_galley = ui.painter().layout_no_wrap(
            track.title.clone(),
            FontId::proportional(TITLE_FONT_SIZE),
            TITLE_COLOR,
        );

        ui.horizontal(|row| {
            self.paint_artwork(row, config.artwork_size);
            row.add_space(ARTWORK_GAP);

            let column_width = row.available_width().max(1.0);
            self.remeasure(
                state.metadata_revision(),
                artist_galley.size().x,
                title_galley.size().x,
                column_width,
            );

            let elapsed = self.scroll_started.elapsed();
            let period = config.marquee_period;
            let (artist_scroll, title_scroll) = (self.artist, self.title);

            row.vertical(|column| {
                column.spacing_mut().item_spacing.y = LINE_GAP;
                paint_line(
                    column,
                    artist_galley,
                    column_width,
                    artist_scroll,
                    elapsed,
                    period,
                );
                paint_line(
                    column,
                    title_galley,
                    column_width,
                    title_scroll,
                    elapsed,
                    period,
                );
            });
        });
    }

    fn sync_texture(&mut self, ctx: &egui::Context, state: &NowPlayingState) {
        let Some(artwork) = state.artwork() else {
            self.texture = None;
            return;
        };

        if self.texture.as_ref().map(|(generation, _)| *generation) == Some(artwork.generation) {
            return;
        }

        let texture = ctx.load_texture(
            "now_playing.artwork",
            to_color_image(&artwork.image),
            TextureOptions::LINEAR,
        );
        self.texture = Some((artwork.generation, texture));
    }

    fn paint_artwork(&self, ui: &mut egui::Ui, side: f32) {
        let (rect, _) = ui.allocate_exact_size(egui::vec2(side, side), Sense::hover());
        let rounding = CornerRadius::same(6);

        match &self.texture {
            Some((_, texture)) => {
                let uv = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
                egui::Image::new((texture.id(), rect.size()))
                    .uv(uv)
                    .corner_radius(rounding)
                    .paint_at(ui, rect);
            }
            None => {
                ui.painter().rect_filled(rect, rounding, PLACEHOLDER_FILL);
            }
        }
    }
}

fn paint_line(
    ui: &mut egui::Ui,
    galley: std::sync::Arc<egui::Galley>,
    width: f32,
    scroll: ScrollState,
    elapsed: Duration,
    period: Duration,
) {
    let size = egui::vec2(width, galley.size().y);
    let (rect, _) = ui.allocate_exact_size(size, Sense::hover());
    let painter = ui.painter_at(rect);

    if !scroll.needs_scroll {
        painter.galley(rect.min, galley, Color32::WHITE);
        return;
    }

    let travel = galley.size().x + MARQUEE_GAP;
    let offset = marquee_offset(elapsed, period, travel);
    let first = rect.min - egui::vec2(offset, 0.0);
    painter.galley(first, galley.clone(), Color32::WHITE);
    painter.galley(first + egui::vec2(travel, 0.0), galley, Color32::WHITE);
}
