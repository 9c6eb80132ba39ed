use std::cmp::Reverse;

use eframe::egui;
use image::RgbaImage;

pub const DEFAULT_PIXELS: usize = 64_000;
pub const DEFAULT_DISTANCE: f32 = 0.22;
pub const DEFAULT_ALPHA_CUTOFF: u8 = 250;
pub const DEFAULT_SATURATION_DISTANCE: f32 = 0.2;
pub const DEFAULT_LIGHTNESS_DISTANCE: f32 = 0.2;
pub const DEFAULT_HUE_DISTANCE: f32 = 1.0 / 12.0;

// 4 bits per channel.
const BUCKET_SHIFT: u8 = 4;
const BUCKET_COUNT: usize = 1 << (3 * (8 - BUCKET_SHIFT));
const MAX_RGB_DISTANCE: f32 = 441.673; // 255 * sqrt(3)

/// Tuning knobs for [`extract_colors`].
///
/// `distance` and the three HSL distances are all expressed in `0.0..=1.0`.
/// A pixel qualifies for sampling only when its alpha is strictly greater
/// than `alpha_cutoff`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOptions {
    pub pixels: usize,
    pub distance: f32,
    pub alpha_cutoff: u8,
    pub saturation_distance: f32,
    pub lightness_distance: f32,
    pub hue_distance: f32,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            pixels: DEFAULT_PIXELS,
            distance: DEFAULT_DISTANCE,
            alpha_cutoff: DEFAULT_ALPHA_CUTOFF,
            saturation_distance: DEFAULT_SATURATION_DISTANCE,
            lightness_distance: DEFAULT_LIGHTNESS_DISTANCE,
            hue_distance: DEFAULT_HUE_DISTANCE,
        }
    }
}

impl ExtractionOptions {
    pub fn accepts(&self, pixel: [u8; 4]) -> bool {
        pixel[3] > self.alpha_cutoff
    }

    fn similar(&self, a: &Hsl, b: &Hsl) -> bool {
        hue_gap(a.hue, b.hue) < self.hue_distance
            && (a.saturation - b.saturation).abs() < self.saturation_distance
            && (a.lightness - b.lightness).abs() < self.lightness_distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccentColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl AccentColor {
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_color32(self) -> egui::Color32 {
        egui::Color32::from_rgb(self.r, self.g, self.b)
    }

    fn to_hsl(self) -> Hsl {
        rgb_to_hsl([self.r as f32, self.g as f32, self.b as f32])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedColor {
    pub color: AccentColor,
    /// Share of the qualifying samples represented by this color.
    pub area: f32,
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Hsl {
    hue: f32,
    saturation: f32,
    lightness: f32,
}

#[derive(Clone, Copy, Default)]
struct Cluster {
    sum: [u64; 3],
    count: usize,
}

impl Cluster {
    fn add(&mut self, sample: &[u8; 3]) {
        for channel in 0..3 {
            self.sum[channel] += u64::from(sample[channel]);
        }
        self.count += 1;
    }

    fn absorb(&mut self, other: &Cluster) {
        for channel in 0..3 {
            self.sum[channel] += other.sum[channel];
        }
        self.count += other.count;
    }

    fn centroid(&self) -> [f32; 3] {
        let count = self.count.max(1) as f32;
        [
            self.sum[0] as f32 / count,
            self.sum[1] as f32 / count,
            self.sum[2] as f32 / count,
        ]
    }
}

struct Swatch {
    color: AccentColor,
    hsl: Hsl,
    count: usize,
}

impl From<Cluster> for Swatch {
    fn from(cluster: Cluster) -> Self {
        let color = color_from_centroid(cluster.centroid());
        Self {
            color,
            hsl: color.to_hsl(),
            count: cluster.count,
        }
    }
}

/// Reads at most `options.pixels` pixels with a uniform stride and keeps
/// the ones the alpha validator accepts. Each row shifts the stride by one
/// column so widths divisible by the step don't sample the same columns.
fn sample_pixels(image: &RgbaImage, options: &ExtractionOptions) -> Vec<[u8; 3]> {
    if options.pixels == 0 {
        return Vec::new();
    }

    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return Vec::new();
    }

    let width = image.width() as usize;
    let step = total.div_ceil(options.pixels).max(1);
    (0..total)
        .step_by(step)
        .map(|index| {
            let y = index / width;
            let x = (index % width + y) % width;
            image.get_pixel(x as u32, y as u32)
        })
        .filter(|pixel| options.accepts(pixel.0))
        .map(|pixel| [pixel[0], pixel[1], pixel[2]])
        .collect()
}

fn bucket_key(sample: &[u8; 3]) -> usize {
    let bits = 8 - BUCKET_SHIFT;
    ((sample[0] >> BUCKET_SHIFT) as usize) << (2 * bits)
        | ((sample[1] >> BUCKET_SHIFT) as usize) << bits
        | (sample[2] >> BUCKET_SHIFT) as usize
}

fn bucket_samples(samples: &[[u8; 3]]) -> Vec<Cluster> {
    let mut buckets = vec![Cluster::default(); BUCKET_COUNT];
    for sample in samples {
        buckets[bucket_key(sample)].add(sample);
    }

    let mut occupied: Vec<Cluster> = buckets.into_iter().filter(|b| b.count > 0).collect();
    occupied.sort_by_key(|bucket| Reverse(bucket.count));
    occupied
}

fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

fn normalized_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    squared_distance(a, b).sqrt() / MAX_RGB_DISTANCE
}

/// Greedy merge, largest buckets first, so big clusters pull in their
/// neighbours before smaller ones can seed clusters of their own.
fn merge_by_distance(buckets: Vec<Cluster>, distance: f32) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for bucket in buckets {
        let centroid = bucket.centroid();
        match clusters
            .iter_mut()
            .find(|cluster| normalized_distance(&cluster.centroid(), &centroid) < distance)
        {
            Some(cluster) => cluster.absorb(&bucket),
            None => clusters.push(bucket),
        }
    }
    clusters
}

fn merge_similar(clusters: Vec<Cluster>, options: &ExtractionOptions) -> Vec<Swatch> {
    let mut candidates: Vec<Swatch> = clusters.into_iter().map(Swatch::from).collect();
    candidates.sort_by_key(|swatch| Reverse(swatch.count));

    let mut kept: Vec<Swatch> = Vec::new();
    for swatch in candidates {
        match kept
            .iter_mut()
            .find(|existing| options.similar(&existing.hsl, &swatch.hsl))
        {
            Some(existing) => existing.count += swatch.count,
            None => kept.push(swatch),
        }
    }

    kept.sort_by_key(|swatch| Reverse(swatch.count));
    kept
}

/// Clusters the image's qualifying pixels and returns the resulting colors,
/// most dominant first. Empty when no pixel passes the alpha validator.
pub fn extract_colors(image: &RgbaImage, options: &ExtractionOptions) -> Vec<ExtractedColor> {
    let samples = sample_pixels(image, options);
    if samples.is_empty() {
        return Vec::new();
    }

    let total = samples.len() as f32;
    let clusters = merge_by_distance(bucket_samples(&samples), options.distance);

    merge_similar(clusters, options)
        .into_iter()
        .map(|swatch| ExtractedColor {
            color: swatch.color,
            area: swatch.count as f32 / total,
            hue: swatch.hsl.hue,
            saturation: swatch.hsl.saturation,
            lightness: swatch.hsl.lightness,
        })
        .collect()
}

pub fn dominant_color(image: &RgbaImage, options: &ExtractionOptions) -> Option<AccentColor> {
    extract_colors(image, options)
        .first()
        .map(|extracted| extracted.color)
}

fn color_from_centroid(centroid: [f32; 3]) -> AccentColor {
    let r = centroid[0].clamp(0.0, 255.0).round() as u8;
    let g = centroid[1].clamp(0.0, 255.0).round() as u8;
    let b = centroid[2].clamp(0.0, 255.0).round() as u8;
    AccentColor::from_rgb(r, g, b)
}

fn rgb_to_hsl(rgb: [f32; 3]) -> Hsl {
    let r = rgb[0] / 255.0;
    let g = rgb[1] / 255.0;
    let b = rgb[2] / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;

    if max - min <= f32::EPSILON {
        return Hsl {
            hue: 0.0,
            saturation: 0.0,
            lightness,
        };
    }

    let delta = max - min;
    let saturation = if lightness > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };
    let hue = if max == r {
        (g - b) / delta + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    Hsl {
        hue: hue / 6.0,
        saturation,
        lightness,
    }
}

/// Hue lives on a circle; 0.98 and 0.02 are close.
fn hue_gap(a: f32, b: f32) -> f32 {
    let gap = (a - b).abs();
    gap.min(1.0 - gap)
}
