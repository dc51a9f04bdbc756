use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::locked;

/// Color distance covered by one tolerance step
pub const TOLERANCE_STEP: f32 = 16.0;

/// Buckets holding less than this share of the pixels are not dominant
const MIN_BUCKET_SHARE: f32 = 0.05;
const MAX_DOMINANT: usize = 5;
const THUMBNAIL_SIZE: u32 = 64;

/// An sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse "RRGGBB" or "#RRGGBB"
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }

        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

        Some(Self { r, g, b })
    }

    /// Euclidean distance in RGB space
    pub fn distance(&self, other: &Color) -> f32 {
        let dr = self.r as f32 - other.r as f32;
        let dg = self.g as f32 - other.g as f32;
        let db = self.b as f32 - other.b as f32;
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

/// Computes dominant colors of an image and decides whether they match.
pub trait ColorExtractor: Send + Sync {
    /// Dominant colors, most prominent first
    fn dominant_colors(&self, path: &Path) -> Result<Vec<Color>>;

    /// Whether any of `colors` is within `tolerance` of `desired`
    fn matches(&self, colors: &[Color], desired: Color, tolerance: u32) -> bool {
        let max_distance = tolerance as f32 * TOLERANCE_STEP;
        colors.iter().any(|c| c.distance(&desired) <= max_distance)
    }
}

/// Dominant colors from a coarse RGB histogram of a thumbnail.
#[derive(Debug, Default)]
pub struct HistogramExtractor;

impl ColorExtractor for HistogramExtractor {
    fn dominant_colors(&self, path: &Path) -> Result<Vec<Color>> {
        let image = image::open(path)
            .with_context(|| format!("Failed to load image: {}", path.display()))?;
        let thumb = image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8();

        // 4 bits per channel: [sum_r, sum_g, sum_b, count]
        let mut buckets = vec![[0u64; 4]; 4096];
        for pixel in thumb.pixels() {
            let [r, g, b] = pixel.0;
            let key = ((r as usize >> 4) << 8) | ((g as usize >> 4) << 4) | (b as usize >> 4);
            let bucket = &mut buckets[key];
            bucket[0] += r as u64;
            bucket[1] += g as u64;
            bucket[2] += b as u64;
            bucket[3] += 1;
        }

        let total = (thumb.width() * thumb.height()) as f32;
        if total == 0.0 {
            anyhow::bail!("Image has no pixels: {}", path.display());
        }

        let mut filled: Vec<[u64; 4]> = buckets
            .into_iter()
            .filter(|b| b[3] as f32 / total >= MIN_BUCKET_SHARE)
            .collect();
        filled.sort_by(|a, b| b[3].cmp(&a[3]));

        Ok(filled
            .into_iter()
            .take(MAX_DOMINANT)
            .map(|[r, g, b, n]| Color::new((r / n) as u8, (g / n) as u8, (b / n) as u8))
            .collect())
    }
}

/// Accepts or rejects candidates against the desired color.
///
/// Extraction results are cached per path for the lifetime of the process.
pub struct ColorFilter {
    extractor: Box<dyn ColorExtractor>,
    cache: Mutex<HashMap<PathBuf, Vec<Color>>>,
}

impl ColorFilter {
    pub fn new(extractor: Box<dyn ColorExtractor>) -> Self {
        Self {
            extractor,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether `image` is acceptable at `tolerance`.
    ///
    /// Always true without a desired color. Extraction failures reject the image.
    pub fn accepts(&self, image: &Path, desired: Option<Color>, tolerance: u32) -> bool {
        let Some(desired) = desired else {
            return true;
        };

        match self.colors(image) {
            Ok(colors) => self.extractor.matches(&colors, desired, tolerance),
            Err(e) => {
                log::warn!("Color check failed for {}: {:#}", image.display(), e);
                false
            }
        }
    }

    /// Extract colors for all uncached candidates in parallel
    pub fn warm(&self, images: &[PathBuf]) {
        let missing: Vec<&PathBuf> = {
            let cache = locked!(self.cache);
            images.iter().filter(|p| !cache.contains_key(*p)).collect()
        };
        if missing.is_empty() {
            return;
        }

        log::debug!("Extracting dominant colors for {} images", missing.len());
        let extracted: Vec<(PathBuf, Vec<Color>)> = missing
            .into_par_iter()
            .filter_map(|path| match self.extractor.dominant_colors(path) {
                Ok(colors) => Some((path.clone(), colors)),
                Err(e) => {
                    log::debug!("Skipping color warmup for {}: {:#}", path.display(), e);
                    None
                }
            })
            .collect();

        locked!(self.cache).extend(extracted);
    }

    pub fn cached_len(&self) -> usize {
        locked!(self.cache).len()
    }

    fn colors(&self, image: &Path) -> Result<Vec<Color>> {
        if let Some(colors) = locked!(self.cache).get(image) {
            return Ok(colors.clone());
        }

        // Extract outside the lock
        let colors = self.extractor.dominant_colors(image)?;
        locked!(self.cache).insert(image.to_path_buf(), colors.clone());
        Ok(colors)
    }
}
