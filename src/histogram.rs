use crate::errors::{PipelineError, Result};
use crate::raster::Raster;

use rayon::prelude::*;
use std::io::Cursor;
use std::sync::Mutex;

pub const BUCKETS: usize = 256;
pub const CHART_WIDTH: u32 = 256;
pub const CHART_HEIGHT: u32 = 200;

/// Pixel count above which histogram computation switches to tiled parallel
/// accumulation.
const PARALLEL_THRESHOLD: usize = 1_000_000;

/// Per-channel bucket counts for one raster.
///
/// For single-channel rasters the gray counts are broadcast to all three
/// channels, so consumers never have to special-case grayscale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHistogram {
    pub red: [u32; BUCKETS],
    pub green: [u32; BUCKETS],
    pub blue: [u32; BUCKETS],
}

impl ChannelHistogram {
    fn zeroed() -> Self {
        Self {
            red: [0; BUCKETS],
            green: [0; BUCKETS],
            blue: [0; BUCKETS],
        }
    }

    fn merge(&mut self, other: &ChannelHistogram) {
        for i in 0..BUCKETS {
            self.red[i] += other.red[i];
            self.green[i] += other.green[i];
            self.blue[i] += other.blue[i];
        }
    }
}

// Calculate per-channel histogram
pub fn compute_histogram(raster: &Raster) -> Result<ChannelHistogram> {
    raster.validate()?;

    if raster.pixel_count() >= PARALLEL_THRESHOLD {
        return compute_histogram_parallel(raster, optimal_tile_count(raster));
    }

    let mut histogram = ChannelHistogram::zeroed();
    accumulate(raster.channels(), raster.data(), &mut histogram);
    Ok(histogram)
}

/// Compute histogram in parallel across row tiles, merging thread-local
/// accumulators at the end. Pointwise identical to the sequential path.
pub fn compute_histogram_parallel(raster: &Raster, num_tiles: usize) -> Result<ChannelHistogram> {
    raster.validate()?;

    let channels = raster.channels();
    let data = raster.data();
    let row_bytes = raster.width() as usize * channels as usize;
    let height = raster.height() as usize;

    let num_tiles = num_tiles.clamp(1, height.max(1));
    let tile_height = (height / num_tiles).max(1);
    let tiles: Vec<_> = (0..num_tiles)
        .map(|i| {
            let start_y = i * tile_height;
            let end_y = if i == num_tiles - 1 {
                height
            } else {
                (i + 1) * tile_height
            };
            (start_y, end_y)
        })
        .collect();

    let histogram = Mutex::new(ChannelHistogram::zeroed());

    tiles.par_iter().for_each(|&(start_y, end_y)| {
        let mut local = ChannelHistogram::zeroed();
        accumulate(channels, &data[start_y * row_bytes..end_y * row_bytes], &mut local);

        let mut global = histogram.lock().unwrap();
        global.merge(&local);
    });

    Ok(histogram.into_inner().unwrap())
}

fn accumulate(channels: u8, data: &[u8], histogram: &mut ChannelHistogram) {
    if channels == 1 {
        let mut gray = [0u32; BUCKETS];
        for &value in data {
            gray[value as usize] += 1;
        }
        for i in 0..BUCKETS {
            histogram.red[i] += gray[i];
            histogram.green[i] += gray[i];
            histogram.blue[i] += gray[i];
        }
    } else {
        // BGR interleaved
        for pixel in data.chunks_exact(3) {
            histogram.blue[pixel[0] as usize] += 1;
            histogram.green[pixel[1] as usize] += 1;
            histogram.red[pixel[2] as usize] += 1;
        }
    }
}

/// Adaptive tile count based on raster size
fn optimal_tile_count(raster: &Raster) -> usize {
    let total_pixels = raster.pixel_count();
    let min_tiles = 2;
    let max_tiles = num_cpus::get();

    if total_pixels < 4_000_000 {
        min_tiles
    } else {
        max_tiles.max(min_tiles)
    }
}

/// Fixed 256×200 BGR chart rendered from a [`ChannelHistogram`].
///
/// Immutable once produced; shared by consumers as `Arc<HistogramChart>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramChart {
    data: Vec<u8>,
}

impl HistogramChart {
    pub fn width(&self) -> u32 {
        CHART_WIDTH
    }

    pub fn height(&self) -> u32 {
        CHART_HEIGHT
    }

    /// Raw BGR bytes, row-major, `CHART_WIDTH * CHART_HEIGHT * 3` long.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * CHART_WIDTH as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Serialized byte form handed to the remote consumer.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut rgb = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }

        let img = image::RgbImage::from_raw(CHART_WIDTH, CHART_HEIGHT, rgb).ok_or_else(|| {
            PipelineError::EncodingError {
                message: "chart buffer does not match chart dimensions".to_string(),
            }
        })?;

        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .map_err(|e| PipelineError::EncodingError {
                message: e.to_string(),
            })?;
        Ok(buf.into_inner())
    }
}

// BGR bar colors
const BAR_RED: [u8; 3] = [0, 0, 255];
const BAR_GREEN: [u8; 3] = [0, 255, 0];
const BAR_BLUE: [u8; 3] = [255, 0, 0];

/// Render a chart from per-channel counts.
///
/// Each channel is normalized to its own max count; an all-zero channel
/// draws nothing. Bars are drawn Red, then Green, then Blue, so later
/// channels overwrite earlier ones where they intersect.
pub fn render_chart(histogram: &ChannelHistogram) -> HistogramChart {
    // White background
    let mut data = vec![255u8; CHART_WIDTH as usize * CHART_HEIGHT as usize * 3];

    draw_channel(&mut data, &histogram.red, BAR_RED);
    draw_channel(&mut data, &histogram.green, BAR_GREEN);
    draw_channel(&mut data, &histogram.blue, BAR_BLUE);

    HistogramChart { data }
}

fn draw_channel(canvas: &mut [u8], counts: &[u32; BUCKETS], color: [u8; 3]) {
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return;
    }

    let chart_height = CHART_HEIGHT as usize;
    for (x, &count) in counts.iter().enumerate() {
        let bar = ((count as f64 / max as f64) * chart_height as f64) as usize;
        let bar = bar.min(chart_height);
        for y in (chart_height - bar)..chart_height {
            let idx = (y * CHART_WIDTH as usize + x) * 3;
            canvas[idx..idx + 3].copy_from_slice(&color);
        }
    }
}
