use crate::histogram::HistogramChart;
use crate::raster::Raster;

use std::sync::{Arc, Mutex};

/// Immutable view of the shared image model at one point in time.
///
/// Handles are reference-counted; holding a snapshot never blocks the next
/// update and is never invalidated by it. The chart may lag the raster by
/// one generation while a recompute is in flight, but never the reverse.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub raster: Option<Arc<Raster>>,
    pub chart: Option<Arc<HistogramChart>>,
    pub generation: u64,
}

struct StateInner {
    raster: Option<Arc<Raster>>,
    chart: Option<Arc<HistogramChart>>,
    generation: u64,
}

/// The single shared mutable location of the pipeline.
///
/// One mutex guards the (raster, chart, generation) triple as a unit, so
/// readers can never observe a raster paired with a chart from a newer
/// generation. Everything handed out is an `Arc`; superseded generations are
/// released when the last snapshot holder drops them.
pub struct ImageState {
    inner: Mutex<StateInner>,
}

impl ImageState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateInner {
                raster: None,
                chart: None,
                generation: 0,
            }),
        }
    }

    /// Store `raster` as current and return the new generation id.
    ///
    /// The previous chart no longer matches the current raster, so the
    /// pairing is cleared; existing snapshot holders keep their handles.
    pub fn replace(&self, raster: Arc<Raster>) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.generation += 1;
        inner.raster = Some(raster);
        inner.chart = None;
        inner.generation
    }

    /// Store `chart` as current, but only if `for_generation` is still the
    /// generation most recently stored by [`replace`](Self::replace).
    ///
    /// Worker completions arrive out of order; this guard is what gives
    /// last-write-wins semantics. Returns false when the result was stale
    /// and dropped.
    pub fn publish_histogram(&self, chart: Arc<HistogramChart>, for_generation: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.generation != for_generation {
            log::debug!(
                "Discarding stale histogram for generation {} (current is {})",
                for_generation,
                inner.generation
            );
            return false;
        }
        inner.chart = Some(chart);
        true
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock().unwrap();
        Snapshot {
            raster: inner.raster.clone(),
            chart: inner.chart.clone(),
            generation: inner.generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().unwrap().generation
    }
}

impl Default for ImageState {
    fn default() -> Self {
        Self::new()
    }
}
