//! Concurrent image/histogram update pipeline for a desktop image viewer.
//!
//! The crate keeps an in-memory image buffer and its derived histogram chart
//! consistent while a loader thread and a presentation thread read and write
//! them concurrently. [`ImageState`] owns the one shared mutable triple
//! (raster, chart, generation) behind a single lock; [`UpdatePipeline`]
//! schedules decode, brightness, and histogram work on a worker pool and
//! fans immutable snapshots out to subscribers. Out-of-order worker
//! completions are resolved by the generation guard: stale results are
//! dropped, never published.
//!
//! Rendering, file dialogs, and the remote endpoint itself are external
//! collaborators; [`remote::HistogramSender`] only covers the hand-off of
//! serialized chart bytes.

pub mod adjustments;
pub mod errors;
pub mod histogram;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod raster;
pub mod remote;
pub mod settings;
pub mod state;


pub use errors::{PipelineError, Result};
pub use histogram::{ChannelHistogram, HistogramChart};
pub use pipeline::{PipelineEvent, PipelinePhase, UpdatePipeline};
pub use raster::Raster;
pub use state::{ImageState, Snapshot};
