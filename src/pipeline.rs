use crate::adjustments::apply_brightness;
use crate::errors::{PipelineError, Result};
use crate::histogram::{compute_histogram, render_chart, HistogramChart};
use crate::loader;
use crate::raster::Raster;
use crate::state::ImageState;

use std::collections::BinaryHeap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Priority levels for pipeline work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Critical = 2, // User-initiated load or slider move, immediate response needed
    High = 1,     // Histogram recompute for the current generation
    Low = 0,      // Background work
}

/// One unit of work executed on a worker thread
#[derive(Debug)]
pub enum PipelineTask {
    DecodeImage {
        bytes: Vec<u8>,
    },
    AdjustBrightness {
        original: Arc<Raster>,
        factor: f32,
    },
    ComputeHistogram {
        raster: Arc<Raster>,
        generation: u64,
    },
}

/// A prioritized task in the queue
#[derive(Debug)]
struct QueuedTask {
    priority: TaskPriority,
    task_id: u64,
    task: PipelineTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.task_id == other.task_id
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then lower task_id (earlier tasks) first.
        // BinaryHeap is a max-heap, so task_id ordering is reversed.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

/// Completion notification fanned out to subscribers.
///
/// Events carry reference-counted handles, never copies; a subscriber
/// holding an event does not block later updates.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ImageUpdated {
        raster: Arc<Raster>,
        generation: u64,
    },
    HistogramPublished {
        chart: Arc<HistogramChart>,
        generation: u64,
    },
    UpdateFailed {
        generation: u64,
        error: String,
    },
}

/// Phase of the current load cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Loading,
    Computing,
    Published,
}

struct Shared {
    state: Arc<ImageState>,
    task_queue: Mutex<BinaryHeap<QueuedTask>>,
    subscribers: Mutex<Vec<Sender<PipelineEvent>>>,
    phase: Mutex<PipelinePhase>,
    original: Mutex<Option<Arc<Raster>>>,
    next_task_id: Mutex<u64>,
    running: Mutex<bool>,
}

impl Shared {
    fn submit(&self, task: PipelineTask, priority: TaskPriority) {
        let task_id = {
            let mut next = self.next_task_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        self.task_queue.lock().unwrap().push(QueuedTask {
            priority,
            task_id,
            task,
        });
    }

    fn set_phase(&self, phase: PipelinePhase) {
        *self.phase.lock().unwrap() = phase;
    }

    fn broadcast(&self, event: PipelineEvent) {
        // Drop subscribers whose receiver went away
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Orchestrates load/replace and histogram recompute as units of work
/// against [`ImageState`], fanning completion events out to subscribers.
///
/// Completion order across workers is not submission order; the generation
/// guard in `ImageState` is what keeps late results from clobbering newer
/// ones. Superseding a generation is also the cancellation mechanism: a
/// stale compute runs to completion and its result is dropped.
pub struct UpdatePipeline {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl UpdatePipeline {
    pub fn new(state: Arc<ImageState>, num_workers: usize) -> Self {
        let shared = Arc::new(Shared {
            state,
            task_queue: Mutex::new(BinaryHeap::new()),
            subscribers: Mutex::new(Vec::new()),
            phase: Mutex::new(PipelinePhase::Idle),
            original: Mutex::new(None),
            next_task_id: Mutex::new(0),
            running: Mutex::new(true),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let shared = Arc::clone(&shared);
            let worker = thread::Builder::new()
                .name(format!("pipeline-worker-{}", i))
                .spawn(move || worker_loop(shared))
                .expect("Failed to spawn worker thread");
            workers.push(worker);
        }

        Self { shared, workers }
    }

    pub fn with_default_workers(state: Arc<ImageState>) -> Self {
        Self::new(state, num_cpus::get().max(2))
    }

    /// Register a consumer. Each subscriber gets every event; receivers
    /// whose end is dropped are pruned on the next broadcast.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Schedule decode-and-replace for raw image bytes.
    ///
    /// On success the decoded raster becomes the stored original for later
    /// brightness adjustments and a histogram recompute is scheduled for
    /// its generation.
    pub fn load_bytes(&self, bytes: Vec<u8>) {
        self.shared.set_phase(PipelinePhase::Loading);
        self.shared
            .submit(PipelineTask::DecodeImage { bytes }, TaskPriority::Critical);
    }

    /// Schedule a brightness adjustment derived from the stored original
    /// raster (not the currently displayed one, so slider moves do not
    /// compound).
    pub fn adjust_brightness(&self, factor: f32) -> Result<()> {
        let original = self
            .shared
            .original
            .lock()
            .unwrap()
            .clone()
            .ok_or(PipelineError::NoImageLoaded)?;

        self.shared.set_phase(PipelinePhase::Loading);
        self.shared.submit(
            PipelineTask::AdjustBrightness { original, factor },
            TaskPriority::Critical,
        );
        Ok(())
    }

    pub fn phase(&self) -> PipelinePhase {
        *self.shared.phase.lock().unwrap()
    }

    pub fn queue_size(&self) -> usize {
        self.shared.task_queue.lock().unwrap().len()
    }

    pub fn shutdown(self) {
        *self.shared.running.lock().unwrap() = false;
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    while *shared.running.lock().unwrap() {
        let queued = {
            let mut queue = shared.task_queue.lock().unwrap();
            queue.pop()
        };

        if let Some(queued) = queued {
            execute_task(&shared, queued.task);
        } else {
            // No tasks available, sleep briefly to avoid busy waiting
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn execute_task(shared: &Shared, task: PipelineTask) {
    match task {
        PipelineTask::DecodeImage { bytes } => match loader::decode(&bytes) {
            Ok(raster) => replace_and_recompute(shared, Arc::new(raster), true),
            Err(e) => report_failure(shared, e),
        },
        PipelineTask::AdjustBrightness { original, factor } => {
            let derived = Arc::new(apply_brightness(&original, factor));
            replace_and_recompute(shared, derived, false);
        }
        PipelineTask::ComputeHistogram { raster, generation } => {
            match compute_histogram(&raster) {
                Ok(histogram) => {
                    let chart = Arc::new(render_chart(&histogram));
                    if shared.state.publish_histogram(Arc::clone(&chart), generation) {
                        shared.set_phase(PipelinePhase::Published);
                        shared.broadcast(PipelineEvent::HistogramPublished { chart, generation });
                    }
                    // Stale results were already logged and dropped by ImageState
                }
                Err(e) => {
                    log::error!("Histogram computation failed for generation {}: {}", generation, e);
                    shared.broadcast(PipelineEvent::UpdateFailed {
                        generation,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Common tail of the decode and brightness paths: make the raster current,
/// notify subscribers, and schedule the recompute for the new generation.
fn replace_and_recompute(shared: &Shared, raster: Arc<Raster>, is_fresh_load: bool) {
    if is_fresh_load {
        *shared.original.lock().unwrap() = Some(Arc::clone(&raster));
    }

    let generation = shared.state.replace(Arc::clone(&raster));
    shared.set_phase(PipelinePhase::Computing);
    shared.broadcast(PipelineEvent::ImageUpdated {
        raster: Arc::clone(&raster),
        generation,
    });
    shared.submit(
        PipelineTask::ComputeHistogram { raster, generation },
        TaskPriority::High,
    );
}

fn report_failure(shared: &Shared, error: PipelineError) {
    let snapshot = shared.state.snapshot();
    log::warn!("Image update failed: {}", error);
    // The prior published pair stays visible; fall back to Idle only when
    // nothing was ever published
    if snapshot.chart.is_some() {
        shared.set_phase(PipelinePhase::Published);
    } else {
        shared.set_phase(PipelinePhase::Idle);
    }
    shared.broadcast(PipelineEvent::UpdateFailed {
        generation: snapshot.generation,
        error: error.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn gray_png(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
        let img = image::GrayImage::from_raw(width, height, pixels.to_vec()).unwrap();
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    /// Drain events until one matches, with a deadline so a hung pipeline
    /// fails the test instead of blocking it.
    fn wait_for(
        rx: &Receiver<PipelineEvent>,
        mut matches: impl FnMut(&PipelineEvent) -> bool,
    ) -> PipelineEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .expect("timed out waiting for pipeline event");
            let event = rx.recv_timeout(remaining).expect("pipeline event channel");
            if matches(&event) {
                return event;
            }
        }
    }

    #[test]
    fn test_load_publishes_histogram() {
        let state = Arc::new(ImageState::new());
        let pipeline = UpdatePipeline::new(Arc::clone(&state), 2);
        let rx = pipeline.subscribe();

        pipeline.load_bytes(gray_png(&[0, 0, 255, 255], 2, 2));

        let updated = wait_for(&rx, |e| matches!(e, PipelineEvent::ImageUpdated { .. }));
        let PipelineEvent::ImageUpdated { raster, generation } = updated else {
            unreachable!()
        };
        assert_eq!(generation, 1);
        assert_eq!(raster.channels(), 1);

        let published = wait_for(&rx, |e| matches!(e, PipelineEvent::HistogramPublished { .. }));
        let PipelineEvent::HistogramPublished { generation, .. } = published else {
            unreachable!()
        };
        assert_eq!(generation, 1);

        let snap = state.snapshot();
        assert_eq!(snap.generation, 1);
        assert!(snap.chart.is_some());
        assert_eq!(pipeline.phase(), PipelinePhase::Published);

        pipeline.shutdown();
    }

    #[test]
    fn test_brightness_cycle_uses_original_and_bumps_generation() {
        let state = Arc::new(ImageState::new());
        let pipeline = UpdatePipeline::new(Arc::clone(&state), 2);
        let rx = pipeline.subscribe();

        // Nothing loaded yet
        assert!(matches!(
            pipeline.adjust_brightness(1.5),
            Err(PipelineError::NoImageLoaded)
        ));

        pipeline.load_bytes(gray_png(&[100, 100, 100, 100], 2, 2));
        wait_for(&rx, |e| matches!(e, PipelineEvent::HistogramPublished { generation, .. } if *generation == 1));

        pipeline.adjust_brightness(2.0).unwrap();
        let updated = wait_for(&rx, |e| {
            matches!(e, PipelineEvent::ImageUpdated { generation, .. } if *generation == 2)
        });
        let PipelineEvent::ImageUpdated { raster, .. } = updated else {
            unreachable!()
        };
        assert_eq!(raster.data(), &[200, 200, 200, 200]);

        wait_for(&rx, |e| {
            matches!(e, PipelineEvent::HistogramPublished { generation, .. } if *generation == 2)
        });

        // Second slider move derives from the original again, not the
        // already-brightened raster
        pipeline.adjust_brightness(1.5).unwrap();
        let updated = wait_for(&rx, |e| {
            matches!(e, PipelineEvent::ImageUpdated { generation, .. } if *generation == 3)
        });
        let PipelineEvent::ImageUpdated { raster, .. } = updated else {
            unreachable!()
        };
        assert_eq!(raster.data(), &[150, 150, 150, 150]);

        wait_for(&rx, |e| {
            matches!(e, PipelineEvent::HistogramPublished { generation, .. } if *generation == 3)
        });
        assert_eq!(state.generation(), 3);

        pipeline.shutdown();
    }

    #[test]
    fn test_decode_failure_leaves_published_state_visible() {
        let state = Arc::new(ImageState::new());
        let pipeline = UpdatePipeline::new(Arc::clone(&state), 2);
        let rx = pipeline.subscribe();

        pipeline.load_bytes(gray_png(&[1, 2, 3, 4], 2, 2));
        wait_for(&rx, |e| matches!(e, PipelineEvent::HistogramPublished { .. }));

        pipeline.load_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let failed = wait_for(&rx, |e| matches!(e, PipelineEvent::UpdateFailed { .. }));
        let PipelineEvent::UpdateFailed { generation, error } = failed else {
            unreachable!()
        };
        assert_eq!(generation, 1);
        assert!(!error.is_empty());

        // Generation 1 stays published
        let snap = state.snapshot();
        assert_eq!(snap.generation, 1);
        assert!(snap.chart.is_some());
        assert_eq!(pipeline.phase(), PipelinePhase::Published);

        pipeline.shutdown();
    }

    #[test]
    fn test_decode_failure_before_first_load_returns_idle() {
        let state = Arc::new(ImageState::new());
        let pipeline = UpdatePipeline::new(Arc::clone(&state), 1);
        let rx = pipeline.subscribe();

        pipeline.load_bytes(vec![1, 2, 3]);
        wait_for(&rx, |e| matches!(e, PipelineEvent::UpdateFailed { .. }));
        assert_eq!(pipeline.phase(), PipelinePhase::Idle);
        assert!(state.snapshot().raster.is_none());

        pipeline.shutdown();
    }

    #[test]
    fn test_queue_orders_by_priority_then_submission() {
        let a = QueuedTask {
            priority: TaskPriority::High,
            task_id: 0,
            task: PipelineTask::DecodeImage { bytes: vec![] },
        };
        let b = QueuedTask {
            priority: TaskPriority::Critical,
            task_id: 1,
            task: PipelineTask::DecodeImage { bytes: vec![] },
        };
        let c = QueuedTask {
            priority: TaskPriority::High,
            task_id: 2,
            task: PipelineTask::DecodeImage { bytes: vec![] },
        };

        let mut heap = BinaryHeap::new();
        heap.push(a);
        heap.push(b);
        heap.push(c);

        assert_eq!(heap.pop().unwrap().task_id, 1); // highest priority first
        assert_eq!(heap.pop().unwrap().task_id, 0); // then earlier submission
        assert_eq!(heap.pop().unwrap().task_id, 2);
    }
}
