use crate::errors::{PipelineError, Result};
use crate::histogram::HistogramChart;
use crate::pipeline::PipelineEvent;

use std::time::{Duration, Instant};

const DEFAULT_THROTTLE: Duration = Duration::from_millis(200);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwards published histogram charts to a remote collection endpoint.
///
/// Each chart is serialized to PNG and POSTed as an octet-stream. A
/// generation is sent at most once, and sends closer together than the
/// throttle interval are skipped rather than queued — the endpoint only
/// cares about recent data. Transport failures are logged and never reach
/// the pipeline.
pub struct HistogramSender {
    endpoint: String,
    client: reqwest::Client,
    throttle: Duration,
    last_generation: Option<u64>,
    last_attempt: Option<Instant>,
}

impl HistogramSender {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_throttle(endpoint, DEFAULT_THROTTLE)
    }

    pub fn with_throttle(endpoint: impl Into<String>, throttle: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::SendError {
                message: e.to_string(),
            })?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            throttle,
            last_generation: None,
            last_attempt: None,
        })
    }

    /// Decide whether a publish for `generation` should go out now.
    fn should_send(&self, generation: u64) -> bool {
        if self.last_generation == Some(generation) {
            return false;
        }
        if let Some(last) = self.last_attempt {
            if last.elapsed() < self.throttle {
                return false;
            }
        }
        true
    }

    fn mark_attempted(&mut self, generation: u64) {
        self.last_generation = Some(generation);
        self.last_attempt = Some(Instant::now());
    }

    /// Send a published chart. Returns false when the send was skipped
    /// (already-sent generation or throttled).
    pub async fn send_chart(&mut self, chart: &HistogramChart, generation: u64) -> Result<bool> {
        if !self.should_send(generation) {
            log::debug!("Skipping histogram send for generation {}", generation);
            return Ok(false);
        }
        // One attempt per generation, even if the transport fails
        self.mark_attempted(generation);

        let body = chart.to_png()?;
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/octet-stream")
            .header("X-Histogram-Generation", generation.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::SendError {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::SendError {
                message: format!("endpoint returned {}", response.status()),
            });
        }
        Ok(true)
    }

    /// Consume a pipeline event; only histogram publishes are of interest.
    pub async fn handle_event(&mut self, event: &PipelineEvent) {
        if let PipelineEvent::HistogramPublished { chart, generation } = event {
            if let Err(e) = self.send_chart(chart, *generation).await {
                log::warn!("Failed to send histogram for generation {}: {}", generation, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(throttle: Duration) -> HistogramSender {
        HistogramSender::with_throttle("http://localhost:0/histogram", throttle).unwrap()
    }

    #[test]
    fn test_generation_sent_at_most_once() {
        let mut s = sender(Duration::ZERO);
        assert!(s.should_send(1));
        s.mark_attempted(1);
        assert!(!s.should_send(1));
        assert!(s.should_send(2));
    }

    #[test]
    fn test_throttle_skips_rapid_sends() {
        let mut s = sender(Duration::from_secs(60));
        s.mark_attempted(1);
        assert!(!s.should_send(2), "send inside the throttle window must be skipped");

        let mut s = sender(Duration::ZERO);
        s.mark_attempted(1);
        assert!(s.should_send(2), "zero throttle never skips a new generation");
    }

    #[tokio::test]
    async fn test_transport_failure_is_send_error() {
        let mut s = sender(Duration::ZERO);
        let chart = crate::histogram::render_chart(&{
            let raster = crate::raster::Raster::new(1, 1, 1, vec![7]).unwrap();
            crate::histogram::compute_histogram(&raster).unwrap()
        });

        // Port 0 is never connectable
        let err = s.send_chart(&chart, 1).await.unwrap_err();
        assert_eq!(err.error_code(), "SEND_ERROR");

        // The attempt still counts toward at-most-once
        let skipped = s.send_chart(&chart, 1).await.unwrap();
        assert!(!skipped);
    }
}
