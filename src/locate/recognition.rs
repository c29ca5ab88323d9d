// src/locate/recognition.rs

//! Text-recognition based targeting.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::device::{Point, TextDetection, TextRecognizer};
use crate::engine::StopHandle;
use crate::errors::{StepError, StepResult};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// A detection accepted as the target.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub position: Point,
    pub label: String,
    pub confidence: f32,
}

#[derive(Clone)]
pub struct RecognitionFallback {
    ocr: Arc<dyn TextRecognizer>,
    threshold: f32,
    retries: u32,
    backoff: Duration,
}

impl RecognitionFallback {
    pub fn new(ocr: Arc<dyn TextRecognizer>) -> Self {
        Self {
            ocr,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            retries: DEFAULT_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// First detection whose label contains `target` with confidence
    /// strictly above the threshold.
    pub fn select<'a>(&self, target: &str, detections: &'a [TextDetection]) -> Option<&'a TextDetection> {
        detections
            .iter()
            .find(|d| d.label.contains(target) && d.confidence > self.threshold)
    }

    /// Detect and search with the configured retry count.
    pub async fn match_text(&self, target: &str, stop: &StopHandle) -> StepResult<TextMatch> {
        self.match_text_with(target, self.retries, None, stop).await
    }

    /// Detect and search, re-running detection up to `retries` more times
    /// with a fixed backoff. `budget`, when set, also ends the retries once
    /// that much time has passed.
    pub async fn match_text_with(
        &self,
        target: &str,
        retries: u32,
        budget: Option<Duration>,
        stop: &StopHandle,
    ) -> StepResult<TextMatch> {
        let target = target.trim_matches('"');
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            stop.check()?;
            attempts += 1;

            match stop.race(self.ocr.detect()).await? {
                Ok(detections) => {
                    if let Some(hit) = self.select(target, &detections) {
                        let found = TextMatch {
                            position: hit.bounds.center(),
                            label: hit.label.clone(),
                            confidence: hit.confidence,
                        };
                        info!(
                            target_text = target,
                            label = %found.label,
                            confidence = found.confidence,
                            attempts,
                            "recognised target text"
                        );
                        return Ok(found);
                    }
                    debug!(
                        target_text = target,
                        detections = detections.len(),
                        attempts,
                        "target text not among detections"
                    );
                }
                Err(err) => {
                    debug!(target_text = target, error = %err, attempts, "text detection failed");
                }
            }

            let out_of_time = budget.is_some_and(|b| started.elapsed() >= b);
            if attempts > retries || out_of_time {
                return Err(StepError::RecognitionNotFound {
                    text: target.to_string(),
                    attempts,
                });
            }

            stop.sleep(self.backoff).await?;
        }
    }
}

impl std::fmt::Debug for RecognitionFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionFallback")
            .field("threshold", &self.threshold)
            .field("retries", &self.retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
