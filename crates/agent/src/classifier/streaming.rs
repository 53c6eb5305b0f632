//! Streaming classifier, one per call
//!
//! Every chunk is appended to a single transcript buffer. Tier 1 runs on the
//! whole buffer immediately; a debounce timer restarted on every chunk runs
//! the full tiered classification once the caller pauses. Tier 2 runs on its
//! own task so a slow model never holds up later chunks or the next window.
//!
//! Emission rules:
//! - immediate: Tier 1 confidence at or above the threshold, or a different
//!   top segment than the last emission
//! - debounced: a different segment or a strictly higher confidence than the
//!   last emission; fallback results are never emitted
//!
//! `reset()` bumps a generation counter so work started before the reset can
//! no longer emit.

use std::sync::Arc;
use std::time::Duration;

use call_assist_config::{ClassifierConfig, StreamingConfig};
use call_assist_core::Segment;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::tiered::{ClassifyOptions, TieredClassifier};
use super::{ClassificationResult, ClassificationTier};

/// Receives every emitted classification
pub type ClassificationCallback = Arc<dyn Fn(ClassificationResult) + Send + Sync>;

/// Streaming behaviour
#[derive(Debug, Clone, Copy)]
pub struct StreamingOptions {
    pub debounce: Duration,
    /// Tier 1 confidence that triggers an immediate emission
    pub immediate_emit_confidence: u8,
    pub classify: ClassifyOptions,
}

impl StreamingOptions {
    pub fn from_config(streaming: &StreamingConfig, classifier: &ClassifierConfig) -> Self {
        Self {
            debounce: Duration::from_millis(streaming.debounce_ms),
            immediate_emit_confidence: streaming.immediate_emit_confidence,
            classify: ClassifyOptions::from(classifier),
        }
    }
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self::from_config(&StreamingConfig::default(), &ClassifierConfig::default())
    }
}

#[derive(Default)]
struct Inner {
    buffer: String,
    last_emitted: Option<(Segment, u8)>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    closed: bool,
}

pub struct StreamingClassifier {
    classifier: Arc<TieredClassifier>,
    options: StreamingOptions,
    inner: Arc<Mutex<Inner>>,
    on_update: ClassificationCallback,
}

impl StreamingClassifier {
    pub fn new(
        classifier: Arc<TieredClassifier>,
        options: StreamingOptions,
        on_update: ClassificationCallback,
    ) -> Self {
        Self {
            classifier,
            options,
            inner: Arc::new(Mutex::new(Inner::default())),
            on_update,
        }
    }

    /// Feed a transcript chunk
    ///
    /// Must be called from within a Tokio runtime; the debounce timer is a
    /// spawned task.
    pub fn push_chunk(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let emit = {
            let mut inner = self.inner.lock();
            if inner.closed {
                tracing::debug!("Chunk ignored, classifier shut down");
                return;
            }

            if !inner.buffer.is_empty() {
                inner.buffer.push(' ');
            }
            inner.buffer.push_str(text);

            let emit = self
                .classifier
                .classify_tier1(&inner.buffer)
                .filter(|result| {
                    result.confidence >= self.options.immediate_emit_confidence
                        || inner.last_emitted.map(|(s, _)| s) != Some(result.segment)
                });
            if let Some(result) = &emit {
                inner.last_emitted = Some((result.segment, result.confidence));
            }

            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.timer = Some(self.spawn_debounce(inner.generation));

            emit
        };

        if let Some(result) = emit {
            (self.on_update)(result);
        }
    }

    fn spawn_debounce(&self, generation: u64) -> JoinHandle<()> {
        let classifier = self.classifier.clone();
        let inner = self.inner.clone();
        let on_update = self.on_update.clone();
        let options = self.options;

        tokio::spawn(async move {
            tokio::time::sleep(options.debounce).await;

            let text = {
                let inner = inner.lock();
                if inner.closed || inner.generation != generation {
                    return;
                }
                inner.buffer.clone()
            };

            // Detached so the next chunk's abort cannot cancel a running Tier 2 call
            tokio::spawn(async move {
                let result = classifier.classify(&text, options.classify).await;
                if result.tier == ClassificationTier::Fallback || result.confidence == 0 {
                    tracing::debug!(tier = %result.tier, "Debounced classification not emitted");
                    return;
                }

                let emit = {
                    let mut inner = inner.lock();
                    if inner.closed || inner.generation != generation {
                        return;
                    }
                    let improved = match inner.last_emitted {
                        None => true,
                        Some((segment, confidence)) => {
                            segment != result.segment || result.confidence > confidence
                        }
                    };
                    if improved {
                        inner.last_emitted = Some((result.segment, result.confidence));
                    }
                    improved
                };

                if emit {
                    on_update(result);
                }
            });
        })
    }

    /// Cancel the pending timer and clear all accumulated state
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.buffer.clear();
        inner.last_emitted = None;
    }

    /// Reset and refuse further chunks
    pub fn shutdown(&self) {
        self.reset();
        self.inner.lock().closed = true;
    }

    pub fn transcript(&self) -> String {
        self.inner.lock().buffer.clone()
    }

    pub fn last_emitted(&self) -> Option<(Segment, u8)> {
        self.inner.lock().last_emitted
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Drop for StreamingClassifier {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.lock().timer.take() {
            timer.abort();
        }
    }
}
