//! Streaming info extractor, one per call
//!
//! Each chunk is extracted on its own and merged into the running snapshot
//! with the once-set-never-cleared rule. An update is emitted only when at
//! least one field changed. A name from a bare "this is X" never replaces a
//! name already captured.

use std::sync::Arc;

use call_assist_core::{CapturedInfo, InfoField};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{extract_with_name_cue, NameCue};

/// Fields changed by a chunk, plus the merged snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoUpdate {
    pub changed: Vec<InfoField>,
    pub info: CapturedInfo,
}

pub type InfoCallback = Arc<dyn Fn(InfoUpdate) + Send + Sync>;

#[derive(Default)]
struct Inner {
    current: CapturedInfo,
    closed: bool,
}

pub struct StreamingInfoExtractor {
    inner: Mutex<Inner>,
    on_update: InfoCallback,
}

impl StreamingInfoExtractor {
    pub fn new(on_update: InfoCallback) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            on_update,
        }
    }

    /// Feed a transcript chunk; returns the update if anything changed
    pub fn push_chunk(&self, text: &str) -> Option<InfoUpdate> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let update = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return None;
            }

            let (mut partial, cue) = extract_with_name_cue(text);
            if cue == Some(NameCue::Introduced) && inner.current.name.is_some() {
                partial.name = None;
            }
            let changed = inner.current.merge(&partial);
            if changed.is_empty() {
                return None;
            }
            InfoUpdate {
                changed,
                info: inner.current.clone(),
            }
        };

        tracing::debug!(changed = ?update.changed, "Captured info from chunk");
        (self.on_update)(update.clone());
        Some(update)
    }

    /// Merged snapshot so far
    pub fn current(&self) -> CapturedInfo {
        self.inner.lock().current.clone()
    }

    pub fn reset(&self) {
        self.inner.lock().current = CapturedInfo::default();
    }

    /// Reset and refuse further chunks
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.current = CapturedInfo::default();
        inner.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<InfoUpdate>>>, InfoCallback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, Arc::new(move |u| sink.lock().push(u)))
    }

    #[test]
    fn test_emits_only_on_change() {
        let (log, callback) = recorder();
        let extractor = StreamingInfoExtractor::new(callback);

        extractor.push_chunk("hello there");
        assert!(log.lock().is_empty());

        let update = extractor.push_chunk("my boiler is leaking").unwrap();
        assert_eq!(update.changed, vec![InfoField::Job]);

        // Same fact again is not a change
        assert!(extractor.push_chunk("yes the boiler is leaking").is_none());
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_later_chunks_never_clear() {
        let (_log, callback) = recorder();
        let extractor = StreamingInfoExtractor::new(callback);

        extractor.push_chunk("postcode is M1 2AB");
        extractor.push_chunk("and the tap is dripping");
        extractor.push_chunk("ok thanks");

        let info = extractor.current();
        assert_eq!(info.location_code.as_deref(), Some("M1 2AB"));
        assert_eq!(info.job.as_deref(), Some("tap dripping"));
    }

    #[test]
    fn test_reset_replay_is_identical() {
        let (log, callback) = recorder();
        let extractor = StreamingInfoExtractor::new(callback);
        let chunks = ["this is Anna", "the sink is blocked", "07700 900 456"];

        for c in chunks {
            extractor.push_chunk(c);
        }
        let first: Vec<_> = log.lock().drain(..).collect();
        extractor.reset();
        for c in chunks {
            extractor.push_chunk(c);
        }
        let second: Vec<_> = log.lock().drain(..).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_casual_this_is_keeps_stated_name() {
        let (log, callback) = recorder();
        let extractor = StreamingInfoExtractor::new(callback);

        extractor.push_chunk("my name is Sarah Jones");
        extractor.push_chunk("honestly this is ridiculous");
        extractor.push_chunk("this is taking ages");

        assert_eq!(extractor.current().name.as_deref(), Some("Sarah Jones"));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_stated_name_corrects_earlier_one() {
        let (_log, callback) = recorder();
        let extractor = StreamingInfoExtractor::new(callback);

        extractor.push_chunk("this is Jo");
        extractor.push_chunk("sorry, my name is Joanne");
        assert_eq!(extractor.current().name.as_deref(), Some("Joanne"));
    }

    #[test]
    fn test_shutdown() {
        let (log, callback) = recorder();
        let extractor = StreamingInfoExtractor::new(callback);
        extractor.shutdown();
        assert!(extractor.push_chunk("fix my boiler").is_none());
        assert!(log.lock().is_empty());
    }
}
