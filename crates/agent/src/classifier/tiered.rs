//! Tiered classifier
//!
//! Always runs Tier 1. Tier 2 is paid for only when Tier 1's best guess is
//! below the configured confidence and the caller opts in. Tier 2 failures
//! degrade to the best Tier 1 guess, or the default segment at low
//! confidence, and are never returned as errors.

use std::sync::Arc;
use std::time::Instant;

use call_assist_config::ClassifierConfig;
use call_assist_core::Segment;

use super::disqualify::disqualified_segments;
use super::model::SegmentModel;
use super::pattern::match_segments;
use super::{ClassificationResult, ClassificationTier, SegmentMatch};

/// Confidence reported for the default segment when nothing matched
pub const DEFAULT_SEGMENT_CONFIDENCE: u8 = 20;

/// Per-call classification switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyOptions {
    pub use_tier2: bool,
    /// Tier 1 confidence at or above which Tier 2 is skipped
    pub tier1_min_confidence: u8,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self::from(&ClassifierConfig::default())
    }
}

impl From<&ClassifierConfig> for ClassifyOptions {
    fn from(config: &ClassifierConfig) -> Self {
        Self {
            use_tier2: config.use_tier2,
            tier1_min_confidence: config.tier1_min_confidence,
        }
    }
}

pub struct TieredClassifier {
    model: Option<Arc<dyn SegmentModel>>,
    max_alternatives: usize,
}

impl TieredClassifier {
    pub fn new(model: Option<Arc<dyn SegmentModel>>, config: &ClassifierConfig) -> Self {
        Self {
            model,
            max_alternatives: config.max_alternatives,
        }
    }

    /// Tier 1 only
    pub fn pattern_only() -> Self {
        Self::new(None, &ClassifierConfig::default())
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Tier 1 ranking with disqualified segments removed
    pub fn ranked(&self, text: &str) -> Vec<SegmentMatch> {
        let ruled_out = disqualified_segments(text);
        match_segments(text)
            .into_iter()
            .filter(|m| !ruled_out.iter().any(|(s, _)| *s == m.segment))
            .collect()
    }

    /// Synchronous Tier 1 classification; `None` when nothing matched
    pub fn classify_tier1(&self, text: &str) -> Option<ClassificationResult> {
        let mut ranked = self.ranked(text);
        if ranked.is_empty() {
            return None;
        }
        let best = ranked.remove(0);
        ranked.truncate(self.max_alternatives);
        Some(ClassificationResult {
            segment: best.segment,
            confidence: best.confidence,
            signals: best.signals,
            alternatives: ranked,
            tier: ClassificationTier::Pattern,
        })
    }

    /// Full classification
    pub async fn classify(&self, text: &str, options: ClassifyOptions) -> ClassificationResult {
        let tier1 = self.classify_tier1(text);
        let confident = tier1
            .as_ref()
            .map_or(false, |r| r.confidence >= options.tier1_min_confidence);

        let model = match (&self.model, options.use_tier2 && !confident) {
            (Some(model), true) => model,
            _ => return tier1.unwrap_or_else(|| self.default_result(ClassificationTier::Pattern, 0)),
        };

        let start = Instant::now();
        let outcome = model.classify(text).await;
        metrics::histogram!("call_assist_tier2_latency_seconds")
            .record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(verdict) => {
                metrics::counter!("call_assist_tier2_requests_total", "outcome" => "ok")
                    .increment(1);
                let mut alternatives: Vec<SegmentMatch> = self
                    .ranked(text)
                    .into_iter()
                    .filter(|m| m.segment != verdict.segment)
                    .collect();
                alternatives.truncate(self.max_alternatives);
                ClassificationResult {
                    segment: verdict.segment,
                    confidence: verdict.confidence,
                    signals: verdict.signals,
                    alternatives,
                    tier: ClassificationTier::Model,
                }
            }
            Err(e) => {
                metrics::counter!("call_assist_tier2_requests_total", "outcome" => "error")
                    .increment(1);
                tracing::warn!(
                    model = %model.name(),
                    error = %e,
                    "Tier 2 classification failed, using Tier 1 result"
                );
                match tier1 {
                    Some(mut result) => {
                        result.tier = ClassificationTier::Fallback;
                        result
                    }
                    None => self.default_result(
                        ClassificationTier::Fallback,
                        DEFAULT_SEGMENT_CONFIDENCE,
                    ),
                }
            }
        }
    }

    fn default_result(&self, tier: ClassificationTier, confidence: u8) -> ClassificationResult {
        ClassificationResult {
            segment: Segment::DEFAULT,
            confidence,
            signals: Vec::new(),
            alternatives: Vec::new(),
            tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierError, ModelVerdict};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingModel {
        calls: AtomicUsize,
        verdict: Result<ModelVerdict, ClassifierError>,
    }

    impl CountingModel {
        fn new(verdict: Result<ModelVerdict, ClassifierError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                verdict,
            })
        }
    }

    #[async_trait]
    impl SegmentModel for CountingModel {
        async fn classify(&self, _transcript: &str) -> Result<ModelVerdict, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn tenant_verdict() -> Result<ModelVerdict, ClassifierError> {
        Ok(ModelVerdict {
            segment: Segment::Tenant,
            confidence: 88,
            signals: vec!["rents the flat".into()],
        })
    }

    #[tokio::test]
    async fn test_confident_tier1_skips_model() {
        let model = CountingModel::new(tenant_verdict());
        let classifier = TieredClassifier::new(Some(model.clone()), &ClassifierConfig::default());

        let result = classifier
            .classify(
                "I have a rental property, my tenant called about the boiler",
                ClassifyOptions::default(),
            )
            .await;

        assert_eq!(result.tier, ClassificationTier::Pattern);
        assert_eq!(result.segment, Segment::RemoteLandlord);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_weak_tier1_consults_model() {
        let model = CountingModel::new(tenant_verdict());
        let classifier = TieredClassifier::new(Some(model.clone()), &ClassifierConfig::default());

        let result = classifier
            .classify("the landlord said to call you", ClassifyOptions::default())
            .await;

        assert_eq!(result.tier, ClassificationTier::Model);
        assert_eq!(result.segment, Segment::Tenant);
        assert_eq!(result.confidence, 88);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert!(result.alternatives.iter().all(|a| a.segment != Segment::Tenant));
    }

    #[tokio::test]
    async fn test_opt_out_of_tier2() {
        let model = CountingModel::new(tenant_verdict());
        let classifier = TieredClassifier::new(Some(model.clone()), &ClassifierConfig::default());
        let options = ClassifyOptions {
            use_tier2: false,
            ..Default::default()
        };

        let result = classifier.classify("how much", options).await;
        assert_eq!(result.tier, ClassificationTier::Pattern);
        assert_eq!(result.segment, Segment::PriceShopper);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_tier1() {
        let model = CountingModel::new(Err(ClassifierError::Timeout(2000)));
        let classifier = TieredClassifier::new(Some(model), &ClassifierConfig::default());

        let result = classifier.classify("how much", ClassifyOptions::default()).await;
        assert_eq!(result.tier, ClassificationTier::Fallback);
        assert_eq!(result.segment, Segment::PriceShopper);
        assert_eq!(result.confidence, 25);
    }

    #[tokio::test]
    async fn test_model_failure_with_no_tier1_uses_default() {
        let model = CountingModel::new(Err(ClassifierError::MalformedResponse("x".into())));
        let classifier = TieredClassifier::new(Some(model), &ClassifierConfig::default());

        let result = classifier.classify("hello there", ClassifyOptions::default()).await;
        assert_eq!(result.tier, ClassificationTier::Fallback);
        assert_eq!(result.segment, Segment::DEFAULT);
        assert_eq!(result.confidence, DEFAULT_SEGMENT_CONFIDENCE);
    }

    #[test]
    fn test_disqualified_segment_dropped() {
        let classifier = TieredClassifier::pattern_only();
        // "rental" alone would suggest a remote landlord
        let result = classifier
            .classify_tier1("it's a rental and I live there, how much")
            .unwrap();
        assert_eq!(result.segment, Segment::PriceShopper);
        assert!(result
            .alternatives
            .iter()
            .all(|a| a.segment != Segment::RemoteLandlord));
    }

    #[test]
    fn test_alternatives_capped() {
        let classifier = TieredClassifier::pattern_only();
        let result = classifier
            .classify_tier1(
                "urgent, how much, on behalf of our client, the landlord, my house, tenant",
            )
            .unwrap();
        assert!(result.alternatives.len() <= 3);
    }
}
