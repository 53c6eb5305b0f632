//! Tier 2 language-model classifier

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use call_assist_core::Segment;
use call_assist_llm::{LlmBackend, Message};
use serde::Deserialize;

use super::ClassifierError;

/// Parsed Tier 2 answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVerdict {
    pub segment: Segment,
    /// 0 - 100
    pub confidence: u8,
    pub signals: Vec<String>,
}

/// Slow, accurate segment classifier
#[async_trait]
pub trait SegmentModel: Send + Sync {
    /// Classify the full accumulated transcript
    async fn classify(&self, transcript: &str) -> Result<ModelVerdict, ClassifierError>;

    fn name(&self) -> &str;
}

/// [`SegmentModel`] backed by an [`LlmBackend`]
pub struct ModelClassifier {
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
}

impl ModelClassifier {
    pub fn new(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    fn system_prompt() -> String {
        let segments = Segment::ALL
            .iter()
            .map(|s| format!("- {}: {}", s.as_str(), describe(*s)))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You classify callers to a home repair and maintenance company.\n\
             Pick exactly one segment for the caller:\n{}\n\n\
             Reply with a single JSON object and nothing else:\n\
             {{\"segment\": \"<segment id>\", \"confidence\": <0-100>, \"signals\": [\"<short quoted cue>\", ...]}}",
            segments
        )
    }
}

fn describe(segment: Segment) -> &'static str {
    match segment {
        Segment::Emergency => "time-critical problem such as flooding, a gas smell or no heat",
        Segment::RemoteLandlord => "owns a let property and does not live in it",
        Segment::Homeowner => "owns and lives in the property",
        Segment::Tenant => "rents the property they live in",
        Segment::PropertyManager => "agent or manager acting for one or more properties",
        Segment::PriceShopper => "mainly comparing prices before committing",
    }
}

#[async_trait]
impl SegmentModel for ModelClassifier {
    async fn classify(&self, transcript: &str) -> Result<ModelVerdict, ClassifierError> {
        let start = Instant::now();
        let messages = [
            Message::system(Self::system_prompt()),
            Message::user(format!("Transcript so far:\n{}", transcript)),
        ];

        let result = tokio::time::timeout(self.timeout, self.backend.generate(&messages))
            .await
            .map_err(|_| ClassifierError::Timeout(self.timeout.as_millis() as u64))??;

        let verdict = parse_verdict(&result.text)?;
        tracing::debug!(
            model = %self.backend.model_name(),
            segment = %verdict.segment,
            confidence = verdict.confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tier 2 classification"
        );
        Ok(verdict)
    }

    fn name(&self) -> &str {
        self.backend.model_name()
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    segment: String,
    confidence: f64,
    #[serde(default)]
    signals: Vec<String>,
}

/// Parse a model reply into a verdict
///
/// The reply may wrap the object in prose or a fenced block; the first
/// balanced JSON object is used.
pub fn parse_verdict(reply: &str) -> Result<ModelVerdict, ClassifierError> {
    let json = first_json_object(reply)
        .ok_or_else(|| ClassifierError::MalformedResponse("no JSON object in reply".into()))?;

    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

    let segment: Segment = raw
        .segment
        .parse()
        .map_err(|_| ClassifierError::UnknownSegment(raw.segment.clone()))?;

    if !raw.confidence.is_finite() {
        return Err(ClassifierError::MalformedResponse(
            "confidence is not a number".into(),
        ));
    }

    Ok(ModelVerdict {
        segment,
        confidence: raw.confidence.round().clamp(0.0, 100.0) as u8,
        signals: raw
            .signals
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    })
}

/// Slice of the first balanced `{...}` in `text`, honouring JSON strings
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use call_assist_llm::{FinishReason, GenerationResult, LlmError};

    struct FixedBackend(&'static str);

    #[async_trait]
    impl LlmBackend for FixedBackend {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResult, LlmError> {
            Ok(GenerationResult {
                text: self.0.to_string(),
                tokens: 10,
                total_time_ms: 1,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn generate(&self, _messages: &[Message]) -> Result<GenerationResult, LlmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(LlmError::Timeout)
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let verdict =
            parse_verdict(r#"{"segment":"tenant","confidence":82,"signals":["my landlord"]}"#)
                .unwrap();
        assert_eq!(verdict.segment, Segment::Tenant);
        assert_eq!(verdict.confidence, 82);
        assert_eq!(verdict.signals, vec!["my landlord"]);
    }

    #[test]
    fn test_parse_fenced_with_prose() {
        let reply = "Sure! Here you go:\n```json\n{\"segment\": \"remote_landlord\", \"confidence\": 140.4, \"signals\": [\"says {rental}\"]}\n```";
        let verdict = parse_verdict(reply).unwrap();
        assert_eq!(verdict.segment, Segment::RemoteLandlord);
        assert_eq!(verdict.confidence, 100);
        assert_eq!(verdict.signals, vec!["says {rental}"]);
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            parse_verdict("I think it's a tenant"),
            Err(ClassifierError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"segment":"astronaut","confidence":90}"#),
            Err(ClassifierError::UnknownSegment(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"segment":"tenant"}"#),
            Err(ClassifierError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_classify_via_backend() {
        let classifier = ModelClassifier::new(
            Arc::new(FixedBackend(
                r#"{"segment":"price_shopper","confidence":-5,"signals":[]}"#,
            )),
            Duration::from_secs(1),
        );
        let verdict = classifier.classify("how much is it").await.unwrap();
        assert_eq!(verdict.segment, Segment::PriceShopper);
        assert_eq!(verdict.confidence, 0);
        assert_eq!(classifier.name(), "fixed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let classifier = ModelClassifier::new(Arc::new(SlowBackend), Duration::from_millis(500));
        let err = classifier.classify("anything").await.unwrap_err();
        assert_eq!(err, ClassifierError::Timeout(500));
    }
}
