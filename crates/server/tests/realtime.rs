//! Gateway end to end: transcript in, broadcasts out, with a stub Tier 2 model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use call_assist_agent::{ClassificationTier, ClassifierError, ModelVerdict, SegmentModel};
use call_assist_config::{JourneyCatalog, Settings};
use call_assist_core::{Destination, FunnelStation, Segment, SpeakerRole};
use call_assist_server::{AppState, OutboundMessage, SnapshotStore};

struct FixedModel(Segment, u8);

#[async_trait]
impl SegmentModel for FixedModel {
    async fn classify(&self, _transcript: &str) -> Result<ModelVerdict, ClassifierError> {
        Ok(ModelVerdict {
            segment: self.0,
            confidence: self.1,
            signals: vec!["acting for the owner".into()],
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn state_with_model(model: Option<Arc<dyn SegmentModel>>) -> AppState {
    AppState::new(Settings::default(), JourneyCatalog::builtin(), model)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(700)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_tier2_result_is_broadcast_after_pause() {
    let state = state_with_model(Some(Arc::new(FixedModel(Segment::PropertyManager, 85))));
    assert!(state.tier2_enabled);
    let mut rx = state.sink.subscribe();

    state.gateway.start_session("call-1", None).unwrap();
    assert!(state.gateway.submit_transcript_chunk(
        "call-1",
        "hello, ringing about a flat where the shower is leaking",
        SpeakerRole::Caller,
    ));
    settle().await;

    let current = state.gateway.session_state("call-1").unwrap();
    assert_eq!(current.detected_segment, Some(Segment::PropertyManager));
    assert_eq!(current.segment_confidence, 85);

    let mut detections = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let OutboundMessage::SegmentDetected { tier, segment, .. } = message {
            detections.push((segment, tier));
        }
    }
    assert_eq!(
        detections.last(),
        Some(&(Segment::PropertyManager, ClassificationTier::Model))
    );
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_segment_is_not_overwritten() {
    let state = state_with_model(Some(Arc::new(FixedModel(Segment::PriceShopper, 95))));
    state.gateway.start_session("call-1", None).unwrap();

    let result = state
        .gateway
        .submit_operator_action("call-1", "select_segment", json!({"segment": "tenant"}));
    assert!(result.success);

    state
        .gateway
        .submit_transcript_chunk("call-1", "the toilet is blocked", SpeakerRole::Caller);
    settle().await;

    let current = state.gateway.session_state("call-1").unwrap();
    assert_eq!(current.detected_segment, Some(Segment::Tenant));
    assert!(current.segment_confirmed);
    assert_eq!(current.captured_info.job.as_deref(), Some("toilet blocked"));
}

#[tokio::test(start_paused = true)]
async fn test_emergency_fast_track_through_gateway() {
    let state = state_with_model(None);
    state.gateway.start_session("call-1", None).unwrap();

    state.gateway.submit_transcript_chunk(
        "call-1",
        "water is pouring through the ceiling, the pipe burst",
        SpeakerRole::Caller,
    );

    let current = state.gateway.session_state("call-1").unwrap();
    assert_eq!(current.detected_segment, Some(Segment::Emergency));
    assert_eq!(current.captured_info.job.as_deref(), Some("pipe burst"));

    let result = state
        .gateway
        .submit_operator_action("call-1", "fast_track", serde_json::Value::Null);
    assert!(result.success, "{:?}", result.error);
    let current = result.state.unwrap();
    assert_eq!(current.current_station, FunnelStation::Destination);
    assert_eq!(current.recommended_destination, Some(Destination::EmergencyDispatch));
}

#[tokio::test]
async fn test_final_snapshot_saved_on_end() {
    let state = state_with_model(None);
    state.gateway.start_session("call-1", Some("ref-9".into())).unwrap();
    state
        .gateway
        .submit_transcript_chunk("call-1", "my name is Priya", SpeakerRole::Caller);

    state.gateway.end_session("call-1").unwrap();
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    let saved = state.snapshots.load("call-1").await.unwrap().unwrap();
    assert_eq!(saved.caller_ref.as_deref(), Some("ref-9"));
    assert_eq!(saved.captured_info.name.as_deref(), Some("Priya"));
}
