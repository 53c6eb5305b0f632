//! Per-call state machine
//!
//! Owns one `CallState` and is the only thing that mutates it. Walks the
//! LISTEN -> SEGMENT -> QUALIFY -> DESTINATION funnel (plus the emergency
//! fast-track) and the segment journey cursor. Every mutation emits a
//! `CallEvent` to the registered listeners; every rejected request emits an
//! `error` event and returns the error without touching state.

use std::collections::BTreeMap;
use std::sync::Arc;

use call_assist_config::JourneyCatalog;
use call_assist_core::{
    CallEvent, CallState, CapturedInfo, Destination, EventKind, FieldValue, FunnelStation,
    InfoField, JourneyStation, OptionAction, Segment, StationOption,
};
use serde::{Deserialize, Serialize};

use crate::events::{EventBus, ListenerId};
use crate::AgentError;

/// Operator-facing view of the journey cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyView {
    pub segment: Option<Segment>,
    pub path: Vec<String>,
    pub current: Option<JourneyStation>,
    pub available_options: Vec<StationOption>,
    pub flags: BTreeMap<String, FieldValue>,
    pub complete: bool,
}

pub struct CallStateMachine {
    state: CallState,
    catalog: Arc<JourneyCatalog>,
    events: EventBus,
}

impl CallStateMachine {
    pub fn new(
        call_id: impl Into<String>,
        caller_ref: Option<String>,
        catalog: Arc<JourneyCatalog>,
    ) -> Self {
        Self::from_state(CallState::new(call_id, caller_ref), catalog)
    }

    /// Wrap a previously saved state
    pub fn from_state(state: CallState, catalog: Arc<JourneyCatalog>) -> Self {
        Self {
            state,
            catalog,
            events: EventBus::new(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.state.call_id
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    /// Owned copy of the current state
    pub fn snapshot(&self) -> CallState {
        self.state.clone()
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&CallEvent, &CallState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    pub fn on_any<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CallEvent, &CallState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.on_any(listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // =========================================================================
    // Funnel
    // =========================================================================

    /// Advance one funnel station if the current one is complete
    pub fn confirm_station(&mut self) -> Result<FunnelStation, AgentError> {
        let from = self.state.current_station;
        let to = match self.next_station() {
            Ok(to) => to,
            Err(reason) => return Err(self.fail(AgentError::InvalidTransition { from, reason })),
        };

        self.state.complete_station(from);
        self.state.enter_station(to);
        if to == FunnelStation::Destination {
            self.recommend_destination();
        }
        self.state.touch();

        tracing::info!(call_id = %self.state.call_id, %from, %to, "Station confirmed");
        self.emit(CallEvent::StationChanged {
            from,
            to,
            fast_track: false,
        });
        Ok(to)
    }

    fn next_station(&self) -> Result<FunnelStation, String> {
        let current = self.state.current_station;
        match current {
            FunnelStation::Listen if self.state.captured_info.job.is_none() => {
                Err("a job must be captured before leaving LISTEN".to_string())
            }
            FunnelStation::Segment if !self.state.segment_confirmed => {
                Err("the segment must be confirmed before leaving SEGMENT".to_string())
            }
            FunnelStation::Qualify if self.state.is_qualified.is_none() => {
                Err("a qualification decision is required before leaving QUALIFY".to_string())
            }
            _ => current
                .next()
                .ok_or_else(|| "DESTINATION is the last station".to_string()),
        }
    }

    /// Jump straight to DESTINATION for an emergency with a known job
    pub fn fast_track_to_destination(&mut self) -> Result<(), AgentError> {
        if let Some(reason) = self.fast_track_blocker() {
            let from = self.state.current_station;
            return Err(self.fail(AgentError::InvalidTransition {
                from,
                reason: reason.to_string(),
            }));
        }
        self.apply_fast_track();
        Ok(())
    }

    fn fast_track_blocker(&self) -> Option<&'static str> {
        if !self.state.detected_segment.map_or(false, |s| s.is_urgent()) {
            Some("fast-track is only available for emergency calls")
        } else if self.state.captured_info.job.is_none() {
            Some("a job must be captured before fast-tracking")
        } else if self.state.current_station == FunnelStation::Destination {
            Some("already at DESTINATION")
        } else {
            None
        }
    }

    fn apply_fast_track(&mut self) {
        let from = self.state.current_station;
        for station in FunnelStation::ALL {
            if station < FunnelStation::Destination {
                self.state.complete_station(station);
            }
        }
        self.state.enter_station(FunnelStation::Destination);
        self.state.recommended_destination = Some(Destination::EmergencyDispatch);
        self.state.touch();

        tracing::info!(call_id = %self.state.call_id, %from, "Fast-tracked to DESTINATION");
        self.emit(CallEvent::StationChanged {
            from,
            to: FunnelStation::Destination,
            fast_track: true,
        });
    }

    fn recommend_destination(&mut self) {
        let segment = self.state.detected_segment.unwrap_or(Segment::DEFAULT);
        self.state.recommended_destination = Some(segment.default_destination());
    }

    // =========================================================================
    // Segment
    // =========================================================================

    /// Provisional classifier output; overwrites whatever was there
    pub fn update_segment(&mut self, segment: Segment, confidence: u8, signals: Vec<String>) {
        if self.state.detected_segment != Some(segment) {
            self.state.segment_confirmed = false;
        }
        self.state.detected_segment = Some(segment);
        self.state.segment_confidence = confidence.min(100);
        self.state.segment_signals = signals;
        self.state.touch();

        self.emit(CallEvent::SegmentDetected {
            segment,
            confidence: self.state.segment_confidence,
            signals: self.state.segment_signals.clone(),
        });
    }

    /// Operator confirmation
    ///
    /// A journey loaded for another segment is discarded before the new
    /// segment's journey starts. Captured info is kept.
    pub fn confirm_segment(&mut self, segment: Segment) {
        let previous = self.state.detected_segment;
        if previous != Some(segment) {
            self.state.segment_signals.clear();
        }
        self.state.detected_segment = Some(segment);
        self.state.segment_confidence = 100;
        self.state.segment_confirmed = true;
        if self.state.current_station == FunnelStation::Destination {
            self.recommend_destination();
        }
        self.state.touch();

        tracing::info!(
            call_id = %self.state.call_id,
            segment = %segment,
            previous = ?previous,
            "Segment confirmed"
        );
        self.emit(CallEvent::SegmentConfirmed { segment, previous });

        if self.state.journey_segment != Some(segment) {
            self.reset_journey();
            self.start_journey(segment);
        }
    }

    fn reset_journey(&mut self) {
        let loaded = self.state.journey_segment;
        let has_state = loaded.is_some()
            || !self.state.journey_path.is_empty()
            || !self.state.journey_flags.is_empty();
        if !has_state {
            return;
        }
        self.state.clear_journey();
        self.state.touch();
        self.emit(CallEvent::JourneyReset { segment: loaded });
    }

    fn start_journey(&mut self, segment: Segment) {
        let catalog = self.catalog.clone();
        let Some(journey) = catalog.get(segment) else {
            tracing::warn!(call_id = %self.state.call_id, segment = %segment, "No journey for segment");
            return;
        };

        self.state.journey_segment = Some(segment);
        self.state.journey_path = vec![journey.entry.clone()];
        self.state.current_journey_station = Some(journey.entry.clone());
        self.state.journey_complete = false;
        self.state.touch();

        self.emit(CallEvent::JourneyStarted {
            segment,
            station: journey.entry.clone(),
        });
    }

    // =========================================================================
    // Captured info, qualification, destination
    // =========================================================================

    /// Merge non-null fields; returns the fields that changed
    pub fn update_captured_info(&mut self, partial: &CapturedInfo) -> Vec<InfoField> {
        let changed = self.state.captured_info.merge(partial);
        if !changed.is_empty() {
            self.state.touch();
            tracing::debug!(call_id = %self.state.call_id, changed = ?changed, "Captured info updated");
            self.emit(CallEvent::InfoCaptured {
                changed: changed.clone(),
                info: self.state.captured_info.clone(),
            });
        }
        changed
    }

    /// Record the qualification decision, once, while at QUALIFY
    pub fn set_qualified(&mut self, qualified: bool, notes: Vec<String>) -> Result<(), AgentError> {
        let from = self.state.current_station;
        let reason = if from != FunnelStation::Qualify {
            Some("qualification can only be recorded at QUALIFY")
        } else if self.state.is_qualified.is_some() {
            Some("qualification has already been recorded")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(self.fail(AgentError::InvalidTransition {
                from,
                reason: reason.to_string(),
            }));
        }

        self.state.is_qualified = Some(qualified);
        self.state.qualification_notes.extend(
            notes
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        );
        self.state.touch();

        self.emit(CallEvent::QualifiedSet {
            qualified,
            notes: self.state.qualification_notes.clone(),
        });
        Ok(())
    }

    /// Operator override of the recommendation
    pub fn select_destination(&mut self, destination: Destination) -> Result<(), AgentError> {
        let from = self.state.current_station;
        if from != FunnelStation::Destination {
            return Err(self.fail(AgentError::InvalidTransition {
                from,
                reason: "a destination can only be selected at DESTINATION".to_string(),
            }));
        }

        self.state.selected_destination = Some(destination);
        self.state.touch();
        tracing::info!(call_id = %self.state.call_id, destination = %destination, "Destination selected");
        self.emit(CallEvent::DestinationSelected { destination });
        Ok(())
    }

    // =========================================================================
    // Journey
    // =========================================================================

    /// Move the journey cursor
    ///
    /// Choice and destination stations need an available option id. Returns
    /// the new station id, or `None` when the journey ended.
    pub fn advance_journey(&mut self, option_id: Option<&str>) -> Result<Option<String>, AgentError> {
        let catalog = self.catalog.clone();
        let station = match self.journey_node(&catalog) {
            Ok(station) => station,
            Err(message) => return Err(self.fail(AgentError::Journey(message))),
        };

        let option = match self.pick_option(station, option_id) {
            Ok(option) => option,
            Err(message) => return Err(self.fail(AgentError::Journey(message))),
        };
        let action = option.and_then(|o| o.action.as_ref());

        // Validate every side effect before touching state
        let mut next = option.map_or_else(|| station.next.clone(), |o| o.next.clone());
        let mut partial = None;
        let mut fast_track = false;
        match action {
            Some(OptionAction::CaptureInfo { field, value }) => {
                match CapturedInfo::single(*field, value) {
                    Ok(p) => partial = Some(p),
                    Err(e) => return Err(self.fail(AgentError::Journey(e.to_string()))),
                }
            }
            Some(OptionAction::Navigate { station: target }) => next = Some(target.clone()),
            Some(OptionAction::FastTrack)
                if self.state.current_station != FunnelStation::Destination =>
            {
                if let Some(reason) = self.fast_track_blocker() {
                    let from = self.state.current_station;
                    return Err(self.fail(AgentError::InvalidTransition {
                        from,
                        reason: reason.to_string(),
                    }));
                }
                fast_track = true;
            }
            _ => {}
        }
        if let Some(target) = &next {
            let known = self
                .state
                .journey_segment
                .and_then(|s| catalog.get(s))
                .map_or(false, |j| j.get(target).is_some());
            if !known {
                let message = format!("station '{}' does not exist", target);
                return Err(self.fail(AgentError::Journey(message)));
            }
        }

        if let Some(OptionAction::SetFlag { flag, value }) = action {
            self.state.journey_flags.insert(flag.clone(), value.clone());
            self.state.touch();
            self.emit(CallEvent::JourneyFlag {
                flag: flag.clone(),
                value: value.clone(),
            });
        }
        if let Some(partial) = partial {
            self.update_captured_info(&partial);
        }
        if fast_track {
            self.apply_fast_track();
        }

        let from = station.id.clone();
        let option_id = option.map(|o| o.id.clone());
        self.state.touch();
        match next {
            Some(to) => {
                self.state.journey_path.push(to.clone());
                self.state.current_journey_station = Some(to.clone());
                tracing::debug!(call_id = %self.state.call_id, %from, %to, "Journey advanced");
                self.emit(CallEvent::JourneyAdvanced {
                    from,
                    to: to.clone(),
                    option_id,
                });
                Ok(Some(to))
            }
            None => {
                self.state.current_journey_station = None;
                self.state.journey_complete = true;
                tracing::debug!(call_id = %self.state.call_id, station = %from, "Journey completed");
                self.emit(CallEvent::JourneyCompleted {
                    station: from,
                    option_id,
                });
                Ok(None)
            }
        }
    }

    fn journey_node<'a>(&self, catalog: &'a JourneyCatalog) -> Result<&'a JourneyStation, String> {
        let Some(current) = self.state.current_journey_station.as_deref() else {
            return Err(if self.state.journey_complete {
                "journey is already complete".to_string()
            } else {
                "no journey in progress".to_string()
            });
        };
        let segment = self
            .state
            .journey_segment
            .ok_or_else(|| "no journey in progress".to_string())?;
        catalog
            .get(segment)
            .and_then(|j| j.get(current))
            .ok_or_else(|| format!("station '{}' does not exist for {}", current, segment))
    }

    fn pick_option<'a>(
        &self,
        station: &'a JourneyStation,
        option_id: Option<&str>,
    ) -> Result<Option<&'a StationOption>, String> {
        if !station.kind.requires_option() {
            return match option_id {
                Some(id) => Err(format!("station '{}' takes no option, got '{}'", station.id, id)),
                None => Ok(None),
            };
        }
        let id = option_id.ok_or_else(|| format!("station '{}' requires an option", station.id))?;
        let option = station
            .find_option(id)
            .ok_or_else(|| format!("station '{}' has no option '{}'", station.id, id))?;
        if !option.is_available(&self.state) {
            return Err(format!("option '{}' is not available", id));
        }
        Ok(Some(option))
    }

    /// Step the cursor back one station
    ///
    /// A completed journey reopens at its last station. Flags and captured
    /// info written on the way are kept.
    pub fn go_back_in_journey(&mut self) -> Result<String, AgentError> {
        if self.state.journey_complete {
            let Some(last) = self.state.journey_path.last().cloned() else {
                return Err(self.fail(AgentError::Journey("nothing to go back to".to_string())));
            };
            self.state.journey_complete = false;
            self.state.current_journey_station = Some(last.clone());
            self.state.touch();
            self.emit(CallEvent::JourneyBack {
                from: None,
                to: last.clone(),
            });
            return Ok(last);
        }

        if self.state.journey_path.len() < 2 {
            let message = if self.state.journey_path.is_empty() {
                "no journey in progress"
            } else {
                "already at the start of the journey"
            };
            return Err(self.fail(AgentError::Journey(message.to_string())));
        }

        let from = self.state.journey_path.pop();
        let to = self.state.journey_path.last().cloned().unwrap_or_default();
        self.state.current_journey_station = Some(to.clone());
        self.state.touch();
        self.emit(CallEvent::JourneyBack {
            from,
            to: to.clone(),
        });
        Ok(to)
    }

    pub fn current_journey_station(&self) -> Option<&JourneyStation> {
        let current = self.state.current_journey_station.as_deref()?;
        self.catalog
            .get(self.state.journey_segment?)
            .and_then(|j| j.get(current))
    }

    /// Options on the current station whose condition holds
    pub fn available_options(&self) -> Vec<&StationOption> {
        self.current_journey_station()
            .map(|s| s.available_options(&self.state))
            .unwrap_or_default()
    }

    pub fn journey_view(&self) -> JourneyView {
        JourneyView {
            segment: self.state.journey_segment,
            path: self.state.journey_path.clone(),
            current: self.current_journey_station().cloned(),
            available_options: self.available_options().into_iter().cloned().collect(),
            flags: self.state.journey_flags.clone(),
            complete: self.state.journey_complete,
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_json(&self) -> Result<String, AgentError> {
        Ok(serde_json::to_string(&self.state)?)
    }

    /// Restore from `to_json` output; listeners are not restored
    pub fn from_json(json: &str, catalog: Arc<JourneyCatalog>) -> Result<Self, AgentError> {
        let state: CallState = serde_json::from_str(json)?;
        Ok(Self::from_state(state, catalog))
    }

    fn emit(&self, event: CallEvent) {
        self.events.emit(&event, &self.state);
    }

    fn fail(&self, err: AgentError) -> AgentError {
        tracing::warn!(call_id = %self.state.call_id, error = %err, "Rejected call state change");
        self.emit(CallEvent::Error {
            message: err.to_string(),
        });
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn machine() -> CallStateMachine {
        CallStateMachine::new("call-1", None, Arc::new(JourneyCatalog::builtin()))
    }

    fn with_job(m: &mut CallStateMachine, job: &str) {
        m.update_captured_info(&CapturedInfo {
            job: Some(job.into()),
            ..Default::default()
        });
    }

    fn recorder(m: &CallStateMachine) -> Arc<Mutex<Vec<EventKind>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        m.on_any(move |e, _| {
            sink.lock().push(e.kind());
            Ok(())
        });
        log
    }

    #[test]
    fn test_full_funnel() {
        let mut m = machine();
        assert!(m.confirm_station().is_err());

        with_job(&mut m, "fix boiler");
        assert_eq!(m.confirm_station().unwrap(), FunnelStation::Segment);
        assert!(m.confirm_station().is_err());

        m.confirm_segment(Segment::Tenant);
        assert_eq!(m.confirm_station().unwrap(), FunnelStation::Qualify);
        assert!(m.confirm_station().is_err());

        m.set_qualified(true, vec!["covered area".into()]).unwrap();
        assert_eq!(m.confirm_station().unwrap(), FunnelStation::Destination);
        assert_eq!(m.state().recommended_destination, Some(Destination::OwnerApproval));
        assert!(m.confirm_station().is_err());

        assert_eq!(
            m.state().completed_stations,
            vec![FunnelStation::Listen, FunnelStation::Segment, FunnelStation::Qualify]
        );
    }

    #[test]
    fn test_rejection_emits_error_and_keeps_state() {
        let mut m = machine();
        let log = recorder(&m);
        let before = m.snapshot();

        let err = m.confirm_station().unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { from: FunnelStation::Listen, .. }));
        assert_eq!(*log.lock(), vec![EventKind::Error]);
        assert_eq!(m.state().current_station, before.current_station);
    }

    #[test]
    fn test_fast_track() {
        let mut m = machine();
        m.update_segment(Segment::Emergency, 75, vec!["burst pipe".into()]);
        assert!(m.fast_track_to_destination().is_err());
        assert_eq!(m.state().current_station, FunnelStation::Listen);

        with_job(&mut m, "burst pipe");
        m.fast_track_to_destination().unwrap();
        assert_eq!(m.state().current_station, FunnelStation::Destination);
        assert_eq!(m.state().completed_stations.len(), 3);
        assert_eq!(m.state().recommended_destination, Some(Destination::EmergencyDispatch));
        assert!(m.fast_track_to_destination().is_err());
    }

    #[test]
    fn test_fast_track_requires_emergency() {
        let mut m = machine();
        with_job(&mut m, "fix tap");
        m.update_segment(Segment::Homeowner, 50, vec![]);
        assert!(m.fast_track_to_destination().is_err());
    }

    #[test]
    fn test_qualified_only_once_at_qualify() {
        let mut m = machine();
        assert!(m.set_qualified(true, vec![]).is_err());

        with_job(&mut m, "fix boiler");
        m.confirm_station().unwrap();
        m.confirm_segment(Segment::Homeowner);
        m.confirm_station().unwrap();

        m.set_qualified(false, vec!["  ".into(), "outside area".into()]).unwrap();
        assert_eq!(m.state().qualification_notes, vec!["outside area".to_string()]);
        assert!(m.set_qualified(true, vec![]).is_err());
        assert_eq!(m.state().is_qualified, Some(false));
    }

    #[test]
    fn test_select_destination_only_at_destination() {
        let mut m = machine();
        assert!(m.select_destination(Destination::Callback).is_err());

        m.update_segment(Segment::Emergency, 90, vec![]);
        with_job(&mut m, "gas leak");
        m.fast_track_to_destination().unwrap();
        m.select_destination(Destination::Callback).unwrap();
        assert_eq!(m.state().effective_destination(), Some(Destination::Callback));
        assert_eq!(m.state().recommended_destination, Some(Destination::EmergencyDispatch));
    }

    #[test]
    fn test_confirm_segment_starts_journey() {
        let mut m = machine();
        let log = recorder(&m);
        m.confirm_segment(Segment::Homeowner);

        assert_eq!(m.state().segment_confidence, 100);
        assert_eq!(m.state().journey_path, vec!["describe".to_string()]);
        assert_eq!(m.current_journey_station().unwrap().id, "describe");
        assert_eq!(
            *log.lock(),
            vec![EventKind::SegmentConfirmed, EventKind::JourneyStarted]
        );

        // Same segment again keeps the journey where it is
        m.advance_journey(None).unwrap();
        m.confirm_segment(Segment::Homeowner);
        assert_eq!(m.state().current_journey_station.as_deref(), Some("timing"));
    }

    #[test]
    fn test_segment_change_resets_journey() {
        let mut m = machine();
        m.confirm_segment(Segment::Homeowner);
        m.advance_journey(None).unwrap();
        m.advance_journey(Some("today")).unwrap();
        assert!(m.state().journey_flags.contains_key("wants_today"));

        let log = recorder(&m);
        let paths = Arc::new(Mutex::new(Vec::new()));
        let sink = paths.clone();
        m.on(EventKind::JourneyReset, move |_, state| {
            sink.lock().push((state.journey_path.clone(), state.current_journey_station.clone()));
            Ok(())
        });

        m.confirm_segment(Segment::Tenant);
        assert_eq!(*paths.lock(), vec![(Vec::new(), None)]);
        assert_eq!(
            *log.lock(),
            vec![
                EventKind::SegmentConfirmed,
                EventKind::JourneyReset,
                EventKind::JourneyStarted
            ]
        );
        assert_eq!(m.state().journey_path, vec!["relationship".to_string()]);
        assert!(m.state().journey_flags.is_empty());
    }

    #[test]
    fn test_provisional_segment_change_then_confirm_resets() {
        let mut m = machine();
        m.confirm_segment(Segment::Homeowner);
        m.update_segment(Segment::Tenant, 60, vec!["landlord".into()]);
        assert!(!m.state().segment_confirmed);

        m.confirm_segment(Segment::Tenant);
        assert_eq!(m.state().journey_segment, Some(Segment::Tenant));
        assert_eq!(m.state().journey_path, vec!["relationship".to_string()]);
    }

    #[test]
    fn test_choice_requires_available_option() {
        let mut m = machine();
        m.confirm_segment(Segment::Homeowner);
        m.advance_journey(None).unwrap();

        assert!(matches!(m.advance_journey(None), Err(AgentError::Journey(_))));
        assert!(m.advance_journey(Some("someday")).is_err());
        m.advance_journey(Some("flexible")).unwrap();

        // No contact yet, so only "take_contact" is offered
        let ids: Vec<_> = m.available_options().iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec!["take_contact".to_string()]);
        assert!(m.advance_journey(Some("have_contact")).is_err());
        assert_eq!(m.state().current_journey_station.as_deref(), Some("contact"));
    }

    #[test]
    fn test_info_station_rejects_option() {
        let mut m = machine();
        m.confirm_segment(Segment::Homeowner);
        assert!(m.advance_journey(Some("today")).is_err());
    }

    #[test]
    fn test_capture_info_action() {
        let mut m = machine();
        m.confirm_segment(Segment::RemoteLandlord);
        let log = recorder(&m);

        m.advance_journey(Some("confirmed")).unwrap();
        assert_eq!(m.state().captured_info.remote_owner, Some(true));
        assert_eq!(
            *log.lock(),
            vec![EventKind::InfoCaptured, EventKind::JourneyAdvanced]
        );
    }

    #[test]
    fn test_terminal_option_completes_journey() {
        let mut m = machine();
        m.confirm_segment(Segment::PriceShopper);
        m.advance_journey(None).unwrap();
        m.advance_journey(Some("comparing")).unwrap();
        assert_eq!(m.advance_journey(Some("callback")).unwrap(), None);

        assert!(m.state().journey_complete);
        assert_eq!(m.state().current_journey_station, None);
        assert_eq!(m.state().journey_path.len(), 3);
        assert!(m.advance_journey(Some("callback")).is_err());
    }

    #[test]
    fn test_fast_track_option() {
        let mut m = machine();
        m.confirm_segment(Segment::Emergency);
        m.advance_journey(None).unwrap();
        m.advance_journey(Some("isolated")).unwrap();
        m.advance_journey(Some("on_site")).unwrap();

        // Gated on a captured job
        assert!(m.advance_journey(Some("dispatch_now")).is_err());
        with_job(&mut m, "burst pipe");
        assert_eq!(m.advance_journey(Some("dispatch_now")).unwrap(), None);
        assert_eq!(m.state().current_station, FunnelStation::Destination);
        assert!(m.state().journey_complete);
    }

    #[test]
    fn test_go_back() {
        let mut m = machine();
        assert!(m.go_back_in_journey().is_err());

        m.confirm_segment(Segment::PropertyManager);
        assert!(m.go_back_in_journey().is_err());

        m.advance_journey(Some("new")).unwrap();
        assert_eq!(m.go_back_in_journey().unwrap(), "account");
        // Flag stays after going back
        assert!(m.state().journey_flags.contains_key("existing_account"));

        m.advance_journey(Some("new")).unwrap();
        m.advance_journey(Some("handover")).unwrap();
        assert!(m.state().journey_complete);
        assert_eq!(m.go_back_in_journey().unwrap(), "route");
        assert!(!m.state().journey_complete);
        assert_eq!(m.state().current_journey_station.as_deref(), Some("route"));
    }

    #[test]
    fn test_journey_view() {
        let mut m = machine();
        assert_eq!(m.journey_view().current, None);

        m.confirm_segment(Segment::PropertyManager);
        m.advance_journey(Some("new")).unwrap();
        let view = m.journey_view();
        assert_eq!(view.segment, Some(Segment::PropertyManager));
        assert_eq!(view.current.unwrap().id, "route");
        // "book_direct" needs an existing account
        let ids: Vec<_> = view.available_options.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["handover"]);
    }

    #[test]
    fn test_json_round_trip() {
        let catalog = Arc::new(JourneyCatalog::builtin());
        let mut m = CallStateMachine::new("call-9", Some("+441632960000".into()), catalog.clone());
        with_job(&mut m, "fix boiler");
        m.confirm_segment(Segment::Tenant);
        m.advance_journey(None).unwrap();

        let json = m.to_json().unwrap();
        let restored = CallStateMachine::from_json(&json, catalog).unwrap();
        assert_eq!(restored.state(), m.state());
        assert_eq!(restored.current_journey_station().unwrap().id, "landlord_aware");
        assert!(CallStateMachine::from_json("{", Arc::new(JourneyCatalog::builtin())).is_err());
    }

    #[test]
    fn test_updated_at_monotonic() {
        let mut m = machine();
        let mut last = m.state().updated_at;
        for job in ["a", "b", "c"] {
            with_job(&mut m, job);
            assert!(m.state().updated_at >= last);
            last = m.state().updated_at;
        }
    }
}
