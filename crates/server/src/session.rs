//! Session registry
//!
//! Process-wide map from call id to the per-call bundle: state machine,
//! streaming classifier and streaming info extractor. All registry
//! operations take the same lock, so a chunk racing a teardown either sees
//! the live session or none at all.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use call_assist_agent::{
    CallStateMachine, ClassificationResult, JourneyView, StreamingClassifier,
    StreamingInfoExtractor, StreamingOptions, TieredClassifier,
};
use call_assist_config::{JourneyCatalog, ServerConfig};
use call_assist_core::{CallEvent, CallState};

use crate::metrics;
use crate::sink::{BroadcastSink, OutboundMessage};
use crate::snapshot::{spawn_save, SnapshotStore};
use crate::ServerError;

/// Shared collaborators every new session is wired to
#[derive(Clone)]
pub struct SessionDeps {
    pub catalog: Arc<JourneyCatalog>,
    pub classifier: Arc<TieredClassifier>,
    pub streaming: StreamingOptions,
    pub sink: Arc<dyn BroadcastSink>,
    /// `None` disables snapshotting
    pub snapshots: Option<Arc<dyn SnapshotStore>>,
}

/// One active call
pub struct CallSession {
    pub call_id: String,
    machine: Arc<Mutex<CallStateMachine>>,
    classifier: StreamingClassifier,
    extractor: StreamingInfoExtractor,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
    active: AtomicBool,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>, caller_ref: Option<String>, deps: &SessionDeps) -> Self {
        let call_id = call_id.into();
        let machine = Arc::new(Mutex::new(CallStateMachine::new(
            call_id.clone(),
            caller_ref,
            deps.catalog.clone(),
        )));

        // State machine events -> broadcast, plus a snapshot per station move
        {
            let sink = deps.sink.clone();
            let snapshots = deps.snapshots.clone();
            machine.lock().on_any(move |event, state| {
                if let Some(message) = OutboundMessage::from_event(event, state) {
                    sink.send(message);
                }
                if let (CallEvent::StationChanged { .. }, Some(store)) = (event, &snapshots) {
                    spawn_save(store.clone(), state.clone());
                }
                Ok(())
            });
        }

        let on_classified = {
            let machine = machine.clone();
            let sink = deps.sink.clone();
            let call_id = call_id.clone();
            Arc::new(move |result: ClassificationResult| {
                {
                    let mut machine = machine.lock();
                    // A confirmed segment belongs to the operator
                    if machine.state().segment_confirmed {
                        tracing::debug!(
                            call_id = %call_id,
                            segment = %result.segment,
                            "Segment already confirmed, classifier update not applied"
                        );
                    } else {
                        machine.update_segment(
                            result.segment,
                            result.confidence,
                            result.signals.clone(),
                        );
                    }
                }
                metrics::record_classification(result.tier);
                sink.send(OutboundMessage::segment_detected(&call_id, &result));
            })
        };

        let on_info = {
            let machine = machine.clone();
            Arc::new(move |update: call_assist_agent::InfoUpdate| {
                machine.lock().update_captured_info(&update.info);
            })
        };

        let now = Instant::now();
        Self {
            classifier: StreamingClassifier::new(
                deps.classifier.clone(),
                deps.streaming,
                on_classified,
            ),
            extractor: StreamingInfoExtractor::new(on_info),
            call_id,
            machine,
            created_at: now,
            last_activity: RwLock::new(now),
            active: AtomicBool::new(true),
        }
    }

    /// Feed caller speech to the classifier and the extractor
    pub fn feed(&self, text: &str) {
        self.classifier.push_chunk(text);
        self.extractor.push_chunk(text);
    }

    /// Run `f` with exclusive access to the state machine
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut CallStateMachine) -> R) -> R {
        f(&mut self.machine.lock())
    }

    pub fn snapshot(&self) -> CallState {
        self.machine.lock().snapshot()
    }

    pub fn journey_view(&self) -> JourneyView {
        self.machine.lock().journey_view()
    }

    pub fn transcript(&self) -> String {
        self.classifier.transcript()
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Cancel timers and drop buffers; later chunks are ignored
    fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.classifier.shutdown();
        self.extractor.shutdown();
    }
}

/// Registry limits
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub max_sessions: usize,
    pub session_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl From<&ServerConfig> for RegistryConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            session_timeout: Duration::from_secs(config.session_timeout_secs),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<CallSession>>>,
    deps: SessionDeps,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps, config: RegistryConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            deps,
            config,
        }
    }

    /// Periodically end idle sessions; send `true` to stop
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let removed = registry.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = registry.count(),
                                "Session cleanup removed expired calls"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Get or create the session for `call_id`
    ///
    /// Returns the session and whether it was created by this call.
    pub fn start(
        &self,
        call_id: &str,
        caller_ref: Option<String>,
    ) -> Result<(Arc<CallSession>, bool), ServerError> {
        let call_id = call_id.trim();
        if call_id.is_empty() {
            return Err(ServerError::InvalidRequest("call_id must not be empty".to_string()));
        }

        let (session, evicted) = {
            let mut sessions = self.sessions.lock();
            if let Some(existing) = sessions.get(call_id) {
                return Ok((existing.clone(), false));
            }

            let mut evicted = Vec::new();
            if sessions.len() >= self.config.max_sessions {
                evicted = Self::take_expired(&mut sessions, self.config.session_timeout);
                if sessions.len() >= self.config.max_sessions {
                    drop(sessions);
                    self.teardown_all(evicted, "expired");
                    return Err(ServerError::Session(format!(
                        "max sessions reached ({})",
                        self.config.max_sessions
                    )));
                }
            }

            let session = Arc::new(CallSession::new(call_id, caller_ref, &self.deps));
            sessions.insert(call_id.to_string(), session.clone());
            (session, evicted)
        };

        self.teardown_all(evicted, "expired");

        tracing::info!(call_id = %call_id, "Call session started");
        metrics::record_session_created();
        metrics::record_active_sessions(self.count());
        self.deps.sink.send(OutboundMessage::SessionStarted {
            call_id: call_id.to_string(),
            state: session.snapshot(),
        });
        Ok((session, true))
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.lock().get(call_id).cloned()
    }

    /// Refresh idle time; false if the call is unknown
    pub fn touch(&self, call_id: &str) -> bool {
        match self.sessions.lock().get(call_id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Tear down a call, returning its final state
    pub fn end(&self, call_id: &str) -> Option<CallState> {
        let session = self.sessions.lock().remove(call_id)?;
        let final_state = self.teardown(&session, "ended");
        metrics::record_active_sessions(self.count());
        Some(final_state)
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// End idle sessions; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let expired = Self::take_expired(&mut self.sessions.lock(), self.config.session_timeout);
        let removed = expired.len();
        self.teardown_all(expired, "expired");
        if removed > 0 {
            metrics::record_active_sessions(self.count());
        }
        removed
    }

    fn take_expired(
        sessions: &mut HashMap<String, Arc<CallSession>>,
        timeout: Duration,
    ) -> Vec<Arc<CallSession>> {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect()
    }

    fn teardown_all(&self, sessions: Vec<Arc<CallSession>>, reason: &'static str) {
        for session in sessions {
            self.teardown(&session, reason);
        }
    }

    /// Runs after the session left the map
    fn teardown(&self, session: &CallSession, reason: &'static str) -> CallState {
        session.close();
        let final_state = session.snapshot();

        tracing::info!(call_id = %session.call_id, reason, "Call session ended");
        metrics::record_session_ended(reason);
        if let Some(store) = &self.deps.snapshots {
            spawn_save(store.clone(), final_state.clone());
        }
        self.deps.sink.send(OutboundMessage::SessionEnded {
            call_id: session.call_id.clone(),
            final_state: final_state.clone(),
        });
        final_state
    }
}
