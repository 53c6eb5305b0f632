//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use call_assist_agent::{SegmentModel, StreamingOptions, TieredClassifier};
use call_assist_config::{JourneyCatalog, Settings};

use crate::gateway::RealtimeGateway;
use crate::session::{RegistryConfig, SessionDeps, SessionRegistry};
use crate::sink::ChannelBroadcastSink;
use crate::snapshot::{InMemorySnapshotStore, SnapshotStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub gateway: Arc<RealtimeGateway>,
    /// Outbound fan-out; WebSocket clients subscribe here
    pub sink: Arc<ChannelBroadcastSink>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub tier2_enabled: bool,
}

impl AppState {
    /// Build state with the in-memory snapshot store
    ///
    /// `model` is the Tier 2 classifier; `None` runs pattern matching only.
    pub fn new(
        config: Settings,
        catalog: JourneyCatalog,
        model: Option<Arc<dyn SegmentModel>>,
    ) -> Self {
        Self::with_snapshot_store(config, catalog, model, Arc::new(InMemorySnapshotStore::new()))
    }

    pub fn with_snapshot_store(
        config: Settings,
        catalog: JourneyCatalog,
        model: Option<Arc<dyn SegmentModel>>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let classifier = Arc::new(TieredClassifier::new(model, &config.classifier));
        let tier2_enabled = config.classifier.use_tier2 && classifier.has_model();
        let sink = Arc::new(ChannelBroadcastSink::new(config.gateway.broadcast_capacity));

        let deps = SessionDeps {
            catalog: Arc::new(catalog),
            classifier,
            streaming: StreamingOptions::from_config(&config.streaming, &config.classifier),
            sink: sink.clone(),
            snapshots: config
                .gateway
                .persist_snapshots
                .then(|| snapshots.clone()),
        };
        let registry = Arc::new(SessionRegistry::new(
            deps,
            RegistryConfig::from(&config.server),
        ));
        let gateway = Arc::new(RealtimeGateway::new(
            registry.clone(),
            config.gateway.classify_speaker_roles.clone(),
        ));

        Self {
            config: Arc::new(config),
            registry,
            gateway,
            sink,
            snapshots,
            tier2_enabled,
        }
    }
}
