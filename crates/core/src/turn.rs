use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::telemetry::TelemetrySink;

/// Registry key under which the runtime publishes the telemetry sink for a turn.
pub const TELEMETRY_SINK_KEY: &str = "assistant.telemetry_sink";

/// Read-only view of the inbound activity for one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub activity_id: String,
    pub conversation_id: String,
    pub channel_id: String,
    pub text: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

impl TurnMetadata {
    pub fn new(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            activity_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            channel_id: String::new(),
            text: text.into(),
            user_name: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = activity_id.into();
        self
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }
}

/// Per-turn lookup of optional services supplied by the surrounding runtime.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    telemetry_sinks: BTreeMap<String, Arc<dyn TelemetrySink>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.register_telemetry_sink(TELEMETRY_SINK_KEY, sink);
        self
    }

    pub fn register_telemetry_sink(&mut self, key: impl Into<String>, sink: Arc<dyn TelemetrySink>) {
        self.telemetry_sinks.insert(key.into(), sink);
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<dyn TelemetrySink>> {
        self.telemetry_sinks.get(key).cloned()
    }

    pub fn telemetry_sink(&self) -> Option<Arc<dyn TelemetrySink>> {
        self.lookup(TELEMETRY_SINK_KEY)
    }

    pub fn is_empty(&self) -> bool {
        self.telemetry_sinks.is_empty()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("telemetry_sinks", &self.telemetry_sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One inbound turn: the activity plus the capabilities scoped to it.
#[derive(Clone, Debug)]
pub struct TurnContext {
    pub metadata: TurnMetadata,
    pub capabilities: CapabilityRegistry,
}

impl TurnContext {
    pub fn new(metadata: TurnMetadata) -> Self {
        Self { metadata, capabilities: CapabilityRegistry::default() }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn activity_id(&self) -> &str {
        &self.metadata.activity_id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::telemetry::InMemoryTelemetrySink;
    use crate::turn::{CapabilityRegistry, TurnContext, TurnMetadata, TELEMETRY_SINK_KEY};

    #[test]
    fn registry_without_sink_returns_none() {
        let registry = CapabilityRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.telemetry_sink().is_none());
        assert!(registry.lookup("unrelated").is_none());
    }

    #[test]
    fn registry_resolves_sink_by_well_known_key() {
        let sink = Arc::new(InMemoryTelemetrySink::default());
        let registry = CapabilityRegistry::new().with_telemetry_sink(sink);

        assert!(registry.lookup(TELEMETRY_SINK_KEY).is_some());
        assert!(registry.telemetry_sink().is_some());
        assert!(format!("{registry:?}").contains(TELEMETRY_SINK_KEY));
    }

    #[test]
    fn metadata_builder_keeps_explicit_ids() {
        let metadata = TurnMetadata::new("conv1", "Hi")
            .with_activity_id("a1")
            .with_user_name("Alice")
            .with_channel_id("test");
        let turn = TurnContext::new(metadata);

        assert_eq!(turn.activity_id(), "a1");
        assert_eq!(turn.metadata.conversation_id, "conv1");
        assert_eq!(turn.metadata.user_name, "Alice");
        assert_eq!(turn.metadata.channel_id, "test");
    }
}
