use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::turn::TurnMetadata;

/// Custom event name every knowledge-base query is reported under.
pub const QNA_MESSAGE_EVENT: &str = "QnaMessage";

/// Property and metric keys of the `QnaMessage` event. Downstream consumers depend on
/// these exact spellings.
pub mod qna_keys {
    pub const KNOWLEDGE_BASE_ID: &str = "KnowledgeBaseId";
    pub const ACTIVITY_ID: &str = "ActivityId";
    pub const CONVERSATION_ID: &str = "ConversationId";
    pub const ORIGINAL_QUESTION: &str = "OriginalQuestion";
    pub const USERNAME: &str = "Username";
    pub const QUESTION: &str = "Question";
    pub const ANSWER: &str = "Answer";
    pub const ARTICLE_FOUND: &str = "ArticleFound";
    pub const QUESTION_ID: &str = "QuestionId";
    pub const SCORE: &str = "Score";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub properties: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

impl TelemetryEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), properties: BTreeMap::new(), metrics: BTreeMap::new() }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EmissionError {
    #[error("telemetry sink rejected event: {0}")]
    Rejected(String),
    #[error("telemetry sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for custom telemetry events. Callers treat delivery as fire-and-forget.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn track_event(
        &self,
        event: TelemetryEvent,
        activity: &TurnMetadata,
    ) -> Result<(), EmissionError>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub event: TelemetryEvent,
    pub activity_id: String,
    pub conversation_id: String,
}

#[derive(Clone, Default)]
pub struct InMemoryTelemetrySink {
    events: Arc<Mutex<Vec<TrackedEvent>>>,
}

impl InMemoryTelemetrySink {
    pub fn events(&self) -> Vec<TrackedEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl TelemetrySink for InMemoryTelemetrySink {
    async fn track_event(
        &self,
        event: TelemetryEvent,
        activity: &TurnMetadata,
    ) -> Result<(), EmissionError> {
        let tracked = TrackedEvent {
            event,
            activity_id: activity.activity_id.clone(),
            conversation_id: activity.conversation_id.clone(),
        };
        match self.events.lock() {
            Ok(mut events) => events.push(tracked),
            Err(poisoned) => poisoned.into_inner().push(tracked),
        }
        Ok(())
    }
}

/// Writes telemetry events into the `tracing` stream instead of a remote backend.
#[derive(Clone, Debug, Default)]
pub struct TracingTelemetrySink;

#[async_trait]
impl TelemetrySink for TracingTelemetrySink {
    async fn track_event(
        &self,
        event: TelemetryEvent,
        activity: &TurnMetadata,
    ) -> Result<(), EmissionError> {
        let properties = serde_json::to_string(&loggable_properties(&event.properties))
            .map_err(|error| EmissionError::Rejected(error.to_string()))?;
        let metrics = serde_json::to_string(&event.metrics)
            .map_err(|error| EmissionError::Rejected(error.to_string()))?;

        info!(
            event_name = "telemetry.custom_event",
            telemetry_event = %event.name,
            correlation_id = %activity.activity_id,
            conversation_id = %activity.conversation_id,
            channel_id = %activity.channel_id,
            properties = %properties,
            metrics = %metrics,
            "custom telemetry event"
        );
        Ok(())
    }
}

/// Event properties minus the ones that identify the user.
fn loggable_properties(properties: &BTreeMap<String, String>) -> BTreeMap<&str, &str> {
    properties
        .iter()
        .filter(|(key, _)| !PERSONAL_PROPERTIES.contains(&key.as_str()))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

const PERSONAL_PROPERTIES: [&str; 2] = [qna_keys::ORIGINAL_QUESTION, qna_keys::USERNAME];

#[cfg(test)]
mod tests {
    use crate::telemetry::{
        loggable_properties, qna_keys, InMemoryTelemetrySink, TelemetryEvent, TelemetrySink, TracingTelemetrySink,
        QNA_MESSAGE_EVENT,
    };
    use crate::turn::TurnMetadata;

    #[tokio::test]
    async fn in_memory_sink_records_events_with_activity_tags() {
        let sink = InMemoryTelemetrySink::default();
        let activity = TurnMetadata::new("conv-9", "hello").with_activity_id("act-9");

        sink.track_event(
            TelemetryEvent::new(QNA_MESSAGE_EVENT)
                .with_property(qna_keys::ACTIVITY_ID, "act-9")
                .with_metric(qna_keys::QUESTION_ID, -1.0),
            &activity,
        )
        .await
        .expect("in-memory sink never fails");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].activity_id, "act-9");
        assert_eq!(events[0].conversation_id, "conv-9");
        assert_eq!(events[0].event.name, "QnaMessage");
        assert_eq!(events[0].event.metric(qna_keys::QUESTION_ID), Some(-1.0));
    }

    #[tokio::test]
    async fn tracing_sink_accepts_events() {
        let sink = TracingTelemetrySink;
        let activity = TurnMetadata::new("", "");
        let result = sink
            .track_event(TelemetryEvent::new(QNA_MESSAGE_EVENT).with_property("Answer", "x"), &activity)
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn personal_properties_are_kept_out_of_log_lines() {
        let event = TelemetryEvent::new(QNA_MESSAGE_EVENT)
            .with_property(qna_keys::ORIGINAL_QUESTION, "Where is my parcel?")
            .with_property(qna_keys::USERNAME, "Alice")
            .with_property(qna_keys::ANSWER, "On its way");

        let logged = loggable_properties(&event.properties);

        assert_eq!(logged.len(), 1);
        assert_eq!(logged.get(qna_keys::ANSWER), Some(&"On its way"));
        assert!(!logged.contains_key(qna_keys::USERNAME));
        assert!(!logged.contains_key(qna_keys::ORIGINAL_QUESTION));
    }
}
