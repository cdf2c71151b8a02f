use std::sync::Arc;
use std::time::Duration;

use assistant_core::config::AppConfig;
use assistant_core::knowledge::{
    KnowledgeBaseEndpoint, QueryClient, QueryError, QueryOptions, QueryResult,
};
use assistant_core::telemetry::{qna_keys, TelemetryEvent, TelemetrySink, QNA_MESSAGE_EVENT};
use assistant_core::turn::{TurnContext, TurnMetadata};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{HttpQueryClient, DEFAULT_TIMEOUT};

pub const NO_MATCH_QUESTION: &str = "No Qna Question matched";
pub const NO_MATCH_ANSWER: &str = "No Qna Answer matched";
pub const DEFAULT_EMISSION_TIMEOUT: Duration = Duration::from_secs(2);

/// Queries a knowledge base and reports every query as a `QnaMessage` telemetry event.
///
/// Results are returned exactly as the underlying client produced them. Telemetry is
/// only sent when the turn carries a sink, and a slow or failing sink never changes the
/// outcome of the query.
pub struct InstrumentedKnowledgeBase<C = HttpQueryClient> {
    knowledge_base_id: String,
    options: QueryOptions,
    log_personal_information: bool,
    emission_timeout: Duration,
    client: C,
}

impl InstrumentedKnowledgeBase<HttpQueryClient> {
    pub fn new(
        endpoint: KnowledgeBaseEndpoint,
        options: QueryOptions,
        log_personal_information: bool,
    ) -> Result<Self, QueryError> {
        let knowledge_base_id = endpoint.knowledge_base_id.clone();
        let client = HttpQueryClient::new(endpoint, DEFAULT_TIMEOUT)?;
        Self::with_client(knowledge_base_id, options, log_personal_information, client)
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, QueryError> {
        let knowledge_base = &config.knowledge_base;
        let client = HttpQueryClient::new(knowledge_base.endpoint(), knowledge_base.timeout())?;
        Ok(Self::with_client(
            knowledge_base.id.clone(),
            knowledge_base.query_options(),
            config.telemetry.log_personal_information,
            client,
        )?
        .with_emission_timeout(config.telemetry.emission_timeout()))
    }
}

impl<C> InstrumentedKnowledgeBase<C>
where
    C: QueryClient,
{
    /// Wraps an alternate transport.
    pub fn with_client(
        knowledge_base_id: impl Into<String>,
        options: QueryOptions,
        log_personal_information: bool,
        client: C,
    ) -> Result<Self, QueryError> {
        options.validate()?;
        Ok(Self {
            knowledge_base_id: knowledge_base_id.into(),
            options,
            log_personal_information,
            emission_timeout: DEFAULT_EMISSION_TIMEOUT,
            client,
        })
    }

    pub fn with_emission_timeout(mut self, emission_timeout: Duration) -> Self {
        self.emission_timeout = emission_timeout;
        self
    }

    pub fn knowledge_base_id(&self) -> &str {
        &self.knowledge_base_id
    }

    pub fn log_personal_information(&self) -> bool {
        self.log_personal_information
    }

    pub async fn get_answers(&self, turn: &TurnContext) -> Result<Vec<QueryResult>, QueryError> {
        let results = self.client.query(&turn.metadata.text, &self.options).await?;
        self.record(turn, &results).await;
        Ok(results)
    }

    /// Like [`get_answers`](Self::get_answers), but abandons the query once `cancel`
    /// fires. A cancelled call never emits telemetry.
    pub async fn get_answers_with_cancellation(
        &self,
        turn: &TurnContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            results = self.client.query(&turn.metadata.text, &self.options) => Some(results?),
        };

        let Some(results) = results.filter(|_| !cancel.is_cancelled()) else {
            info!(
                event_name = "qna.query.cancelled",
                correlation_id = %turn.activity_id(),
                knowledge_base_id = %self.knowledge_base_id,
                "knowledge base query cancelled with its turn"
            );
            return Err(QueryError::Cancelled);
        };

        self.record(turn, &results).await;
        Ok(results)
    }

    async fn record(&self, turn: &TurnContext, results: &[QueryResult]) {
        info!(
            event_name = "qna.query.completed",
            correlation_id = %turn.activity_id(),
            knowledge_base_id = %self.knowledge_base_id,
            result_count = results.len(),
            "knowledge base query completed"
        );

        let Some(sink) = turn.capabilities.telemetry_sink() else {
            debug!(
                event_name = "qna.telemetry.skipped",
                correlation_id = %turn.activity_id(),
                "no telemetry sink registered for turn"
            );
            return;
        };

        let event = build_qna_event(
            &self.knowledge_base_id,
            &turn.metadata,
            results,
            self.log_personal_information,
        );
        self.emit(sink, event, &turn.metadata).await;
    }

    async fn emit(&self, sink: Arc<dyn TelemetrySink>, event: TelemetryEvent, metadata: &TurnMetadata) {
        match tokio::time::timeout(self.emission_timeout, sink.track_event(event, metadata)).await {
            Ok(Ok(())) => debug!(
                event_name = "qna.telemetry.emitted",
                correlation_id = %metadata.activity_id,
                "qna telemetry event emitted"
            ),
            Ok(Err(error)) => warn!(
                event_name = "qna.telemetry.failed",
                correlation_id = %metadata.activity_id,
                error = %error,
                "qna telemetry emission failed"
            ),
            Err(_) => warn!(
                event_name = "qna.telemetry.timed_out",
                correlation_id = %metadata.activity_id,
                timeout_ms = self.emission_timeout.as_millis() as u64,
                "qna telemetry emission timed out"
            ),
        }
    }
}

/// Builds the `QnaMessage` event for one query.
///
/// `OriginalQuestion` and `Username` are personal information and are only attached
/// when `log_personal_information` is set and the value is not blank.
pub fn build_qna_event(
    knowledge_base_id: &str,
    metadata: &TurnMetadata,
    results: &[QueryResult],
    log_personal_information: bool,
) -> TelemetryEvent {
    let mut event = TelemetryEvent::new(QNA_MESSAGE_EVENT)
        .with_property(qna_keys::KNOWLEDGE_BASE_ID, knowledge_base_id)
        .with_property(qna_keys::ACTIVITY_ID, metadata.activity_id.as_str());

    if !metadata.conversation_id.is_empty() {
        event = event.with_property(qna_keys::CONVERSATION_ID, metadata.conversation_id.as_str());
    }

    if log_personal_information {
        if !metadata.text.trim().is_empty() {
            event = event.with_property(qna_keys::ORIGINAL_QUESTION, metadata.text.as_str());
        }
        if !metadata.user_name.trim().is_empty() {
            event = event.with_property(qna_keys::USERNAME, metadata.user_name.as_str());
        }
    }

    match results.first() {
        Some(top) => event
            .with_property(
                qna_keys::QUESTION,
                serde_json::to_string(&top.questions).unwrap_or_default(),
            )
            .with_property(qna_keys::ANSWER, top.answer.as_str())
            .with_property(qna_keys::ARTICLE_FOUND, "true")
            .with_metric(qna_keys::QUESTION_ID, top.id as f64)
            .with_metric(qna_keys::SCORE, top.score),
        None => event
            .with_property(qna_keys::QUESTION, NO_MATCH_QUESTION)
            .with_property(qna_keys::ANSWER, NO_MATCH_ANSWER)
            .with_property(qna_keys::ARTICLE_FOUND, "false")
            .with_metric(qna_keys::QUESTION_ID, -1.0),
    }
}
