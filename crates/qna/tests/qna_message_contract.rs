use std::sync::Arc;

use assistant_core::knowledge::{QueryClient, QueryError, QueryOptions, QueryResult};
use assistant_core::telemetry::{qna_keys, InMemoryTelemetrySink, TelemetryEvent};
use assistant_core::turn::{CapabilityRegistry, TurnContext, TurnMetadata};
use assistant_qna::{build_qna_event, InstrumentedKnowledgeBase};
use async_trait::async_trait;

struct FixedClient(Vec<QueryResult>);

#[async_trait]
impl QueryClient for FixedClient {
    async fn query(
        &self,
        _question: &str,
        _options: &QueryOptions,
    ) -> Result<Vec<QueryResult>, QueryError> {
        Ok(self.0.clone())
    }
}

const ALLOWED_PROPERTIES: [&str; 8] = [
    qna_keys::KNOWLEDGE_BASE_ID,
    qna_keys::ACTIVITY_ID,
    qna_keys::CONVERSATION_ID,
    qna_keys::ORIGINAL_QUESTION,
    qna_keys::USERNAME,
    qna_keys::QUESTION,
    qna_keys::ANSWER,
    qna_keys::ARTICLE_FOUND,
];

fn policy_match() -> QueryResult {
    QueryResult {
        id: 7,
        questions: vec!["policy?".to_string()],
        answer: "30 days".to_string(),
        score: 0.87,
    }
}

async fn run_query(
    log_personal_information: bool,
    metadata: TurnMetadata,
    results: Vec<QueryResult>,
    sink: Option<Arc<InMemoryTelemetrySink>>,
) -> Vec<QueryResult> {
    let kb = InstrumentedKnowledgeBase::with_client(
        "kb1",
        QueryOptions::default(),
        log_personal_information,
        FixedClient(results),
    )
    .expect("valid options");

    let mut registry = CapabilityRegistry::new();
    if let Some(sink) = sink {
        registry = registry.with_telemetry_sink(sink);
    }
    kb.get_answers(&TurnContext::new(metadata).with_capabilities(registry))
        .await
        .expect("fixed client never fails")
}

fn only_event(sink: &InMemoryTelemetrySink) -> TelemetryEvent {
    let events = sink.events();
    assert_eq!(events.len(), 1, "exactly one event per query");
    events[0].event.clone()
}

#[tokio::test]
async fn no_match_without_personal_information() {
    let sink = Arc::new(InMemoryTelemetrySink::default());
    let metadata = TurnMetadata::new("", "Hi").with_activity_id("a1").with_user_name("Alice");

    run_query(false, metadata, Vec::new(), Some(sink.clone())).await;

    let event = only_event(&sink);
    assert_eq!(event.name, "QnaMessage");
    let expected_properties = [
        ("ActivityId", "a1"),
        ("Answer", "No Qna Answer matched"),
        ("ArticleFound", "false"),
        ("KnowledgeBaseId", "kb1"),
        ("Question", "No Qna Question matched"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect();
    assert_eq!(event.properties, expected_properties);
    assert_eq!(event.metrics, [("QuestionId".to_string(), -1.0)].into_iter().collect());
}

#[tokio::test]
async fn match_with_personal_information() {
    let sink = Arc::new(InMemoryTelemetrySink::default());
    let metadata = TurnMetadata::new("conv1", "What is the return policy?")
        .with_activity_id("a1")
        .with_user_name("Alice");

    run_query(true, metadata, vec![policy_match()], Some(sink.clone())).await;

    let event = only_event(&sink);
    assert_eq!(event.property("OriginalQuestion"), Some("What is the return policy?"));
    assert_eq!(event.property("Username"), Some("Alice"));
    assert_eq!(event.property("ConversationId"), Some("conv1"));
    assert_eq!(event.property("Question"), Some(r#"["policy?"]"#));
    assert_eq!(event.property("Answer"), Some("30 days"));
    assert_eq!(event.property("ArticleFound"), Some("true"));
    assert_eq!(event.metric("QuestionId"), Some(7.0));
    assert_eq!(event.metric("Score"), Some(0.87));
}

#[tokio::test]
async fn absent_sink_returns_results_unchanged() {
    let results = vec![policy_match(), QueryResult { id: 8, score: 0.5, ..policy_match() }];

    let returned = run_query(
        true,
        TurnMetadata::new("conv1", "policy").with_activity_id("a1"),
        results.clone(),
        None,
    )
    .await;

    assert_eq!(returned, results);
}

#[tokio::test]
async fn returned_results_match_client_output_with_sink() {
    let sink = Arc::new(InMemoryTelemetrySink::default());
    let results = vec![policy_match(), QueryResult { id: 3, score: 0.4, ..policy_match() }];

    let returned = run_query(
        false,
        TurnMetadata::new("conv1", "policy").with_activity_id("a1"),
        results.clone(),
        Some(sink.clone()),
    )
    .await;

    assert_eq!(returned, results);
    assert_eq!(only_event(&sink).metric("QuestionId"), Some(7.0));
}

#[test]
fn property_presence_follows_flag_and_inputs() {
    for log_personal_information in [false, true] {
        for text in ["", "   ", "Where is my order?"] {
            for user_name in ["", " ", "Alice"] {
                for conversation_id in ["", "conv1"] {
                    for results in [Vec::new(), vec![policy_match()]] {
                        let metadata = TurnMetadata::new(conversation_id, text)
                            .with_activity_id("a1")
                            .with_user_name(user_name);
                        let event =
                            build_qna_event("kb1", &metadata, &results, log_personal_information);

                        assert_eq!(
                            event.properties.contains_key("OriginalQuestion"),
                            log_personal_information && !text.trim().is_empty()
                        );
                        assert_eq!(
                            event.properties.contains_key("Username"),
                            log_personal_information && !user_name.trim().is_empty()
                        );
                        assert_eq!(
                            event.properties.contains_key("ConversationId"),
                            !conversation_id.is_empty()
                        );
                        assert_eq!(
                            event.property("ArticleFound"),
                            Some(if results.is_empty() { "false" } else { "true" })
                        );
                        assert_eq!(event.metrics.contains_key("Score"), !results.is_empty());
                        assert!(event
                            .properties
                            .keys()
                            .all(|key| ALLOWED_PROPERTIES.contains(&key.as_str())));
                        assert!(event.metrics.keys().all(|key| key == "QuestionId" || key == "Score"));
                    }
                }
            }
        }
    }
}

#[test]
fn blank_conversation_id_is_still_reported() {
    let metadata = TurnMetadata::new("  ", "Hi").with_activity_id("a1");
    let event = build_qna_event("kb1", &metadata, &[], false);
    assert_eq!(event.property("ConversationId"), Some("  "));
}
