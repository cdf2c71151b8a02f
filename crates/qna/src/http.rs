use std::time::Duration;

use assistant_core::knowledge::{
    KnowledgeBaseEndpoint, MetadataFilter, QueryClient, QueryError, QueryOptions, QueryResult,
};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default transport: the hosted QnA `generateAnswer` REST endpoint.
#[derive(Clone, Debug)]
pub struct HttpQueryClient {
    endpoint: KnowledgeBaseEndpoint,
    http: reqwest::Client,
}

impl HttpQueryClient {
    pub fn new(endpoint: KnowledgeBaseEndpoint, timeout: Duration) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| QueryError::Transport(error.to_string()))?;
        Self::with_http_client(endpoint, http)
    }

    /// Uses a caller-supplied HTTP client, e.g. one with a proxy or custom TLS roots.
    pub fn with_http_client(
        endpoint: KnowledgeBaseEndpoint,
        http: reqwest::Client,
    ) -> Result<Self, QueryError> {
        endpoint.validate()?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &KnowledgeBaseEndpoint {
        &self.endpoint
    }

    fn generate_answer_url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/generateAnswer",
            self.endpoint.host.trim().trim_end_matches('/'),
            self.endpoint.knowledge_base_id
        )
    }
}

#[async_trait]
impl QueryClient for HttpQueryClient {
    async fn query(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> Result<Vec<QueryResult>, QueryError> {
        options.validate()?;

        let body = GenerateAnswerRequest {
            question,
            top: options.top,
            score_threshold: options.score_threshold * 100.0,
            strict_filters: &options.strict_filters,
        };
        let response = self
            .http
            .post(self.generate_answer_url())
            .header(
                AUTHORIZATION,
                format!("EndpointKey {}", self.endpoint.endpoint_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|error| QueryError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Status { status: status.as_u16(), body });
        }

        let payload = response
            .json::<GenerateAnswerResponse>()
            .await
            .map_err(|error| QueryError::Decode(error.to_string()))?;
        Ok(normalize_answers(payload, options.score_threshold))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAnswerRequest<'a> {
    question: &'a str,
    top: u32,
    /// Service scale, 0-100.
    score_threshold: f64,
    strict_filters: &'a [MetadataFilter],
}

#[derive(Debug, Default, Deserialize)]
struct GenerateAnswerResponse {
    #[serde(default)]
    answers: Vec<AnswerPayload>,
}

#[derive(Debug, Deserialize)]
struct AnswerPayload {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    questions: Vec<String>,
    #[serde(default)]
    answer: String,
    /// Service confidence on a 0-100 scale.
    #[serde(default)]
    score: f64,
}

/// Rescales service scores to `0.0..=1.0` and drops answers at or below the threshold.
/// Service order is kept.
fn normalize_answers(response: GenerateAnswerResponse, score_threshold: f64) -> Vec<QueryResult> {
    response
        .answers
        .into_iter()
        .map(|answer| QueryResult {
            id: answer.id,
            questions: answer.questions,
            answer: answer.answer,
            score: (answer.score / 100.0).clamp(0.0, 1.0),
        })
        .filter(|result| result.score > score_threshold)
        .collect()
}
