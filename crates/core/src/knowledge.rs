use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One ranked match returned by the knowledge base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: i64,
    pub questions: Vec<String>,
    pub answer: String,
    /// Confidence normalized to `0.0..=1.0`.
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub top: u32,
    pub score_threshold: f64,
    #[serde(default)]
    pub strict_filters: Vec<MetadataFilter>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { top: 1, score_threshold: 0.3, strict_filters: Vec::new() }
    }
}

impl QueryOptions {
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.top == 0 {
            return Err(QueryError::InvalidConfiguration(
                "query option `top` must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(QueryError::InvalidConfiguration(
                "query option `score_threshold` must be in range 0.0..=1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Address and credentials of one hosted knowledge base.
#[derive(Clone, Debug)]
pub struct KnowledgeBaseEndpoint {
    pub knowledge_base_id: String,
    pub host: String,
    pub endpoint_key: SecretString,
}

impl KnowledgeBaseEndpoint {
    pub fn new(
        knowledge_base_id: impl Into<String>,
        host: impl Into<String>,
        endpoint_key: impl Into<String>,
    ) -> Self {
        let endpoint_key: String = endpoint_key.into();
        Self {
            knowledge_base_id: knowledge_base_id.into(),
            host: host.into(),
            endpoint_key: SecretString::from(endpoint_key),
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.knowledge_base_id.trim().is_empty() {
            return Err(QueryError::InvalidConfiguration(
                "knowledge base id must not be empty".to_string(),
            ));
        }
        if self.endpoint_key.expose_secret().trim().is_empty() {
            return Err(QueryError::InvalidConfiguration(
                "knowledge base endpoint key must not be empty".to_string(),
            ));
        }
        let host = self.host.trim();
        if !host.starts_with("http://") && !host.starts_with("https://") {
            return Err(QueryError::InvalidConfiguration(
                "knowledge base host must start with http:// or https://".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("knowledge base transport failure: {0}")]
    Transport(String),
    #[error("knowledge base returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode knowledge base response: {0}")]
    Decode(String),
    #[error("invalid knowledge base configuration: {0}")]
    InvalidConfiguration(String),
    #[error("knowledge base query was cancelled")]
    Cancelled,
}

/// Transport that answers a question against a knowledge base.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn query(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> Result<Vec<QueryResult>, QueryError>;
}

#[async_trait]
impl<T> QueryClient for Arc<T>
where
    T: QueryClient + ?Sized,
{
    async fn query(
        &self,
        question: &str,
        options: &QueryOptions,
    ) -> Result<Vec<QueryResult>, QueryError> {
        (**self).query(question, options).await
    }
}
