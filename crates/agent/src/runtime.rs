use anyhow::{Context, Result};
use assistant_core::config::AppConfig;
use assistant_core::dialogs::{
    DialogContainer, DialogError, DialogInstance, DialogTurnResult, DialogTurnStatus,
};
use assistant_core::errors::{ApplicationError, DomainError};
use assistant_core::knowledge::{QueryClient, QueryResult};
use assistant_core::turn::TurnContext;
use assistant_qna::{HttpQueryClient, InstrumentedKnowledgeBase};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::onboarding::onboarding_dialog;

pub const FALLBACK_REPLY: &str = "Sorry, I don't have an answer for that yet.";

/// Per-conversation state the channel adapter persists between turns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    #[serde(default)]
    pub active_dialog: Option<DialogInstance>,
}

impl ConversationSession {
    pub fn has_waiting_dialog(&self) -> bool {
        self.active_dialog.as_ref().is_some_and(DialogInstance::is_waiting)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssistantReply {
    Answer { text: String, question_id: i64, score: f64 },
    Fallback { text: String },
    Prompt { text: Option<String> },
    DialogEnded { value: Value },
    Failure { text: String, correlation_id: String },
}

impl AssistantReply {
    /// Text to send back into the conversation, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Answer { text, .. } | Self::Fallback { text } | Self::Failure { text, .. } => {
                Some(text)
            }
            Self::Prompt { text } => text.as_deref(),
            Self::DialogEnded { .. } => None,
        }
    }
}

pub struct AssistantRuntime<C = HttpQueryClient> {
    knowledge_base: InstrumentedKnowledgeBase<C>,
    onboarding: DialogContainer,
}

impl AssistantRuntime<HttpQueryClient> {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let knowledge_base = InstrumentedKnowledgeBase::from_config(config)
            .context("failed to build knowledge base client")?;
        Ok(Self::new(knowledge_base, onboarding_dialog()))
    }
}

impl<C> AssistantRuntime<C>
where
    C: QueryClient,
{
    pub fn new(knowledge_base: InstrumentedKnowledgeBase<C>, onboarding: DialogContainer) -> Self {
        Self { knowledge_base, onboarding }
    }

    pub fn knowledge_base(&self) -> &InstrumentedKnowledgeBase<C> {
        &self.knowledge_base
    }

    /// Starts the onboarding dialog for this conversation, replacing any previous one.
    pub async fn start_onboarding(
        &self,
        turn: &TurnContext,
        session: &mut ConversationSession,
    ) -> AssistantReply {
        let mut instance = self.onboarding.create_instance();
        let outcome = self.onboarding.begin(turn, &mut instance).await;
        self.settle_dialog(turn, session, instance, outcome)
    }

    pub async fn handle_turn(
        &self,
        turn: &TurnContext,
        session: &mut ConversationSession,
    ) -> AssistantReply {
        self.handle_turn_with_cancellation(turn, session, &CancellationToken::new()).await
    }

    /// Routes one inbound turn. A waiting dialog takes the turn; otherwise the
    /// knowledge base answers it.
    pub async fn handle_turn_with_cancellation(
        &self,
        turn: &TurnContext,
        session: &mut ConversationSession,
        cancel: &CancellationToken,
    ) -> AssistantReply {
        if let Some(instance) = session.active_dialog.take().filter(DialogInstance::is_waiting) {
            if instance.dialog_id == self.onboarding.initial_dialog_id() {
                return self.resume_dialog(turn, session, instance).await;
            }
            warn!(
                event_name = "assistant.dialog.discarded",
                correlation_id = %turn.activity_id(),
                dialog_id = %instance.dialog_id,
                "stored dialog is not registered with this runtime"
            );
        }

        if turn.metadata.text.trim().is_empty() {
            return failure(
                turn,
                DomainError::InvariantViolation("question text must not be empty".to_string())
                    .into(),
            );
        }

        match self.knowledge_base.get_answers_with_cancellation(turn, cancel).await {
            Ok(results) => answer_from(turn, results.first()),
            Err(error) => failure(turn, error.into()),
        }
    }

    async fn resume_dialog(
        &self,
        turn: &TurnContext,
        session: &mut ConversationSession,
        mut instance: DialogInstance,
    ) -> AssistantReply {
        let input = Value::String(turn.metadata.text.clone());
        let outcome = self.onboarding.continue_dialog(turn, &mut instance, input).await;
        self.settle_dialog(turn, session, instance, outcome)
    }

    fn settle_dialog(
        &self,
        turn: &TurnContext,
        session: &mut ConversationSession,
        instance: DialogInstance,
        outcome: Result<DialogTurnResult, DialogError>,
    ) -> AssistantReply {
        match outcome {
            Ok(DialogTurnResult { status: DialogTurnStatus::Waiting, value }) => {
                session.active_dialog = Some(instance);
                AssistantReply::Prompt { text: value.as_ref().and_then(Value::as_str).map(str::to_string) }
            }
            Ok(DialogTurnResult { status: DialogTurnStatus::Ended, value }) => {
                session.active_dialog = None;
                AssistantReply::DialogEnded { value: value.unwrap_or(Value::Null) }
            }
            Err(error) => {
                // The sequencer already restored the instance to its pre-turn state.
                session.active_dialog = Some(instance).filter(|instance| !instance.is_ended());
                failure(turn, error.into())
            }
        }
    }
}

fn answer_from(turn: &TurnContext, top: Option<&QueryResult>) -> AssistantReply {
    let Some(top) = top else {
        info!(
            event_name = "assistant.turn.fallback",
            correlation_id = %turn.activity_id(),
            "no knowledge base answer matched"
        );
        return AssistantReply::Fallback { text: FALLBACK_REPLY.to_string() };
    };
    AssistantReply::Answer { text: top.answer.clone(), question_id: top.id, score: top.score }
}

fn failure(turn: &TurnContext, error: ApplicationError) -> AssistantReply {
    let interface = error.into_interface(turn.activity_id());
    warn!(
        event_name = "assistant.turn.failed",
        correlation_id = %interface.correlation_id(),
        error = %interface,
        "turn failed"
    );
    AssistantReply::Failure {
        text: interface.user_message().to_string(),
        correlation_id: interface.correlation_id().to_string(),
    }
}
