use std::sync::Arc;

use assistant_agent::{AssistantReply, AssistantRuntime, ConversationSession};
use assistant_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use assistant_core::telemetry::TracingTelemetrySink;
use assistant_core::turn::{CapabilityRegistry, TurnContext, TurnMetadata};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::commands::{block_on_runtime, CommandResult};

const COMMAND: &str = "ask";

#[derive(Clone, Debug, Default)]
pub struct AskRequest {
    pub question: String,
    pub user_name: Option<String>,
    pub conversation_id: Option<String>,
    pub log_personal_information: bool,
}

pub fn run(request: AskRequest) -> CommandResult {
    let overrides = ConfigOverrides {
        log_personal_information: request.log_personal_information.then_some(true),
        ..ConfigOverrides::default()
    };
    let config = match AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2),
    };

    let assistant = match AssistantRuntime::from_config(&config) {
        Ok(assistant) => assistant,
        Err(error) => {
            return CommandResult::failure(COMMAND, "client_setup", format!("{error:#}"), 3)
        }
    };

    let runtime = match block_on_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let mut metadata = TurnMetadata::new(
        request.conversation_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        request.question,
    )
    .with_channel_id("cli");
    if let Some(user_name) = request.user_name {
        metadata = metadata.with_user_name(user_name);
    }
    let turn = TurnContext::new(metadata).with_capabilities(
        CapabilityRegistry::new().with_telemetry_sink(Arc::new(TracingTelemetrySink)),
    );

    let reply = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        });

        let reply = assistant
            .handle_turn_with_cancellation(&turn, &mut ConversationSession::default(), &cancel)
            .await;
        interrupt.abort();
        reply
    });

    render(reply)
}

fn render(reply: AssistantReply) -> CommandResult {
    let encoded = serde_json::to_value(&reply).ok();
    match reply {
        AssistantReply::Failure { text, correlation_id } => CommandResult::failure(
            COMMAND,
            "turn_failed",
            format!("{text} (activity {correlation_id})"),
            5,
        ),
        other => CommandResult::success_with_reply(
            COMMAND,
            other.text().unwrap_or_default().to_string(),
            encoded,
        ),
    }
}
