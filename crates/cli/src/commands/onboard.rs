use assistant_agent::{onboarding_dialog, AssistantReply};
use assistant_core::config::{AppConfig, LoadOptions};
use assistant_core::dialogs::DialogTurnStatus;
use assistant_core::turn::{TurnContext, TurnMetadata};
use uuid::Uuid;

use crate::commands::{block_on_runtime, CommandResult};

const COMMAND: &str = "onboard";

/// Runs the onboarding dialog once and reports how it finished. Only the logging
/// section has to be valid; the knowledge base is never contacted.
pub fn run() -> CommandResult {
    if let Err(error) = AppConfig::load_logging(LoadOptions::default()) {
        return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
    }

    let runtime = match block_on_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let dialog = onboarding_dialog();
    let turn = TurnContext::new(
        TurnMetadata::new(Uuid::new_v4().to_string(), "onboard").with_channel_id("cli"),
    );
    let mut instance = dialog.create_instance();

    match runtime.block_on(dialog.begin(&turn, &mut instance)) {
        Ok(result) if result.status == DialogTurnStatus::Ended => {
            let value = result.value.unwrap_or_default();
            let reply = AssistantReply::DialogEnded { value: value.clone() };
            CommandResult::success_with_reply(
                COMMAND,
                format!("{} ended with {value}", dialog.id()),
                serde_json::to_value(&reply).ok(),
            )
        }
        Ok(_) => CommandResult::failure(
            COMMAND,
            "dialog_waiting",
            format!("{} is waiting for input, which this command cannot supply", dialog.id()),
            5,
        ),
        Err(error) => CommandResult::failure(COMMAND, "dialog_failed", error.to_string(), 5),
    }
}
