use serde_json::Value;

use crate::dialogs::sequencer::{DialogError, StepSequencer};
use crate::dialogs::states::{DialogInstance, DialogTurnResult};
use crate::turn::TurnContext;

/// Exposes one named step sequence to the dialog runtime.
pub struct DialogContainer {
    id: String,
    initial_dialog_id: String,
    sequence: StepSequencer,
}

impl DialogContainer {
    pub fn new(id: impl Into<String>, sequence: StepSequencer) -> Self {
        Self { id: id.into(), initial_dialog_id: sequence.id().to_string(), sequence }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn initial_dialog_id(&self) -> &str {
        &self.initial_dialog_id
    }

    pub fn create_instance(&self) -> DialogInstance {
        DialogInstance::new(self.initial_dialog_id.clone())
    }

    pub async fn begin(
        &self,
        turn: &TurnContext,
        instance: &mut DialogInstance,
    ) -> Result<DialogTurnResult, DialogError> {
        self.sequence.begin(turn, instance).await
    }

    pub async fn continue_dialog(
        &self,
        turn: &TurnContext,
        instance: &mut DialogInstance,
        input: Value,
    ) -> Result<DialogTurnResult, DialogError> {
        self.sequence.resume(turn, instance, input).await
    }
}
