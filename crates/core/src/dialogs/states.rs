use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dialogs::sequencer::DialogError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DialogState {
    NotStarted,
    Running { step_index: usize },
    Suspended { step_index: usize },
    Ended { value: Value },
}

impl DialogState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running { .. } => "running",
            Self::Suspended { .. } => "suspended",
            Self::Ended { .. } => "ended",
        }
    }

    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::Running { step_index } | Self::Suspended { step_index } => Some(*step_index),
            Self::NotStarted | Self::Ended { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogOperation {
    Begin,
    Resume,
}

/// The persisted view of a dialog handed to external storage at a suspension point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogStepState {
    pub dialog_id: String,
    pub step_index: usize,
    pub awaiting_external_input: bool,
}

/// A single dialog run. Owned by the caller between turns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogInstance {
    pub dialog_id: String,
    pub state: DialogState,
    /// Highest step index reached so far.
    #[serde(default)]
    pub step_index: usize,
}

impl DialogInstance {
    pub fn new(dialog_id: impl Into<String>) -> Self {
        Self { dialog_id: dialog_id.into(), state: DialogState::NotStarted, step_index: 0 }
    }

    /// Rebuilds a suspended run from its persisted step state. Only a run that was
    /// waiting for input can be restored; an ended run stays ended in storage.
    pub fn restore(step_state: DialogStepState) -> Result<Self, DialogError> {
        if !step_state.awaiting_external_input {
            return Err(DialogError::NotResumable { dialog_id: step_state.dialog_id });
        }
        Ok(Self {
            state: DialogState::Suspended { step_index: step_state.step_index },
            dialog_id: step_state.dialog_id,
            step_index: step_state.step_index,
        })
    }

    pub fn step_state(&self) -> DialogStepState {
        DialogStepState {
            dialog_id: self.dialog_id.clone(),
            step_index: self.step_index,
            awaiting_external_input: matches!(self.state, DialogState::Suspended { .. }),
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.state, DialogState::Suspended { .. })
    }

    pub fn is_ended(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogTurnStatus {
    Waiting,
    Ended,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DialogTurnResult {
    pub status: DialogTurnStatus,
    /// Prompt text while waiting; the dialog's result once ended.
    pub value: Option<Value>,
}

impl DialogTurnResult {
    pub fn waiting(prompt: Option<String>) -> Self {
        Self { status: DialogTurnStatus::Waiting, value: prompt.map(Value::String) }
    }

    pub fn ended(value: Value) -> Self {
        Self { status: DialogTurnStatus::Ended, value: Some(value) }
    }
}

/// What a step asks the sequencer to do next.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    End(Value),
    Prompt(Option<String>),
    Next(Value),
}
