use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dialogs::states::{
    DialogInstance, DialogOperation, DialogState, DialogTurnResult, StepOutcome,
};
use crate::turn::TurnContext;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogError {
    #[error("invalid {operation:?} on dialog `{dialog_id}` in state {state}")]
    InvalidStepTransition { dialog_id: String, state: String, operation: DialogOperation },
    #[error("dialog instance `{instance}` does not belong to dialog `{dialog_id}`")]
    DialogMismatch { dialog_id: String, instance: String },
    #[error("persisted dialog `{dialog_id}` is not waiting for input and cannot be restored")]
    NotResumable { dialog_id: String },
    #[error("step {step_index} of dialog `{dialog_id}` failed: {message}")]
    Step { dialog_id: String, step_index: usize, message: String },
}

/// Everything a step sees when it runs.
pub struct StepContext<'a> {
    pub turn: &'a TurnContext,
    pub dialog_id: &'a str,
    pub step_index: usize,
    /// Output of the previous step, or the input a resumed step receives.
    pub result: Value,
    /// Set when the step is re-invoked with user input after a suspension.
    pub resumed: bool,
}

impl StepContext<'_> {
    pub fn end_dialog(&self, value: impl Into<Value>) -> StepOutcome {
        StepOutcome::End(value.into())
    }

    pub fn prompt(&self, text: impl Into<String>) -> StepOutcome {
        StepOutcome::Prompt(Some(text.into()))
    }

    pub fn wait_for_input(&self) -> StepOutcome {
        StepOutcome::Prompt(None)
    }

    pub fn next(&self, value: impl Into<Value>) -> StepOutcome {
        StepOutcome::Next(value.into())
    }

    pub fn fail(&self, message: impl Into<String>) -> DialogError {
        DialogError::Step {
            dialog_id: self.dialog_id.to_string(),
            step_index: self.step_index,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait DialogStep: Send + Sync {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DialogError>;
}

/// Adapts a synchronous closure into a [`DialogStep`].
pub struct FnStep<F>(F);

pub fn step_fn<F>(step: F) -> FnStep<F>
where
    F: Fn(&StepContext<'_>) -> Result<StepOutcome, DialogError> + Send + Sync,
{
    FnStep(step)
}

#[async_trait]
impl<F> DialogStep for FnStep<F>
where
    F: Fn(&StepContext<'_>) -> Result<StepOutcome, DialogError> + Send + Sync,
{
    async fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DialogError> {
        (self.0)(ctx)
    }
}

/// Drives an ordered list of steps, suspending whenever a step waits for user input.
///
/// The sequencer holds no per-run state. Each call receives the caller's
/// [`DialogInstance`] and leaves it in the state that must be persisted before the
/// turn ends.
pub struct StepSequencer {
    id: String,
    steps: Vec<Arc<dyn DialogStep>>,
}

impl StepSequencer {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), steps: Vec::new() }
    }

    pub fn with_step<S>(mut self, step: S) -> Self
    where
        S: DialogStep + 'static,
    {
        self.add_step(step);
        self
    }

    pub fn add_step<S>(&mut self, step: S)
    where
        S: DialogStep + 'static,
    {
        self.steps.push(Arc::new(step));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn begin(
        &self,
        turn: &TurnContext,
        instance: &mut DialogInstance,
    ) -> Result<DialogTurnResult, DialogError> {
        self.ensure_owned(instance)?;
        if instance.state != DialogState::NotStarted {
            return Err(self.reject(turn, instance, DialogOperation::Begin));
        }
        self.run_from(turn, instance, 0, Value::Null, false).await
    }

    pub async fn resume(
        &self,
        turn: &TurnContext,
        instance: &mut DialogInstance,
        input: Value,
    ) -> Result<DialogTurnResult, DialogError> {
        self.ensure_owned(instance)?;
        let DialogState::Suspended { step_index } = instance.state else {
            return Err(self.reject(turn, instance, DialogOperation::Resume));
        };
        self.run_from(turn, instance, step_index, input, true).await
    }

    async fn run_from(
        &self,
        turn: &TurnContext,
        instance: &mut DialogInstance,
        step_index: usize,
        input: Value,
        resumed: bool,
    ) -> Result<DialogTurnResult, DialogError> {
        let previous = instance.clone();
        let result = self.drive(turn, instance, step_index, input, resumed).await;
        if result.is_err() {
            *instance = previous;
        }
        result
    }

    async fn drive(
        &self,
        turn: &TurnContext,
        instance: &mut DialogInstance,
        mut step_index: usize,
        mut input: Value,
        mut resumed: bool,
    ) -> Result<DialogTurnResult, DialogError> {
        loop {
            let Some(step) = self.steps.get(step_index) else {
                // Continuing past the last step ends the dialog with that step's value.
                return Ok(self.finish(turn, instance, input));
            };
            instance.state = DialogState::Running { step_index };
            instance.step_index = step_index;
            debug!(
                event_name = "dialog.step.invoked",
                correlation_id = %turn.activity_id(),
                dialog_id = %self.id,
                step_index,
                "invoking dialog step"
            );

            let ctx = StepContext { turn, dialog_id: &self.id, step_index, result: input, resumed };
            match step.run(&ctx).await? {
                StepOutcome::End(value) => return Ok(self.finish(turn, instance, value)),
                StepOutcome::Prompt(prompt) => {
                    instance.state = DialogState::Suspended { step_index };
                    info!(
                        event_name = "dialog.suspended",
                        correlation_id = %turn.activity_id(),
                        dialog_id = %self.id,
                        step_index,
                        "dialog waiting for user input"
                    );
                    return Ok(DialogTurnResult::waiting(prompt));
                }
                StepOutcome::Next(value) => {
                    step_index += 1;
                    input = value;
                    resumed = false;
                }
            }
        }
    }

    fn finish(&self, turn: &TurnContext, instance: &mut DialogInstance, value: Value) -> DialogTurnResult {
        instance.state = DialogState::Ended { value: value.clone() };
        info!(
            event_name = "dialog.ended",
            correlation_id = %turn.activity_id(),
            dialog_id = %self.id,
            step_index = instance.step_index,
            "dialog ended"
        );
        DialogTurnResult::ended(value)
    }

    fn ensure_owned(&self, instance: &DialogInstance) -> Result<(), DialogError> {
        if instance.dialog_id == self.id {
            Ok(())
        } else {
            Err(DialogError::DialogMismatch {
                dialog_id: self.id.clone(),
                instance: instance.dialog_id.clone(),
            })
        }
    }

    fn reject(
        &self,
        turn: &TurnContext,
        instance: &DialogInstance,
        operation: DialogOperation,
    ) -> DialogError {
        warn!(
            event_name = "dialog.transition_rejected",
            correlation_id = %turn.activity_id(),
            dialog_id = %self.id,
            state = instance.state.label(),
            operation = ?operation,
            "rejected dialog transition"
        );
        DialogError::InvalidStepTransition {
            dialog_id: self.id.clone(),
            state: instance.state.label().to_string(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::{json, Value};

    use crate::dialogs::sequencer::{step_fn, DialogError, StepSequencer};
    use crate::dialogs::states::{
        DialogInstance, DialogOperation, DialogState, DialogTurnResult, DialogTurnStatus,
    };
    use crate::turn::{TurnContext, TurnMetadata};

    fn turn(text: &str) -> TurnContext {
        TurnContext::new(TurnMetadata::new("conv1", text).with_activity_id("a1"))
    }

    fn profile_dialog() -> StepSequencer {
        StepSequencer::new("profile")
            .with_step(step_fn(|ctx| {
                if ctx.resumed {
                    Ok(ctx.next(json!({ "name": ctx.result.clone() })))
                } else {
                    Ok(ctx.prompt("What is your name?"))
                }
            }))
            .with_step(step_fn(|ctx| {
                if ctx.resumed {
                    Ok(ctx.end_dialog(ctx.result.clone()))
                } else {
                    Ok(ctx.prompt("Where are you located?"))
                }
            }))
    }

    #[tokio::test]
    async fn single_ending_step_completes_within_begin() {
        let sequencer =
            StepSequencer::new("single").with_step(step_fn(|ctx| Ok(ctx.end_dialog(true))));
        let mut instance = DialogInstance::new("single");

        let result = sequencer.begin(&turn("hi"), &mut instance).await.expect("begin");

        assert_eq!(result, DialogTurnResult::ended(json!(true)));
        assert_eq!(instance.state, DialogState::Ended { value: json!(true) });
        assert!(!instance.step_state().awaiting_external_input);
    }

    #[tokio::test]
    async fn prompts_suspend_and_resume_in_order() {
        let sequencer = profile_dialog();
        let mut instance = DialogInstance::new("profile");

        let first = sequencer.begin(&turn("start"), &mut instance).await.expect("begin");
        assert_eq!(first.status, DialogTurnStatus::Waiting);
        assert_eq!(first.value, Some(json!("What is your name?")));
        assert_eq!(instance.state, DialogState::Suspended { step_index: 0 });

        let second = sequencer
            .resume(&turn("Alice"), &mut instance, json!("Alice"))
            .await
            .expect("resume name");
        assert_eq!(second.value, Some(json!("Where are you located?")));
        assert_eq!(instance.state, DialogState::Suspended { step_index: 1 });
        assert_eq!(instance.step_state().step_index, 1);

        let third = sequencer
            .resume(&turn("Seattle"), &mut instance, json!("Seattle"))
            .await
            .expect("resume location");
        assert_eq!(third, DialogTurnResult::ended(json!("Seattle")));
        assert!(instance.is_ended());
    }

    #[tokio::test]
    async fn step_index_never_decreases() {
        let sequencer = profile_dialog();
        let mut instance = DialogInstance::new("profile");
        let mut seen = vec![];

        sequencer.begin(&turn("start"), &mut instance).await.expect("begin");
        seen.push(instance.step_index);
        for input in ["Alice", "Seattle"] {
            sequencer.resume(&turn(input), &mut instance, json!(input)).await.expect("resume");
            seen.push(instance.step_index);
        }

        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "indices: {seen:?}");
    }

    #[tokio::test]
    async fn begin_twice_is_rejected() {
        let sequencer = profile_dialog();
        let mut instance = DialogInstance::new("profile");
        sequencer.begin(&turn("start"), &mut instance).await.expect("first begin");

        let error = sequencer.begin(&turn("again"), &mut instance).await.expect_err("second begin");
        assert_eq!(
            error,
            DialogError::InvalidStepTransition {
                dialog_id: "profile".to_string(),
                state: "suspended".to_string(),
                operation: DialogOperation::Begin,
            }
        );
        assert_eq!(instance.state, DialogState::Suspended { step_index: 0 });
    }

    #[tokio::test]
    async fn resume_requires_suspension() {
        let sequencer = profile_dialog();
        let mut fresh = DialogInstance::new("profile");
        let error = sequencer
            .resume(&turn("x"), &mut fresh, Value::Null)
            .await
            .expect_err("resume before begin");
        assert!(matches!(
            error,
            DialogError::InvalidStepTransition { operation: DialogOperation::Resume, .. }
        ));

        let single =
            StepSequencer::new("single").with_step(step_fn(|ctx| Ok(ctx.end_dialog(false))));
        let mut ended = DialogInstance::new("single");
        single.begin(&turn("x"), &mut ended).await.expect("begin");
        assert!(single.resume(&turn("x"), &mut ended, Value::Null).await.is_err());
    }

    #[tokio::test]
    async fn next_from_last_step_ends_with_its_value() {
        let sequencer = StepSequencer::new("chain")
            .with_step(step_fn(|ctx| Ok(ctx.next(1))))
            .with_step(step_fn(|ctx| {
                let previous = ctx.result.as_i64().unwrap_or_default();
                Ok(ctx.next(previous + 1))
            }));
        let mut instance = DialogInstance::new("chain");

        let result = sequencer.begin(&turn("go"), &mut instance).await.expect("begin");
        assert_eq!(result, DialogTurnResult::ended(json!(2)));
        assert_eq!(instance.step_index, 1);
    }

    #[tokio::test]
    async fn empty_sequence_ends_immediately() {
        let sequencer = StepSequencer::new("empty");
        let mut instance = DialogInstance::new("empty");
        let result = sequencer.begin(&turn("go"), &mut instance).await.expect("begin");
        assert_eq!(result, DialogTurnResult::ended(Value::Null));
    }

    #[tokio::test]
    async fn failing_step_restores_previous_state() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let sequencer = StepSequencer::new("flaky")
            .with_step(step_fn(|ctx| {
                if ctx.resumed {
                    Ok(ctx.next(ctx.result.clone()))
                } else {
                    Ok(ctx.wait_for_input())
                }
            }))
            .with_step(step_fn(move |ctx| {
                *counter.lock().expect("counter lock") += 1;
                Err(ctx.fail("backend unavailable"))
            }));
        let mut instance = DialogInstance::new("flaky");
        sequencer.begin(&turn("go"), &mut instance).await.expect("begin");

        let error = sequencer
            .resume(&turn("input"), &mut instance, json!("input"))
            .await
            .expect_err("second step fails");
        assert!(matches!(error, DialogError::Step { step_index: 1, .. }));
        assert_eq!(instance.state, DialogState::Suspended { step_index: 0 });
        assert_eq!(*calls.lock().expect("counter lock"), 1);
    }

    #[tokio::test]
    async fn long_continue_chain_runs_to_completion() {
        let mut sequencer = StepSequencer::new("long");
        for _ in 0..65 {
            sequencer.add_step(step_fn(|ctx| Ok(ctx.next(Value::Null))));
        }
        sequencer.add_step(step_fn(|ctx| Ok(ctx.next(ctx.step_index as u64))));
        let mut instance = DialogInstance::new("long");

        let result = sequencer.begin(&turn("go"), &mut instance).await.expect("begin");

        assert_eq!(result, DialogTurnResult::ended(json!(65)));
        assert_eq!(instance.step_index, 65);
        assert_eq!(instance.state, DialogState::Ended { value: json!(65) });
    }

    #[tokio::test]
    async fn foreign_instance_is_rejected() {
        let sequencer = profile_dialog();
        let mut instance = DialogInstance::new("other");
        let error = sequencer.begin(&turn("go"), &mut instance).await.expect_err("mismatch");
        assert!(matches!(error, DialogError::DialogMismatch { .. }));
    }
}
