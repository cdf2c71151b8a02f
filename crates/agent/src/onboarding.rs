use assistant_core::dialogs::{step_fn, DialogContainer, StepSequencer};
use serde_json::Value;

pub const ONBOARDING_DIALOG_ID: &str = "OnboardingDialog";

/// Single-step onboarding dialog: ends immediately, reporting whether the incoming
/// value was a boolean `true`.
pub fn onboarding_dialog() -> DialogContainer {
    let sequence = StepSequencer::new(ONBOARDING_DIALOG_ID)
        .with_step(step_fn(|ctx| Ok(ctx.end_dialog(cast_boolean(&ctx.result)))));
    DialogContainer::new(ONBOARDING_DIALOG_ID, sequence)
}

/// Only JSON booleans carry a truth value; everything else, including null, is `false`.
pub fn cast_boolean(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}
