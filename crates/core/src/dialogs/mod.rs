pub mod container;
pub mod sequencer;
pub mod states;

pub use container::DialogContainer;
pub use sequencer::{step_fn, DialogError, DialogStep, FnStep, StepContext, StepSequencer};
pub use states::{
    DialogInstance, DialogOperation, DialogState, DialogStepState, DialogTurnResult,
    DialogTurnStatus, StepOutcome,
};
