//! Assistant Runtime - turn orchestration over the knowledge base and dialogs
//!
//! For every inbound turn the runtime either:
//! 1. **Continues a dialog** (`onboarding`) - when the conversation has a waiting
//!    dialog instance, the user's text is fed to the suspended step, or
//! 2. **Answers from the knowledge base** - the instrumented QnA client is queried and
//!    the top answer (or a fallback) is returned.
//!
//! # Key Types
//!
//! - `AssistantRuntime` - per-turn orchestrator (see `runtime` module)
//! - `ConversationSession` - persisted per-conversation dialog state
//! - `AssistantReply` - what the channel adapter sends back
//!
//! Failures never escape as raw errors: they are mapped to `InterfaceError` and the
//! reply carries a user-safe message plus the activity id for correlation.

pub mod onboarding;
pub mod runtime;

pub use onboarding::{cast_boolean, onboarding_dialog, ONBOARDING_DIALOG_ID};
pub use runtime::{AssistantReply, AssistantRuntime, ConversationSession};
