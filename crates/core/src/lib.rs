//! Assistant Core - shared contracts for the conversational assistant
//!
//! - **Turns** (`turn`) - per-turn activity metadata and the capability registry
//! - **Telemetry** (`telemetry`) - custom events and the sink contract
//! - **Knowledge** (`knowledge`) - knowledge-base query contract and result types
//! - **Dialogs** (`dialogs`) - step sequencer state machine and dialog container
//! - **Config** (`config`) - layered file/env/override configuration

pub mod config;
pub mod dialogs;
pub mod errors;
pub mod knowledge;
pub mod telemetry;
pub mod turn;

pub use dialogs::{
    DialogContainer, DialogError, DialogInstance, DialogState, DialogStepState, DialogTurnResult,
    DialogTurnStatus, StepSequencer,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use knowledge::{KnowledgeBaseEndpoint, QueryClient, QueryError, QueryOptions, QueryResult};
pub use telemetry::{EmissionError, TelemetryEvent, TelemetrySink, QNA_MESSAGE_EVENT};
pub use turn::{CapabilityRegistry, TurnContext, TurnMetadata};
