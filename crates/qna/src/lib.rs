//! Knowledge-base access for the assistant
//!
//! - **HTTP transport** (`http`) - `generateAnswer` client for hosted QnA knowledge bases
//! - **Instrumentation** (`instrumented`) - wraps any `QueryClient` and reports each query
//!   as a `QnaMessage` telemetry event, honoring the personal-information flag

pub mod http;
pub mod instrumented;

pub use http::HttpQueryClient;
pub use instrumented::{build_qna_event, InstrumentedKnowledgeBase, NO_MATCH_ANSWER, NO_MATCH_QUESTION};
