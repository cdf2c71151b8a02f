use thiserror::Error;

use crate::{dialogs::DialogError, knowledge::QueryError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Dialog(#[from] DialogError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<DialogError> for ApplicationError {
    fn from(value: DialogError) -> Self {
        Self::Domain(DomainError::Dialog(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Text safe to send back into the conversation.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Sorry, I couldn't understand that. Could you rephrase it?",
            Self::ServiceUnavailable { .. } => {
                "I can't reach my knowledge base right now. Please try again shortly."
            }
            Self::Internal { .. } => "Sorry, something went wrong on my side.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::BadRequest { message, correlation_id: unassigned }
            }
            ApplicationError::Domain(DomainError::Dialog(error)) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Query(QueryError::InvalidConfiguration(message))
            | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
            ApplicationError::Query(error) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id: unassigned }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dialogs::{DialogError, DialogOperation};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::knowledge::QueryError;

    #[test]
    fn query_failure_maps_to_service_unavailable() {
        let interface = ApplicationError::from(QueryError::Transport("connection reset".to_owned()))
            .into_interface("act-1");

        assert!(matches!(
            interface,
            InterfaceError::ServiceUnavailable {
                ref correlation_id,
                ..
            } if correlation_id == "act-1"
        ));
        assert_eq!(
            interface.user_message(),
            "I can't reach my knowledge base right now. Please try again shortly."
        );
    }

    #[test]
    fn invalid_step_transition_maps_to_internal() {
        let interface = ApplicationError::from(DialogError::InvalidStepTransition {
            dialog_id: "OnboardingDialog".to_owned(),
            state: "ended".to_owned(),
            operation: DialogOperation::Resume,
        })
        .into_interface("act-2");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.correlation_id(), "act-2");
        assert_eq!(interface.user_message(), "Sorry, something went wrong on my side.");
    }

    #[test]
    fn invariant_violation_maps_to_bad_request() {
        let interface =
            ApplicationError::from(DomainError::InvariantViolation("empty question".to_owned()))
                .into_interface("act-3");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn misconfigured_query_maps_to_internal() {
        let interface = ApplicationError::from(QueryError::InvalidConfiguration(
            "knowledge base id must not be empty".to_owned(),
        ))
        .into_interface("act-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
    }
}
