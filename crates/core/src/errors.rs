use thiserror::Error;

use crate::flows::TransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Failures raised inside a routing call. Sub-agents turn these into failed outcomes;
/// none of them escapes a component boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("classification failed: {0}")]
    ClassificationFailure(String),
    #[error("card action details incomplete: {0}")]
    ExtractionIncomplete(String),
    #[error("{0}")]
    RetrievalFailure(String),
    #[error("{0}")]
    GenerationFailure(String),
    #[error("{0}")]
    CardCollaboratorFailure(String),
    #[error("{0}")]
    MissingPrecondition(String),
}

impl RoutingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClassificationFailure(_) => "classification_failure",
            Self::ExtractionIncomplete(_) => "extraction_incomplete",
            Self::RetrievalFailure(_) => "retrieval_failure",
            Self::GenerationFailure(_) => "generation_failure",
            Self::CardCollaboratorFailure(_) => "card_collaborator_failure",
            Self::MissingPrecondition(_) => "missing_precondition",
        }
    }

    /// `true` only for conditions that indicate a router bug rather than a collaborator fault.
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::MissingPrecondition(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
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
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
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
        match value {
            ApplicationError::InvalidInput(message) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Domain(error) => Self::Internal {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError, RoutingError};
    use crate::flows::{RouterEvent, RouterState, TransitionError};

    #[test]
    fn invalid_input_maps_to_bad_request_with_correlation_id() {
        let interface = ApplicationError::InvalidInput("query must not be empty".to_owned())
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn transition_defect_maps_to_internal() {
        let interface = ApplicationError::from(DomainError::from(
            TransitionError::InvalidTransition {
                state: RouterState::Start,
                event: RouterEvent::StageCompleted,
            },
        ))
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Integration("card api unreachable".to_owned())
            .into_interface("req-3");
        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }

    #[test]
    fn only_missing_precondition_is_a_defect() {
        let defect = RoutingError::MissingPrecondition("missing action details".to_owned());
        assert!(defect.is_defect());
        assert_eq!(defect.to_string(), "missing action details");
        assert_eq!(defect.code(), "missing_precondition");

        let collaborator = RoutingError::CardCollaboratorFailure("Card not found".to_owned());
        assert!(!collaborator.is_defect());
        assert_eq!(collaborator.to_string(), "Card not found");
    }
}
