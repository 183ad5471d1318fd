//! What a failed turn means to the caller. Library crates keep their own
//! error enums and convert into [`ApplicationError`] at the edge; the HTTP
//! layer then picks a status and a customer-safe message from
//! [`InterfaceError`].

use thiserror::Error;

use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error("session state is corrupted: {0}")]
    CorruptedSession(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("session store failure: {0}")]
    SessionStore(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    BadRequest,
    Unavailable,
    Internal,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind:?} [{correlation_id}]: {detail}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub detail: String,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn from_application(error: &ApplicationError, correlation_id: impl Into<String>) -> Self {
        let kind = match error {
            ApplicationError::Domain(DomainError::Flow(_)) => InterfaceErrorKind::BadRequest,
            ApplicationError::SessionStore(_) => InterfaceErrorKind::Unavailable,
            // a session that no longer decodes is fatal for the turn
            ApplicationError::Domain(DomainError::CorruptedSession(_))
            | ApplicationError::Configuration(_) => InterfaceErrorKind::Internal,
        };
        Self { kind, detail: error.to_string(), correlation_id: correlation_id.into() }
    }

    /// Customer-facing text. Never includes `detail`.
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            InterfaceErrorKind::BadRequest => {
                "Richiesta non valida. Controlla il messaggio e riprova."
            }
            InterfaceErrorKind::Unavailable => {
                "Il servizio è momentaneamente non disponibile. Riprova tra poco."
            }
            InterfaceErrorKind::Internal => "Si è verificato un errore interno.",
        }
    }
}
