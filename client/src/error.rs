//! Error taxonomy for the client: transport, protocol and lifecycle failures.

use arcade_shared::{GameFamily, MalformedSnapshot, MessageKind, RoomId};
use thiserror::Error;

use crate::listeners::Purpose;

/// Connect failures and mid-session drops. Recoverable through the retry policy.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind local socket: {0}")]
    Bind(#[source] std::io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] bincode::Error),
    #[error("{0} channel is not open")]
    NotOpen(GameFamily),
    #[error("{0} channel link is closed")]
    LinkClosed(GameFamily),
    #[error("{family} channel gave up after {attempts} attempts")]
    RetriesExhausted { family: GameFamily, attempts: u32 },
}

/// Traffic from the authority that does not fit the current state. Discarded and logged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("assignment for room {0} is not awaited")]
    StaleAssignment(RoomId),
    #[error("expected a {expected} snapshot, got {found}")]
    FamilyMismatch {
        expected: GameFamily,
        found: GameFamily,
    },
    #[error("malformed tick: {0}")]
    MalformedTick(#[from] MalformedSnapshot),
    #[error("unexpected {0:?} message")]
    Unexpected(MessageKind),
}

/// Violations of the listener and room ownership rules.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("{family} channel already has a {purpose:?} listener")]
    DuplicateListener { family: GameFamily, purpose: Purpose },
    #[error("unknown subscription handle {0}")]
    UnknownSubscription(u64),
    #[error("no room is bound")]
    NoRoom,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProtocolError::StaleAssignment(RoomId::from("R1"));
        assert_eq!(err.to_string(), "assignment for room R1 is not awaited");

        let err = TransportError::RetriesExhausted {
            family: GameFamily::Tri,
            attempts: 5,
        };
        assert_eq!(err.to_string(), "tri channel gave up after 5 attempts");
    }

    #[test]
    fn test_client_error_wraps_categories() {
        let err: ClientError = LifecycleError::NoRoom.into();
        assert!(matches!(err, ClientError::Lifecycle(LifecycleError::NoRoom)));
        assert_eq!(err.to_string(), "no room is bound");
    }
}
