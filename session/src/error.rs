//! Session error types.

use ember_core::EvaluationError;
use ember_memory::MemoryError;
use ember_network::NetworkError;
use ember_registry::RegistryError;
use ember_rule::RuleError;
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Type declaration or field resolution failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Working memory consistency violation.
    #[error("memory error: {0}")]
    Memory(MemoryError),

    /// Rule compilation or deployment failed.
    #[error("rule error: {0}")]
    Rule(RuleError),

    /// Network instantiation failed.
    #[error("network error: {0}")]
    Network(NetworkError),

    /// A condition or action failed during `fire()`.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// `fire()` ran more cycles than configured.
    #[error("fire loop exceeded {limit} cycles")]
    CycleLimitExceeded { limit: u64 },

    /// The session was closed.
    #[error("session {id} is closed")]
    SessionClosed { id: u64 },
}

impl SessionError {
    pub fn cycle_limit_exceeded(limit: u64) -> Self {
        Self::CycleLimitExceeded { limit }
    }

    pub fn session_closed(id: u64) -> Self {
        Self::SessionClosed { id }
    }
}

// Evaluation errors surface as `Evaluation` whichever layer raised them.

impl From<MemoryError> for SessionError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Evaluation(e) => SessionError::Evaluation(e),
            MemoryError::Registry(e) => SessionError::Registry(e),
            other => SessionError::Memory(other),
        }
    }
}

impl From<NetworkError> for SessionError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Evaluation(e) => SessionError::Evaluation(e),
            NetworkError::Memory(e) => e.into(),
            other => SessionError::Network(other),
        }
    }
}

impl From<RuleError> for SessionError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Evaluation(e) => SessionError::Evaluation(e),
            RuleError::Network(e) => e.into(),
            RuleError::Memory(e) => e.into(),
            RuleError::Registry(e) => SessionError::Registry(e),
            other => SessionError::Rule(other),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
