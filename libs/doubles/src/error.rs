//! Error types for stub resolution, verification, and registry lookups
//!
//! Resolution failures propagate to whatever code invoked the stubbed
//! operation; verification and shape failures are raised to the installing
//! test before any store mutation.

use std::fmt;

/// Errors surfaced by the doubles runtime
///
/// `Display` and `Error` are implemented by hand because the
/// `VerificationFailure::source` field holds a source *name*, not an error
/// cause, and `thiserror` would otherwise treat it as the `Error::source()`.
#[derive(Debug, Clone, PartialEq)]
pub enum DoubleError {
    /// Call made with a name never registered on this double
    NotStubbed { name: String },

    /// Registrations exist for the name, but none accepts these arguments
    ArgumentMismatch { name: String, arity: usize },

    /// Stub signature absent from the verified source's symbol table
    VerificationFailure {
        source: String,
        name: String,
        arity: usize,
    },

    /// Structured double targeted a field absent from its fixed shape
    UnknownKey { key: String },

    /// Identifier not present in the registry when the caller required it
    RegistryMiss { id: String },

    /// Concurrent registration claimed an identifier already in use
    IdentifierTaken { id: String },

    /// A stub programmed to raise produced its designated failure
    Raised { message: String },

    /// The double's actor is gone (command channel closed)
    Unreachable { id: String, reason: String },
}

impl fmt::Display for DoubleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStubbed { name } => write!(f, "no stub registered for `{name}`"),
            Self::ArgumentMismatch { name, arity } => write!(
                f,
                "no stub for `{name}` accepts the supplied arguments ({arity} given)"
            ),
            Self::VerificationFailure {
                source,
                name,
                arity,
            } => write!(f, "source `{source}` does not expose {name}/{arity}"),
            Self::UnknownKey { key } => write!(f, "field `{key}` does not exist on this double"),
            Self::RegistryMiss { id } => write!(f, "double `{id}` is not registered"),
            Self::IdentifierTaken { id } => write!(f, "identifier `{id}` is already registered"),
            Self::Raised { message } => write!(f, "stub raised: {message}"),
            Self::Unreachable { id, reason } => {
                write!(f, "double `{id}` is unreachable: {reason}")
            }
        }
    }
}

impl std::error::Error for DoubleError {}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, DoubleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offender() {
        let err = DoubleError::NotStubbed {
            name: "fetch".to_string(),
        };
        assert_eq!(err.to_string(), "no stub registered for `fetch`");

        let err = DoubleError::VerificationFailure {
            source: "PaymentGateway".to_string(),
            name: "charge".to_string(),
            arity: 2,
        };
        assert!(err.to_string().contains("charge/2"));
    }

    #[test]
    fn variants_are_distinguishable() {
        let not_stubbed = DoubleError::NotStubbed {
            name: "f".to_string(),
        };
        let mismatch = DoubleError::ArgumentMismatch {
            name: "f".to_string(),
            arity: 1,
        };
        assert_ne!(not_stubbed, mismatch);
    }
}
