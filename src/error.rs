//! Error types shared by the reader and the writer.
//!
//! Most operations return `anyhow::Result`. Conditions callers may want to
//! match on are raised as one of the enums below and can be recovered with
//! `err.downcast_ref::<FormatError>()`.
//!
//! - `FormatError` - structurally impossible recording data, fatal to a load
//! - `TypeRegistrationError` - writer-side type and value construction errors

use std::fmt;

/// Fatal problems with the recording bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The data cannot be a valid chunk (bad magic, bad offsets, truncation).
    InvalidFormat { message: String },
    /// The chunk header carries a version this reader does not decode.
    VersionNotSupported { major: u16, minor: u16 },
}

impl FormatError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FormatError::InvalidFormat {
            message: message.into(),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidFormat { message } => write!(f, "invalid format: {message}"),
            FormatError::VersionNotSupported { major, minor } => {
                write!(f, "chunk version {major}.{minor} is not supported")
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// Errors raised while registering writer types or building values.
///
/// A failed registration never touches types that were already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRegistrationError {
    /// Bad argument, such as an annotation whose type is not an annotation
    /// or a predefined type that was never initialized.
    IllegalArgument { message: String },
    /// A type was used before its definition completed.
    Unresolved { type_name: String },
    /// Two fields with the same name in one type.
    DuplicateField { type_name: String, field: String },
    /// A field name that the type does not declare.
    UnknownField { type_name: String, field: String },
    /// A value whose type does not match the field it was put into.
    IncompatibleValue {
        type_name: String,
        field: String,
        message: String,
    },
    /// A value written as an event whose type is not an event type.
    NotAnEvent { type_name: String },
}

impl TypeRegistrationError {
    pub fn illegal(message: impl Into<String>) -> Self {
        TypeRegistrationError::IllegalArgument {
            message: message.into(),
        }
    }
}

impl fmt::Display for TypeRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRegistrationError::IllegalArgument { message } => {
                write!(f, "illegal argument: {message}")
            }
            TypeRegistrationError::Unresolved { type_name } => {
                write!(f, "type {type_name} is not resolved")
            }
            TypeRegistrationError::DuplicateField { type_name, field } => {
                write!(f, "{type_name}.{field}: duplicate field")
            }
            TypeRegistrationError::UnknownField { type_name, field } => {
                write!(f, "{type_name}.{field}: no such field")
            }
            TypeRegistrationError::IncompatibleValue {
                type_name,
                field,
                message,
            } => write!(f, "{type_name}.{field}: {message}"),
            TypeRegistrationError::NotAnEvent { type_name } => {
                write!(f, "{type_name} is not an event type")
            }
        }
    }
}

impl std::error::Error for TypeRegistrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = FormatError::VersionNotSupported { major: 9, minor: 1 }.into();
        let err = err.context("loading chunk 0");
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::VersionNotSupported { major: 9, minor: 1 })
        );
        assert_eq!(
            err.root_cause().to_string(),
            "chunk version 9.1 is not supported"
        );
    }
}
