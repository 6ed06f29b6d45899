//! Crate-wide error type
//!
//! Every error carries a kind, an optional operation label and an optional
//! cause chain. Subsystems declare their own leaf errors (see
//! `zcode::DecodeError`, `microindex::IndexError`) and convert them into
//! this type with the kind fixed at the conversion site.

use std::fmt;
use std::io;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unclassified failure
    Other,
    /// Caller misuse or malformed input
    Invalid,
    /// Lookup missed or file absent
    NotFound,
    /// Create-if-absent conflict
    Exists,
    /// Write collides with an in-flight operation
    Conflict,
}

impl ErrorKind {
    /// Human readable description of the kind
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Other => "other error",
            ErrorKind::Invalid => "invalid operation",
            ErrorKind::NotFound => "item does not exist",
            ErrorKind::Exists => "item already exists",
            ErrorKind::Conflict => "conflict with pending operation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Error with kind, operation label and cause chain
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    op: Option<String>,
    cause: Option<Cause>,
}

impl Error {
    /// Create an error of the given kind with a message as its cause
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            kind,
            op: None,
            cause: Some(message.into()),
        }
    }

    /// Create an error of the given kind wrapping an arbitrary cause
    pub fn from_cause<E>(kind: ErrorKind, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            op: None,
            cause: Some(Box::new(cause)),
        }
    }

    /// Create an error that consists of only a kind
    pub fn bare(kind: ErrorKind) -> Self {
        Self {
            kind,
            op: None,
            cause: None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exists, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Wrap an error with an operation label. The kind of the inner error
    /// is preserved so callers can still match on it.
    pub fn wrap(op: impl Into<String>, inner: Error) -> Self {
        Self {
            kind: inner.kind,
            op: Some(op.into()),
            cause: Some(Box::new(inner)),
        }
    }

    /// Attach an operation label to this error
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the operation label, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Returns true if this error or any error in its chain is of `kind`
    pub fn is(&self, kind: ErrorKind) -> bool {
        if self.kind == kind {
            return true;
        }
        match self.cause.as_ref().and_then(|c| c.downcast_ref::<Error>()) {
            Some(inner) => inner.is(kind),
            None => false,
        }
    }

    /// Returns true if the chain bottoms out in a context cancellation
    pub fn is_canceled(&self) -> bool {
        let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = cause {
            if err.downcast_ref::<crate::context::Canceled>().is_some() {
                return true;
            }
            cause = err.source();
        }
        false
    }

    /// The message projection: the innermost cause text, or the kind
    /// description when there is no cause.
    pub fn message(&self) -> String {
        match &self.cause {
            Some(cause) => match cause.downcast_ref::<Error>() {
                Some(inner) => inner.message(),
                None => cause.to_string(),
            },
            None => self.kind.description().to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if let Some(op) = &self.op {
            write!(f, "{}", op)?;
            sep = ": ";
        }
        // A wrapped crate error already renders its own kind.
        let wrapped = self
            .cause
            .as_ref()
            .map(|c| c.is::<Error>())
            .unwrap_or(false);
        if !wrapped && self.kind != ErrorKind::Other {
            write!(f, "{}{}", sep, self.kind)?;
            sep = ": ";
        }
        if let Some(cause) = &self.cause {
            write!(f, "{}{}", sep, cause)?;
        } else if self.kind == ErrorKind::Other {
            write!(f, "{}{}", sep, self.kind)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => ErrorKind::Exists,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => ErrorKind::Invalid,
            _ => ErrorKind::Other,
        };
        Self::from_cause(kind, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::from_cause(ErrorKind::Invalid, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_omits_kind_with_cause() {
        let err = Error::invalid("bad key");
        assert_eq!(err.message(), "bad key");
        assert_eq!(err.to_string(), "invalid operation: bad key");
    }

    #[test]
    fn test_message_without_cause_is_kind() {
        let err = Error::bare(ErrorKind::NotFound);
        assert_eq!(err.message(), "item does not exist");
        assert_eq!(err.to_string(), "item does not exist");
    }

    #[test]
    fn test_wrap_preserves_kind() {
        let inner = Error::not_found("index.mdx");
        let outer = Error::wrap("scope over", inner);
        assert_eq!(outer.kind(), ErrorKind::NotFound);
        assert!(outer.is(ErrorKind::NotFound));
        assert_eq!(outer.message(), "index.mdx");
        assert_eq!(
            outer.to_string(),
            "scope over: item does not exist: index.mdx"
        );
    }

    #[test]
    fn test_io_not_found_maps_kind() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error as _;
        let outer = Error::wrap("op", Error::conflict("busy"));
        let src = outer.source().unwrap();
        assert!(src.downcast_ref::<Error>().is_some());
    }
}
