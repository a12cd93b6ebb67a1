use std::sync::Arc;

use thiserror::Error;

/// The error type of all sluice operations.
///
/// The kind is shared behind an `Arc`, so an `Error` is cheap to clone. This is what
/// allows a failure captured on a worker thread to be handed out again on every
/// subsequent call that observes it.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct Error(Arc<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
        .into()
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        ErrorKind::InvalidOperation { name: name.into() }.into()
    }

    pub fn pool_stopped() -> Error {
        ErrorKind::PoolStopped.into()
    }

    pub fn task_aborted() -> Error {
        ErrorKind::TaskAborted.into()
    }

    /// Wraps an error raised by a map function.
    ///
    /// Accepts anything convertible into a boxed error, including `String` and `&str`.
    pub fn transform(source: impl Into<StdErrorBoxed>) -> Error {
        ErrorKind::Transform {
            source: source.into(),
        }
        .into()
    }

    pub fn transform_panicked(message: impl Into<String>) -> Error {
        ErrorKind::TransformPanicked {
            message: message.into(),
        }
        .into()
    }

    pub fn source_error(source: impl Into<StdErrorBoxed>) -> Error {
        ErrorKind::Source {
            source: source.into(),
        }
        .into()
    }

    pub fn tape_exhausted() -> Error {
        ErrorKind::TapeExhausted.into()
    }

    pub fn corrupt_tape(message: impl Into<String>) -> Error {
        ErrorKind::CorruptTape {
            message: message.into(),
        }
        .into()
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        ErrorKind::Io {
            context: context.into(),
            source,
        }
        .into()
    }

    pub fn is_transform_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transform { .. } | ErrorKind::TransformPanicked { .. }
        )
    }

    /// Returns `true` if both values refer to the same captured failure.
    pub fn same_failure(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("thread pool is stopped and does not accept new work")]
    PoolStopped,

    #[error("task was aborted before producing a result")]
    TaskAborted,

    #[error("map function failed: {source}")]
    Transform { source: StdErrorBoxed },

    #[error("map function panicked: {message}")]
    TransformPanicked { message: String },

    #[error("data source failed: {source}")]
    Source { source: StdErrorBoxed },

    #[error("attempted to read past the end of the tape")]
    TapeExhausted,

    #[error("tape is corrupt: {message}")]
    CorruptTape { message: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(Arc::new(kind))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Self {
        Error::corrupt_tape(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Self {
        Error::corrupt_tape(format!("failed to encode value: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_clone_shares_kind() {
        let e1 = Error::transform("boom");
        let e2 = e1.clone();
        assert!(e1.same_failure(&e2));
        assert!(e2.is_transform_failure());
        assert_eq!(e2.to_string(), "map function failed: boom");

        let e3 = Error::transform("boom");
        assert!(!e1.same_failure(&e3));
    }

    #[test]
    fn test_error_kinds() {
        assert!(matches!(Error::pool_stopped().kind(), ErrorKind::PoolStopped));
        assert!(matches!(
            Error::invalid_arg("fns", "empty").kind(),
            ErrorKind::InvalidArgument { .. }
        ));
        assert!(Error::transform_panicked("oops").is_transform_failure());
        assert!(!Error::tape_exhausted().is_transform_failure());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: Error = io.into();
        assert!(matches!(e.kind(), ErrorKind::Io { .. }));
        assert!(std::error::Error::source(&e).is_some());
    }
}
