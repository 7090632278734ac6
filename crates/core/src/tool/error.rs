use std::borrow::Cow;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The tool host could not be reached, answered with an error, or sent
    /// something that could not be decoded.
    Transport,
    /// The tool produced no content at all.
    EmptyResult,
    /// The first content item is not text.
    UnexpectedContent,
    /// No session has been established with the tool host.
    NotConnected,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transport => write!(f, "Transport error"),
            ErrorKind::EmptyResult => write!(f, "Empty result"),
            ErrorKind::UnexpectedContent => write!(f, "Unexpected content"),
            ErrorKind::NotConnected => write!(f, "Not connected"),
        }
    }
}

/// Describes a tool call error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    reason: Option<String>,
}

impl Error {
    #[inline]
    fn with_kind(kind: ErrorKind) -> Self {
        Self { kind, reason: None }
    }

    /// Creates a new error with the `Transport` kind.
    #[inline]
    pub fn transport() -> Self {
        Self::with_kind(ErrorKind::Transport)
    }

    /// Creates a new error with the `EmptyResult` kind.
    #[inline]
    pub fn empty_result() -> Self {
        Self::with_kind(ErrorKind::EmptyResult)
    }

    /// Creates a new error with the `UnexpectedContent` kind, naming the
    /// content kind that was found instead of text.
    #[inline]
    pub fn unexpected_content(found: &str) -> Self {
        Self::with_kind(ErrorKind::UnexpectedContent)
            .with_reason(format!("expected text content, got {found}"))
    }

    /// Creates a new error with the `NotConnected` kind.
    #[inline]
    pub fn not_connected() -> Self {
        Self::with_kind(ErrorKind::NotConnected)
    }

    /// Attaches a reason to the error.
    #[inline]
    pub fn with_reason<S: Into<String>>(self, reason: S) -> Self {
        Self {
            kind: self.kind,
            reason: Some(reason.into()),
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> Cow<'_, str> {
        match self.reason.as_deref() {
            Some(reason) => Cow::Borrowed(reason),
            None => Cow::Owned(format!("{}", self.kind)),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}: {reason}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}
