use core::fmt;
use std::io;

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Returns early with an [`Error`] of the given kind, formatting the remaining arguments into its
/// message.
macro_rules! bail {
    ($kind:ident, $($args:tt)*) => {
        return Err($crate::error::Error::new(
            $crate::error::ErrorKind::$kind,
            format!($($args)*),
        ))
    };
}

/// The error type returned when decoding fails.
pub struct Error {
    kind: ErrorKind,
    repr: Repr,
}

/// Broad classification of decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The input could not be opened, or it was empty.
    Open,
    /// The input is structurally invalid or truncated.
    Format,
    /// No Huffman code matched within 16 bits, or a scan referenced an undefined Huffman table.
    HuffmanLookup,
    /// The input is well-formed but uses a feature outside of baseline decoding.
    Unsupported,
}

pub(crate) enum Repr {
    Other(String),
    Io(io::Error),
}

impl From<String> for Repr {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}
impl<'a> From<&'a str> for Repr {
    fn from(value: &'a str) -> Self {
        Self::Other(value.into())
    }
}
impl From<io::Error> for Repr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, e: impl Into<Repr>) -> Self {
        Self {
            kind,
            repr: e.into(),
        }
    }

    pub(crate) fn format(e: impl Into<Repr>) -> Self {
        Self::new(ErrorKind::Format, e)
    }

    pub(crate) fn truncated() -> Self {
        Self::format("reached end of data while decoding JPEG stream")
    }

    /// Returns the kind of failure this error represents.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Other(s) => write!(f, "{:?}: {}", self.kind, s),
            Repr::Io(e) => write!(f, "{:?}: {:?}", self.kind, e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Other(s) => s.fmt(f),
            Repr::Io(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.repr {
            Repr::Other(_) => None,
            Repr::Io(e) => Some(e),
        }
    }
}
