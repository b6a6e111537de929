use core::fmt;

/// The error type for parsing of segment headers.
///
/// Note that malformed *options* are never an error. The options codec skips what it can not
/// understand and the connection proceeds with fewer negotiated features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The packet may be shorter than the fixed header or its data offset may point beyond the
    /// end of the received data.
    Truncated,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Example: a TCP header whose data offset is smaller than the fixed header itself.
    Malformed,
}

/// The result type for the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated packet"),
            Error::Malformed => write!(f, "malformed packet"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
