//! Status and error types
//!
//! [`Error`] carries the status codes every send/parse operation reports.
//! [`FrameError`] describes why the receiver dropped a frame; it is always
//! frame-scoped and never takes a port down.

/// Status code reported on the wire/API for a successful operation
pub const STATUS_OK: u8 = 0;

/// Protocol operation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Unspecified failure (unknown port, endpoint or registry full)
    Generic,
    /// Message type byte is not one of the known types
    MsgTypeNotSupported,
    /// Extension processing was rejected by the application
    ExtensionFailed,
    /// Extension block is malformed or cannot be carried by this header
    InvalidExtension,
    /// Declared or packed length does not fit the frame
    MsgLengthInvalid,
    /// Attribute is gated behind an extension key that was not supplied
    KeyRequired,
    /// Checksum or CRC32 verification failed on a received frame
    RxMsgCrc32Fail,
    /// No registered endpoint handles this attribute
    AttNotHandled,
    /// The transport refused the outbound frame
    Transport,
}

impl Error {
    /// Numeric status code (0 is reserved for OK)
    pub fn code(self) -> u8 {
        match self {
            Error::Generic | Error::Transport => 1,
            Error::MsgTypeNotSupported => 2,
            Error::ExtensionFailed => 3,
            Error::InvalidExtension => 4,
            Error::MsgLengthInvalid => 5,
            Error::KeyRequired => 6,
            Error::RxMsgCrc32Fail => 7,
            Error::AttNotHandled => 8,
        }
    }
}

/// Collapse an operation result into its numeric status code
pub fn status_code(result: Result<(), Error>) -> u8 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => e.code(),
    }
}

/// Reasons a received frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Protocol version byte not supported (or legacy header not installed)
    VersionMismatch,
    /// Length fields out of bounds or inconsistent with each other
    LengthInvalid,
    /// Receive counter reached the buffer capacity
    Overrun,
    /// 8-bit checksum mismatch
    ChecksumMismatch,
    /// CRC32 trailer mismatch
    Crc32Mismatch,
    /// Message type byte unknown
    UnsupportedType,
    /// Extension block reserved bytes are not zero
    InvalidExtension,
    /// Header does not fit in the declared body
    HeaderInvalid,
    /// Buffer ended before a frame completed
    Incomplete,
    /// Buffer holds bytes outside the single frame being decoded
    ExtraBytes,
}

impl FrameError {
    /// Failures counted against the port's checksum failure counter
    pub fn is_integrity_failure(self) -> bool {
        matches!(self, FrameError::ChecksumMismatch | FrameError::Crc32Mismatch)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::VersionMismatch => Error::Generic,
            FrameError::LengthInvalid
            | FrameError::Overrun
            | FrameError::HeaderInvalid
            | FrameError::Incomplete
            | FrameError::ExtraBytes => Error::MsgLengthInvalid,
            FrameError::ChecksumMismatch | FrameError::Crc32Mismatch => Error::RxMsgCrc32Fail,
            FrameError::UnsupportedType => Error::MsgTypeNotSupported,
            FrameError::InvalidExtension => Error::InvalidExtension,
        }
    }
}
