//! RSocket error and result types.
use crate::frame::DecodeError;
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// A Result type aliased for [`Result`]<T, [`Error`]>.
///
/// [`Result`]: std::result::Result
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when handling RSocket streams.
pub struct Error {
    inner: Box<ErrorImpl>,
}

type Source = Box<dyn Send + Sync + StdError>;

struct ErrorImpl {
    kind: Kind,
    source: Option<Source>,
}

#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub(crate) enum Kind {
    // Decode errors
    Decode(DecodeError),

    // Protocol errors
    InvalidSetup,
    UnsupportedSetup,
    RejectedSetup,
    RejectedResume,
    ConnectionError,
    ConnectionClose,
    ApplicationError,
    Rejected,
    Canceled,
    Invalid,

    // Engine-level errors not drawn from the wire error codes themselves, but surfaced
    // through the same `Error` type so callers branch on one thing.
    StreamNotFound,
    HandlerNotFound,
    ReassemblyViolation,
    SetupAlreadySeen,
    PayloadTooLarge,
    InvalidOperationTable,

    // IO errors
    Io,
}

/// A list of valid RSocket protocol error codes.
///
/// See [`here`] for more information about RSocket error codes.
///
/// [`here`]: https://github.com/rsocket/rsocket/blob/master/Protocol.md#error-codes
#[non_exhaustive]
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// The Setup frame is invalid for the server
    /// (it could be that the client is too recent for the old server).
    InvalidSetup       = 0x00000001,
    /// Some (or all) of the parameters specified by the client are unsupported by the server.
    UnsupportedSetup   = 0x00000002,
    /// The server rejected the setup, it can specify the reason in the payload. 
    RejectedSetup      = 0x00000003,
    /// The server rejected the resume, it can specify the reason in the payload.
    RejectedResume     = 0x00000004,
    /// The connection is being terminated. Sender or Receiver of this frame MAY close the 
    /// connection immediately without waiting for outstanding streams to terminate.
    ConnectionError    = 0x00000101,
    /// The connection is being terminated. Sender or Receiver of this frame MUST wait for
    /// outstanding streams to terminate before closing the connection. New requests MAY not be 
    /// accepted.
    ConnectionClose    = 0x00000102,
    /// Application layer logic generating a Reactive Streams onError event.
    ApplicationError   = 0x00000201,
    /// Despite being a valid request, the Responder decided to reject it. 
    /// The Responder guarantees that it didn't process the request.
    Rejected           = 0x00000202,
    /// The Responder canceled the request but may have started processing it 
    /// (similar to REJECTED but doesn't guarantee lack of side-effects).
    Canceled           = 0x00000203,
    /// The request is invalid.
    Invalid            = 0x00000204,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<Source>,
    {
        Error {
            inner: Box::new(ErrorImpl {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    /// Returns true if this error is related to decoding `Bytes`.
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode(_))
    }

    /// Returns true if this error is a RSocket protocol error.
    pub fn is_protocol(&self) -> bool {
        use Kind::*;
        matches!(
            self.inner.kind,
            InvalidSetup
                | UnsupportedSetup
                | RejectedSetup
                | RejectedResume
                | ConnectionError
                | ConnectionClose
                | ApplicationError
                | Rejected
                | Canceled
                | Invalid
        )
    }

    /// Returns true if this error is related to connection setup.
    pub fn is_setup(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::InvalidSetup | Kind::UnsupportedSetup | Kind::RejectedSetup
        )
    }

    /// Returns true if this is protocol error `INVALID_SETUP`.
    pub fn is_invalid_setup(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidSetup)
    }

    /// Returns true if this is protocol error `UNSUPPORTED_SETUP`.
    pub fn is_unsupported_setup(&self) -> bool {
        matches!(self.inner.kind, Kind::UnsupportedSetup)
    }

    /// Returns true if this is protocol error `REJECTED_SETUP`.
    pub fn is_rejected_setup(&self) -> bool {
        matches!(self.inner.kind, Kind::RejectedSetup)
    }

    /// Returns true if this is protocol error `REJECTED_RESUME`.
    pub fn is_rejected_resume(&self) -> bool {
        matches!(self.inner.kind, Kind::RejectedResume)
    }

    /// Returns true if this is protocol error `CONNECTION_ERROR`.
    ///
    /// Sender or Receiver of this error MAY close the connection immediately without waiting
    /// for outstanding streams to terminate.
    pub fn is_connection_error(&self) -> bool {
        matches!(self.inner.kind, Kind::ConnectionError)
    }

    /// Returns true if this is protocol error `CONNECTION_CLOSE`.
    ///
    /// Sender or Receiver of this error MUST wait for outstanding streams to terminate before
    /// closing the connection. New requests MAY not be accepted.
    pub fn is_connection_close(&self) -> bool {
        matches!(self.inner.kind, Kind::ConnectionClose)
    }

    /// Returns true if this is protocol error `APPLICATION_ERROR`.
    pub fn is_application_error(&self) -> bool {
        matches!(self.inner.kind, Kind::ApplicationError)
    }

    /// Returns true if this is protocol error `REJECTED`.
    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.kind, Kind::Rejected)
    }

    /// Returns true if this is protocol error `CANCELED`.
    pub fn is_cancel(&self) -> bool {
        matches!(self.inner.kind, Kind::Canceled)
    }

    /// Returns true if this is protocol error `INVALID`.
    pub fn is_invalid(&self) -> bool {
        matches!(self.inner.kind, Kind::Invalid)
    }

    /// Returns true if this error means a frame referenced a stream ID the registry doesn't
    /// know about.
    pub fn is_stream_not_found(&self) -> bool {
        matches!(self.inner.kind, Kind::StreamNotFound)
    }

    /// Returns true if this error means an operation index has no bound handler.
    pub fn is_handler_not_found(&self) -> bool {
        matches!(self.inner.kind, Kind::HandlerNotFound)
    }

    /// Returns true if this error means a non-PAYLOAD frame arrived while a stream was mid
    /// reassembly.
    pub fn is_reassembly_violation(&self) -> bool {
        matches!(self.inner.kind, Kind::ReassemblyViolation)
    }

    /// Returns true if this error means a second SETUP frame arrived on a connection that
    /// already completed its handshake.
    pub fn is_setup_already_seen(&self) -> bool {
        matches!(self.inner.kind, Kind::SetupAlreadySeen)
    }

    /// Returns true if this error means a payload exceeded the connection's configured frame
    /// size and could not be fragmented (or the peer disallows fragmentation).
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self.inner.kind, Kind::PayloadTooLarge)
    }

    /// Returns true if this error means an operation table failed to parse.
    pub fn is_invalid_operation_table(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidOperationTable)
    }

    /// Maps this error onto the RSocket wire error code used to report it to a peer.
    pub(crate) fn to_wire_code(&self) -> u32 {
        use Kind::*;
        match &self.inner.kind {
            InvalidSetup => Code::InvalidSetup as u32,
            UnsupportedSetup => Code::UnsupportedSetup as u32,
            RejectedSetup | SetupAlreadySeen | InvalidOperationTable => {
                Code::RejectedSetup as u32
            }
            RejectedResume => Code::RejectedResume as u32,
            ConnectionError | Decode(_) | ReassemblyViolation | Io => {
                Code::ConnectionError as u32
            }
            ConnectionClose => Code::ConnectionClose as u32,
            ApplicationError => Code::ApplicationError as u32,
            Rejected | HandlerNotFound | StreamNotFound | PayloadTooLarge => {
                Code::Rejected as u32
            }
            Canceled => Code::Canceled as u32,
            Invalid => Code::Invalid as u32,
        }
    }

    /// Returns the text carried as an ERROR frame's data for this error.
    pub(crate) fn to_wire_message(&self) -> String {
        self.to_string()
    }

    fn description(&self) -> &str {
        use Kind::*;
        match &self.inner.kind {
            InvalidSetup => "INVALID_SETUP (0x00000001)",
            UnsupportedSetup => "UNSUPPORTED_SETUP (0x00000002)",
            RejectedSetup => "REJECTED_SETUP (0x00000003)",
            RejectedResume => "REJECTED_RESUME (0x00000004)",
            ConnectionError => "CONNECTION_ERROR (0x00000101)",
            ConnectionClose => "CONNECTION_CLOSE (0x00000102)",
            ApplicationError => "APPLICATION_ERROR (0x00000201)",
            Rejected => "REJECTED (0x00000202)",
            Canceled => "CANCELED (0x00000203)",
            Invalid => "INVALID (0x00000204)",
            Decode(_) => "error decoding frame",
            StreamNotFound => "stream not found",
            HandlerNotFound => "no handler bound for this operation",
            ReassemblyViolation => "non-payload frame received mid reassembly",
            SetupAlreadySeen => "SETUP already received on this connection",
            PayloadTooLarge => "payload exceeds the configured frame size",
            InvalidOperationTable => "malformed operation table",
            Io => "I/O error",
        }
    }
}

/// Constructs the error sent (or raised locally) when a frame references a stream ID absent
/// from the registry.
pub(crate) fn stream_not_found() -> Error {
    Error::new::<Source>(Kind::StreamNotFound, None)
}

/// Constructs the error used when an operation index has no handler bound to it.
pub(crate) fn handler_not_found() -> Error {
    Error::new::<Source>(Kind::HandlerNotFound, None)
}

/// Constructs the error used when the connection's send half has gone away.
pub(crate) fn connection_close() -> Error {
    Error::new::<Source>(Kind::ConnectionClose, None)
}

/// Constructs the error used when a non-PAYLOAD frame interrupts reassembly.
pub(crate) fn reassembly_violation() -> Error {
    Error::new::<Source>(Kind::ReassemblyViolation, None)
}

/// Constructs the error used when SETUP arrives twice on the same connection.
pub(crate) fn setup_already_seen() -> Error {
    Error::new::<Source>(Kind::SetupAlreadySeen, None)
}

/// Constructs the error used when an operation table fails to decode, carrying `detail` as the
/// error's source message.
pub(crate) fn table_decode_error(detail: &str) -> Error {
    Error::new(Kind::InvalidOperationTable, Some(detail.to_string()))
}

/// Constructs the error used when a payload could not be fragmented under the connection's
/// configured max frame size.
pub(crate) fn payload_too_large() -> Error {
    Error::new::<Source>(Kind::PayloadTooLarge, None)
}

/// Constructs the `APPLICATION_ERROR` raised when a handler's publisher completes with an error.
pub(crate) fn application_error(detail: impl Into<String>) -> Error {
    Error::new(Kind::ApplicationError, Some(detail.into()))
}

/// Constructs the `REJECTED` error sent when a request references an operation index with no
/// bound handler.
pub(crate) fn rejected(detail: impl Into<String>) -> Error {
    Error::new(Kind::Rejected, Some(detail.into()))
}

/// Constructs the `INVALID` error sent when a frame references an absent stream.
pub(crate) fn invalid(detail: impl Into<String>) -> Error {
    Error::new(Kind::Invalid, Some(detail.into()))
}

/// Constructs the `CONNECTION_ERROR` raised (and sent with stream id 0) on decode failures and
/// other connection-fatal conditions.
pub(crate) fn connection_error(detail: impl Into<String>) -> Error {
    Error::new(Kind::ConnectionError, Some(detail.into()))
}

/// Reconstructs an [`Error`] from a wire ERROR frame's `code` and optional UTF-8 `message`,
/// the inverse of [`Error::to_wire_code`]/[`Error::to_wire_message`].
pub(crate) fn from_wire(code: u32, message: Option<String>) -> Error {
    let kind = match code {
        0x0000_0001 => Kind::InvalidSetup,
        0x0000_0002 => Kind::UnsupportedSetup,
        0x0000_0003 => Kind::RejectedSetup,
        0x0000_0004 => Kind::RejectedResume,
        0x0000_0101 => Kind::ConnectionError,
        0x0000_0102 => Kind::ConnectionClose,
        0x0000_0201 => Kind::ApplicationError,
        0x0000_0202 => Kind::Rejected,
        0x0000_0203 => Kind::Canceled,
        _ => Kind::Invalid,
    };
    Error::new(kind, message)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref source) = self.inner.source {
            write!(f, "{}: {}", self.description(), source)
        } else {
            f.write_str(self.description())
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_tuple("iotas::Error");
        f.field(&self.inner.kind);
        if let Some(ref source) = self.inner.source {
            f.field(source);
        }
        f.finish()
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Error {
        let source = e.to_string();
        Error::new(Kind::Decode(e), Some(source))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::new(Kind::Io, Some(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn size_of() {
        assert_eq!(mem::size_of::<Error>(), mem::size_of::<usize>());
    }

    #[test]
    fn assert_send_sync() {
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn from_decode_error() {
        let decode = DecodeError::InComplete;
        let actual: Error = decode.clone().into();
        match actual.inner.kind {
            Kind::Decode(e) => assert_eq!(e, decode),
            _ => panic!("{:?}", actual),
        }
        assert!(actual.inner.source.is_some());
    }
}
