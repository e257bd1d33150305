//! Error types used across modules.

use thiserror::Error;

/// Errors produced while encoding or decoding wire data.
///
/// These cover malformed frames, truncated payloads, and values that do not
/// fit the protocol's fixed shapes.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O failure while reading or writing a frame.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame advertised a negative or zero-impossible length.
    #[error("invalid frame length: {0}")]
    InvalidFrameLength(i64),

    /// A frame advertised a body larger than the configured ceiling.
    #[error("frame too large: max {max} got {got}")]
    FrameTooLarge {
        /// Configured ceiling in bytes.
        max: usize,
        /// Advertised body size in bytes.
        got: usize,
    },

    /// The buffer ended before the value being decoded was complete.
    #[error("truncated payload while reading {0}")]
    Truncated(&'static str),

    /// A string field did not contain valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// The request carried an opcode this server does not know.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// The response carried a status byte outside the defined set.
    #[error("unknown status: {0:#04x}")]
    UnknownStatus(u8),

    /// An event list referenced a dictionary index that was never written.
    #[error("event dictionary index {0} out of range")]
    BadDictIndex(i16),
}

/// Errors from the time-series store.
#[derive(Error, Debug)]
pub enum TimeSeriesError {
    /// Constructor arguments violated `1 <= S <= D`.
    #[error("invalid time series configuration: {0}")]
    InvalidConfig(String),

    /// An append was attempted on an already-completed day.
    ///
    /// Should never happen under the rotation protocol; kept as a loud
    /// failure rather than a silent drop.
    #[error("current day {0} is already completed")]
    DayCompleted(i32),

    /// The store's internal lock was poisoned by a panicking thread.
    #[error("time series lock poisoned")]
    LockPoisoned,

    /// Failure while loading persisted state at startup.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors from the on-disk persistence layer.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Underlying filesystem failure.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file existed but its magic number or version did not match.
    #[error("corrupt file {path}: {reason}")]
    Corrupt {
        /// Path of the offending file.
        path: String,
        /// What did not line up.
        reason: String,
    },

    /// A record inside a file could not be decoded.
    #[error("malformed record in {path}: {source}")]
    Malformed {
        /// Path of the offending file.
        path: String,
        /// Decoder error.
        #[source]
        source: ProtocolError,
    },
}

/// Errors from the worker pool.
#[derive(Error, Debug)]
pub enum PoolError {
    /// `execute` was called after `stop`.
    #[error("worker pool is stopped")]
    Stopped,

    /// The queue lock was poisoned by a panicking thread.
    #[error("worker pool lock poisoned")]
    LockPoisoned,
}

/// Errors produced by the TCP server subsystem.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener failed to bind to the requested address.
    #[error("failed to bind TCP listener: {0}")]
    Bind(String),

    /// Error while accepting an incoming connection.
    #[error("failed to accept TCP connection: {0}")]
    Accept(String),

    /// I/O error while talking to a specific client.
    #[error("client I/O error: {0}")]
    ClientIo(String),

    /// A task could not be handed to the worker pool.
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Errors surfaced by the client-side demultiplexer.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// Socket-level failure; once set, every pending and future call fails.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The reader thread went away without delivering a response.
    #[error("connection closed while waiting for response")]
    Disconnected,

    /// Failure while writing the request frame.
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the high-level [`SalesClient`](crate::client::SalesClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure.
    #[error("connection error: {0}")]
    Demux(#[from] DemuxError),

    /// The response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered with a non-OK status.
    #[error("server error ({status}): {message}")]
    Server {
        /// Status name as transmitted.
        status: &'static str,
        /// Human-readable message from the server.
        message: String,
    },

    /// A data operation was attempted before a successful login.
    #[error("not authenticated; log in first")]
    NotAuthenticated,
}

/// High-level errors returned by the server and client binaries.
#[derive(Error, Debug)]
pub enum CliError {
    /// General wrapper around any textual failure.
    #[error("command failed: {0}")]
    General(String),
}

impl From<ServerError> for CliError {
    fn from(err: ServerError) -> Self {
        CliError::General(err.to_string())
    }
}

impl From<PersistenceError> for CliError {
    fn from(err: PersistenceError) -> Self {
        CliError::General(err.to_string())
    }
}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        CliError::General(err.to_string())
    }
}
