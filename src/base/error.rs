use std::error;
use std::fmt;
use std::io;

/// Represents errors that can occur while talking to the LMS4000.
#[derive(Debug)]
pub enum Error {
    /// The TCP connection to the sensor could not be established within the retry budget.
    ConnectionFail { attempts: u32, last: io::Error },

    /// The sensor rejected the `SetAccessMode` login. Contains the raw response telegram.
    AuthenticationRejected { response: String },

    /// A configuration command was not echoed/accepted by the sensor.
    /// Contains the command name and the raw response telegram.
    ConfigurationRejected { command: String, response: String },

    /// A received telegram violates the decode contract. Contains a description naming the field.
    MalformedTelegram { description: String },

    /// A mid-session write or read failed even after the one allowed reconnect.
    ProtocolIo { description: String },

    /// An acquisition run reached a stop condition without accumulating a single point.
    EmptyAcquisition,

    /// An I/O error occurred while communicating with the underlying stream.
    IoError(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConnectionFail { attempts, last } => {
                write!(f, "connection failed after {} attempts: {}", attempts, last)
            }
            Error::AuthenticationRejected { response } => {
                write!(f, "login rejected by sensor: {:?}", response)
            }
            Error::ConfigurationRejected { command, response } => {
                write!(f, "{} not accepted by sensor: {:?}", command, response)
            }
            Error::MalformedTelegram { description } => {
                write!(f, "malformed telegram: {}", description)
            }
            Error::ProtocolIo { description } => write!(f, "protocol io error: {}", description),
            Error::EmptyAcquisition => write!(f, "acquisition ended with no points accumulated"),
            Error::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

/// A specialized `Result` type for LMS4000 operations.
pub type Result<T> = std::result::Result<T, Error>;
