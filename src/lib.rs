/*!
 # Timer Appliance Serial Link Library

 A Rust library for talking to a small embedded schedule timer over a serial line
 and for synchronizing a user-edited schedule with the appliance's action memory.

 ## Features

 * Start/stop of scheduled execution
 * Clock read and write
 * Per-slot action read and write
 * Direct switching of a unit, bypassing the schedule
 * Appliance info query
 * Reading and writing a complete schedule with progress and cancellation
 * JSON persistence of the schedule table

 ## Example

 ```rust,no_run
 use timer_link::*;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Initialize tracing for logs
     tracing_subscriber::fmt::init();

     let client = TimerClient::new();
     client.connect(&SerialConfig::new("/dev/ttyUSB0")).await?;

     let info = client.get_info().await?;
     println!("{} action slots", info.capacity());

     let schedule = client.read_schedule(&mut NoProgress, &CancelFlag::new()).await?;
     client.write_schedule(&schedule, &mut NoProgress, &CancelFlag::new()).await?;

     client.close().await?;
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the timer link library
#[derive(Error, Debug)]
pub enum Error {
    /// The serial port could not be opened or configured
    #[error("Could not open {port}: {reason}")]
    Connection { port: String, reason: String },

    /// A connection is already open and must be closed first
    #[error("A connection to {0} is already open")]
    AlreadyConnected(String),

    /// No connection is open
    #[error("Not connected")]
    NotConnected,

    /// The device did not send the expected number of bytes in time
    #[error("Timed out after receiving {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    /// IO error on an open port
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error from the serial port layer
    #[error(transparent)]
    Serial(#[from] tokio_serial::Error),

    /// A device command failed at the transport level
    #[error("Command {command} failed: {source}")]
    Command {
        command: Command,
        #[source]
        source: Box<Error>,
    },

    /// The device answered with its failure flag
    #[error("Device rejected {0}")]
    Rejected(Command),

    /// The device answered with something that is not a valid response
    #[error("Unexpected response to {command}: {detail}")]
    Protocol { command: Command, detail: String },

    /// A value cannot be encoded or parsed
    #[error("Invalid value: {0}")]
    Validation(String),

    /// Operation deliberately unavailable in this build
    #[error("{0} is not supported")]
    NotSupported(&'static str),

    /// The schedule holds more complete rows than the device has slots
    #[error("Schedule has {rows} complete rows but the device only has {capacity} slots")]
    CapacityExceeded { rows: usize, capacity: usize },

    /// Operation was cancelled between two slot operations
    #[error("Operation cancelled")]
    Cancelled,

    /// Error reading or writing a schedule document
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening or configuring the port failed
    Connection,
    /// Timeout, short read or IO failure on an open port
    Transport,
    /// The device sent an unexpected response or a failure flag
    Protocol,
    /// Bad input detected before anything was sent
    Validation,
    /// Everything else
    Other,
}

impl Error {
    /// Classifies the error, looking through command wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } | Error::AlreadyConnected(_) | Error::NotConnected => {
                ErrorKind::Connection
            }
            Error::Timeout { .. } | Error::Io(_) | Error::Serial(_) => ErrorKind::Transport,
            Error::Command { source, .. } => source.kind(),
            Error::Rejected(_) | Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Validation(_) | Error::CapacityExceeded { .. } => ErrorKind::Validation,
            Error::NotSupported(_) | Error::Cancelled | Error::Json(_) => ErrorKind::Other,
        }
    }

    /// The command this error happened in, if any
    pub fn command(&self) -> Option<Command> {
        match self {
            Error::Command { command, .. } => Some(*command),
            Error::Rejected(command) => Some(*command),
            Error::Protocol { command, .. } => Some(*command),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod client;
pub mod device;
pub mod protocol;
pub mod schedule;
pub mod sync;
pub mod transport;
pub mod types;

// Re-export key types
pub use client::TimerClient;
pub use device::TimerDevice;
pub use protocol::{Command, MemoryType, ProvisionInfo};
pub use schedule::{Column, Schedule, ScheduleRow, SlotPlan, SwitchCommand};
pub use sync::{read_schedule, write_schedule, CancelFlag, LogProgress, NoProgress, Progress, WriteReport};
pub use transport::{list_ports, PortInfo, SerialConfig, SerialTransport, Transport};
pub use types::{Action, DateTimeInfo, DeviceInfo, ACTION_RECORD_SIZE};
