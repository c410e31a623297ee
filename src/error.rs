//! Top-level error type for the `gehete` runtime.

use std;

use gehete_drv_core::error::Error as DrvError;
use gehete_drv_core::Status;

pub type Result<T> = std::result::Result<T, Error>;

/// An enum containing either a lower-layer driver error or one of the
/// runtime's own failure modes. Implements the usual error traits via
/// `thiserror`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Driver(DrvError),
    #[error("transaction id space exhausted for device {device_id}, queue {queue_id}")]
    TransIdExhausted { device_id: i32, queue_id: u32 },
    #[error("queue {queue_id} on device {device_id} is full")]
    QueueFull { device_id: i32, queue_id: u32 },
    #[error("queue {queue_id} on device {device_id} is empty")]
    QueueEmpty { device_id: i32, queue_id: u32 },
    #[error("operation on queue {queue_id} timed out after {waited_ms}ms")]
    Timeout { queue_id: u32, waited_ms: u32 },
    #[error("mbuf payload size {size} exceeds the {limit} byte model input bound")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("model {model_id} has no registered task chain")]
    UnknownModel { model_id: u32 },
    #[error("invalid scheduler task ordering: {0}")]
    TaskOrdering(String),
    #[error("request mbuf carries ret_code {ret_code}, model not executed")]
    ModelRetCode { ret_code: i32 },
    #[error("cluster descriptor {name:?} was re-inserted with a conflicting definition")]
    ClusterDescConflict { name: String },
    #[error("failed to receive from worker channel: {0}")]
    ChannelRecv(String),
    #[error("a lock guarding shared runtime state was poisoned by a panicked thread")]
    PoisonedLock,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    String(String),
}

impl Error {
    pub fn param_invalid<S: Into<String>>(desc: S) -> Error {
        Error::Driver(DrvError::param_invalid(desc))
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Error {
        Error::PoisonedLock
    }
}

impl Error {
    /// The driver status code carried by this error, if any.
    pub fn driver_status(&self) -> Option<Status> {
        match self {
            Error::Driver(err) => err.status(),
            _ => None,
        }
    }
}

impl From<DrvError> for Error {
    fn from(err: DrvError) -> Error {
        Error::Driver(err)
    }
}

impl From<String> for Error {
    fn from(desc: String) -> Error {
        Error::String(desc)
    }
}

impl<'a> From<&'a str> for Error {
    fn from(desc: &'a str) -> Error {
        Error::String(desc.to_owned())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> String {
        err.to_string()
    }
}

unsafe impl Send for Error {}
unsafe impl Sync for Error {}
