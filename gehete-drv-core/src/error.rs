//! Low-level error type for the driver wrapper layer.

use std::ffi;
use std::fmt;
use failure::{Backtrace, Context, Fail};

use crate::types::Status;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "")]
    Void,
    #[fail(display = "driver call failed with status {:?}", _0)]
    DriverStatus(Status),
    #[fail(display = "invalid parameter: {}", _0)]
    ParamInvalid(String),
    #[fail(display = "{}", _0)]
    String(String),
    #[fail(display = "{}", _0)]
    Io(::std::io::Error),
    #[fail(display = "{}", _0)]
    FfiNul(ffi::NulError),
    #[fail(display = "transaction id space exhausted for this (device, queue)")]
    Exhausted,
}

/// An error produced by a `gehete-drv-core` call.
///
/// Wraps a `failure::Context<ErrorKind>`, the same shape `ocl-core::error::Error`
/// uses: a `kind()`/`cause()`/`backtrace()` surface plus a bag of `From` impls
/// so call sites can use `?` directly against driver, I/O, and FFI errors.
#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

impl Error {
    pub fn param_invalid<S: Into<String>>(desc: S) -> Error {
        Error { inner: Context::new(ErrorKind::ParamInvalid(desc.into())) }
    }

    pub fn driver_status(status: Status) -> Error {
        Error { inner: Context::new(ErrorKind::DriverStatus(status)) }
    }

    pub fn exhausted() -> Error {
        Error { inner: Context::new(ErrorKind::Exhausted) }
    }

    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    /// The driver status code carried by this error, if any.
    pub fn status(&self) -> Option<Status> {
        match self.kind() {
            ErrorKind::DriverStatus(s) => Some(*s),
            _ => None,
        }
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error { inner: Context::new(kind) }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}

impl From<String> for Error {
    fn from(desc: String) -> Error {
        Error { inner: Context::new(ErrorKind::String(desc)) }
    }
}

impl<'a> From<&'a str> for Error {
    fn from(desc: &'a str) -> Error {
        Error { inner: Context::new(ErrorKind::String(desc.to_owned())) }
    }
}

impl From<::std::io::Error> for Error {
    fn from(err: ::std::io::Error) -> Error {
        Error { inner: Context::new(ErrorKind::Io(err)) }
    }
}

impl From<ffi::NulError> for Error {
    fn from(err: ffi::NulError) -> Error {
        Error { inner: Context::new(ErrorKind::FfiNul(err)) }
    }
}

unsafe impl Send for Error {}
unsafe impl Sync for Error {}
