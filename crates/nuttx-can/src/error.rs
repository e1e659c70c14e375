use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Coarse classification of a failure, one entry per system call that can go wrong.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Open,
    Close,
    Poll,
    ReadinessMismatch,
    Write,
    Read,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open CAN device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("closing CAN device failed: {0}")]
    Close(#[source] nix::Error),
    #[error("poll failed: {0}")]
    Poll(#[source] nix::Error),
    #[error("device woke up without {expected} readiness")]
    ReadinessMismatch { expected: &'static str },
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("invalid frame: {0}")]
    InvalidFrame(&'static str),
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("read returned {0} bytes, outside the valid message size")]
    BadLength(usize),
    #[error("message carries DLC {dlc} in {len} bytes")]
    BadDlc { dlc: u8, len: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Open { .. } => ErrorKind::Open,
            Error::Close(_) => ErrorKind::Close,
            Error::Poll(_) => ErrorKind::Poll,
            Error::ReadinessMismatch { .. } => ErrorKind::ReadinessMismatch,
            Error::Write(_) | Error::ShortWrite { .. } | Error::InvalidFrame(_) => {
                ErrorKind::Write
            }
            Error::Read(_) | Error::BadLength(_) | Error::BadDlc { .. } => ErrorKind::Read,
        }
    }
}
