//! Error taxonomy for the message queue service (spec.md §7).
//!
//! `MsgError` is the in-process `Result` error type. Every variant also maps
//! to a stable `ErrorCode` that is written into the `error` field of a
//! response header, so a client sees the same taxonomy whether the failure
//! happened locally (router) or after a round trip through the transport
//! (apply engine).

use thiserror::Error;

/// Wire-stable error code, carried in every response/record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    Ok = 0,
    NotExist = 1,
    Exist = 2,
    BadHandle = 3,
    InvalidParam = 4,
    NoMemory = 5,
    TryAgain = 6,
    Timeout = 7,
    QueueFull = 8,
    Library = 9,
    Security = 10,
    Interrupt = 11,
}

impl ErrorCode {
    pub fn from_wire(code: u32) -> Self {
        match code {
            0 => ErrorCode::Ok,
            1 => ErrorCode::NotExist,
            2 => ErrorCode::Exist,
            3 => ErrorCode::BadHandle,
            4 => ErrorCode::InvalidParam,
            5 => ErrorCode::NoMemory,
            6 => ErrorCode::TryAgain,
            7 => ErrorCode::Timeout,
            8 => ErrorCode::QueueFull,
            9 => ErrorCode::Library,
            10 => ErrorCode::Security,
            _ => ErrorCode::Interrupt,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MsgError {
    #[error("named entity does not exist")]
    NotExist,
    #[error("name already in use")]
    Exist,
    #[error("handle is not active")]
    BadHandle,
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("allocator failure during apply")]
    NoMemory,
    #[error("transient: try again")]
    TryAgain,
    #[error("deadline exceeded")]
    Timeout,
    #[error("per-priority quota exceeded")]
    QueueFull,
    #[error("IPC framing error")]
    Library,
    #[error("local credential check failed")]
    Security,
    #[error("operation was interrupted")]
    Interrupt,
}

impl MsgError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MsgError::NotExist => ErrorCode::NotExist,
            MsgError::Exist => ErrorCode::Exist,
            MsgError::BadHandle => ErrorCode::BadHandle,
            MsgError::InvalidParam(_) => ErrorCode::InvalidParam,
            MsgError::NoMemory => ErrorCode::NoMemory,
            MsgError::TryAgain => ErrorCode::TryAgain,
            MsgError::Timeout => ErrorCode::Timeout,
            MsgError::QueueFull => ErrorCode::QueueFull,
            MsgError::Library => ErrorCode::Library,
            MsgError::Security => ErrorCode::Security,
            MsgError::Interrupt => ErrorCode::Interrupt,
        }
    }
}

pub type MsgResult<T> = Result<T, MsgError>;
