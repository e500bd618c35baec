// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {crate::fw_api::CommandId, thiserror::Error};

/// Failures reported by a `Transport` implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("firmware is not running")]
    DeviceStopped,
    #[error("radio is disabled by RF kill")]
    RfKill,
    #[error("timed out waiting for {0:?}")]
    Timeout(CommandId),
    #[error("transport I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}: no free slot left")]
    ResourceExhausted(&'static str),
    #[error("{0} is already in progress")]
    Busy(&'static str),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("firmware rejected {cmd:?} with status {status:#x}")]
    FirmwareRejected { cmd: CommandId, status: u32 },
    #[error("contract violation: {0}")]
    ProtocolViolation(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("not supported: {0}")]
    NotSupported(&'static str),
    #[error("refused: {0}")]
    Refused(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
}

impl Error {
    /// Errno-style code handed back to a C upper stack.
    pub fn errno(&self) -> i32 {
        match self {
            Error::ResourceExhausted(_) => -libc_errno::ENOSPC,
            Error::Busy(_) => -libc_errno::EBUSY,
            Error::Timeout(_) => -libc_errno::EIO,
            Error::InvalidTransition(_) => -libc_errno::EIO,
            Error::FirmwareRejected { .. } => -libc_errno::EIO,
            Error::ProtocolViolation(_) => -libc_errno::EIO,
            Error::InvalidArgument(_) => -libc_errno::EINVAL,
            Error::NotSupported(_) => -libc_errno::EOPNOTSUPP,
            Error::Refused(_) => -libc_errno::EINVAL,
            Error::Transport(TransportError::RfKill) => -libc_errno::ERFKILL,
            Error::Transport(TransportError::Timeout(_)) => -libc_errno::ETIMEDOUT,
            Error::Transport(_) => -libc_errno::EIO,
            Error::Config(_) | Error::ConfigIo(_) => -libc_errno::EINVAL,
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Busy(_) | Error::Timeout(_) | Error::Transport(TransportError::Timeout(_)) => {
                true
            }
            _ => false,
        }
    }

    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        log::warn!("{}", msg);
        Error::ProtocolViolation(msg)
    }
}

mod libc_errno {
    pub const EIO: i32 = 5;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const EOPNOTSUPP: i32 = 95;
    pub const ETIMEDOUT: i32 = 110;
    pub const ERFKILL: i32 = 132;
}

pub trait ResultExt {
    /// Returns 0 if Self is Ok, otherwise logs the error and turns it into a negative errno.
    fn into_errno(self) -> i32;
}

impl ResultExt for Result<(), Error> {
    fn into_errno(self) -> i32 {
        match self {
            Ok(()) => 0,
            Err(e) => {
                log::error!("{}", e);
                e.errno()
            }
        }
    }
}
