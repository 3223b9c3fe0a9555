// Copyright 2024 The mnode Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error codes surfaced to clients (spec §6/§7) and the internal error type
//! that carries them through the catalog core.

use thiserror::Error;

pub type MnodeResult<T> = std::result::Result<T, MnodeError>;

/// Wire error code returned to the client, see spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    TableAlreadyExist,
    DbNotSelected,
    InvalidTable,
    InvalidVgroupId,
    InvalidDb,
    InvalidAcct,
    MonitorDbForbidden,
    NoRights,
    AppError,
    OpsNotSupport,
    OutOfMemory,
    SdbError,
    Others,
}

/// Internal error type for the catalog core. Every fallible path in
/// `mnode_meta` returns `MnodeResult<T>`.
#[derive(Error, Debug)]
pub enum MnodeError {
    #[error("table {0} already exists")]
    TableAlreadyExist(String),

    #[error("database not selected for table {0}")]
    DbNotSelected(String),

    #[error("invalid table {0}")]
    InvalidTable(String),

    #[error("invalid vgroup id {0}")]
    InvalidVgroupId(i32),

    #[error("invalid database {0}")]
    InvalidDb(String),

    #[error("invalid account {0}")]
    InvalidAcct(String),

    #[error("operation forbidden on monitor database {0}")]
    MonitorDbForbidden(String),

    #[error("no rights to alter table {0}")]
    NoRights(String),

    #[error("application error: {0}")]
    AppError(String),

    #[error("operation not supported: {0}")]
    OpsNotSupport(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("catalog store rejected the operation: {0}")]
    SdbError(
        #[source]
        #[from]
        anyhow::Error,
    ),

    #[error("{0}")]
    Others(String),
}

impl MnodeError {
    /// Maps this error to the wire code the client sees (spec §6).
    pub fn code(&self) -> ErrorCode {
        match self {
            MnodeError::TableAlreadyExist(_) => ErrorCode::TableAlreadyExist,
            MnodeError::DbNotSelected(_) => ErrorCode::DbNotSelected,
            MnodeError::InvalidTable(_) => ErrorCode::InvalidTable,
            MnodeError::InvalidVgroupId(_) => ErrorCode::InvalidVgroupId,
            MnodeError::InvalidDb(_) => ErrorCode::InvalidDb,
            MnodeError::InvalidAcct(_) => ErrorCode::InvalidAcct,
            MnodeError::MonitorDbForbidden(_) => ErrorCode::MonitorDbForbidden,
            MnodeError::NoRights(_) => ErrorCode::NoRights,
            MnodeError::AppError(_) => ErrorCode::AppError,
            MnodeError::OpsNotSupport(_) => ErrorCode::OpsNotSupport,
            MnodeError::OutOfMemory => ErrorCode::OutOfMemory,
            MnodeError::SdbError(_) => ErrorCode::SdbError,
            MnodeError::Others(_) => ErrorCode::Others,
        }
    }
}
