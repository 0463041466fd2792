// Copyright 2025 jonefeewang@gmail.com
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


use crate::remote::RemoteLogError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("hub connection with id {0} was not found")]
    HubNotFound(String),

    #[error("hub connection with id {0} already exists")]
    HubExists(String),

    #[error("partition not found: {0}")]
    PartitionNotFound(String),

    #[error("message {sequence_number} not found in partition {partition}")]
    MessageNotFound {
        partition: String,
        sequence_number: i64,
    },

    /// another consumer of the same group holds the partition
    #[error("receiver in use: {0}")]
    ReceiverInUse(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("remote log error: {0}")]
    Remote(RemoteLogError),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Coarse classification an outer surface renders errors by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Timeout,
    BadRequest,
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Timeout => 504,
            ErrorKind::BadRequest => 400,
            ErrorKind::Internal => 500,
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::HubNotFound(_)
            | AppError::PartitionNotFound(_)
            | AppError::MessageNotFound { .. } => ErrorKind::NotFound,
            AppError::HubExists(_) | AppError::ReceiverInUse(_) => ErrorKind::Conflict,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::InvalidQuery(_) => ErrorKind::BadRequest,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<RemoteLogError> for AppError {
    fn from(value: RemoteLogError) -> Self {
        match value {
            RemoteLogError::Conflict(s) => AppError::ReceiverInUse(s),
            RemoteLogError::Timeout(s) => AppError::Timeout(s),
            RemoteLogError::UnknownPartition(s) => AppError::PartitionNotFound(s),
            other => AppError::Remote(other),
        }
    }
}
