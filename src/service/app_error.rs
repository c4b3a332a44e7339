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

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// backend errors
    #[error("failed to open backend at {location}: {reason}")]
    BackendOpen { location: String, reason: String },

    #[error("failed to write key {key} into partition {partition}: {reason}")]
    BackendWrite {
        partition: String,
        key: String,
        reason: String,
    },

    #[error("rocksdb error: {0}")]
    RocksError(#[from] rocksdb::Error),

    #[error("task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("submit error: {0}")]
    SubmitError(#[from] crate::SubmitError),
}
