// SPDX-License-Identifier: GPL-2.0-or-later

pub mod geometry;
pub mod roi;
pub mod time;

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, ops::Deref, path::PathBuf, str::FromStr, sync::Arc};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub type ArcLogger = Arc<dyn ILogger + Send + Sync>;

pub trait ILogger {
    /// Send log.
    fn log(&self, _: LogEntry) {}
}

/// Log entry. The logger applies the timestamp.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub source: LogSource,
    pub camera_id: Option<CameraId>,
    pub message: String,
}

impl LogEntry {
    #[allow(clippy::unwrap_used)]
    #[must_use]
    pub fn new(level: LogLevel, source: &'static str, message: &str) -> Self {
        Self {
            level,
            source: source.try_into().expect("source should be valid"),
            camera_id: None,
            message: message.to_owned(),
        }
    }
}

/// Severity of the log message.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Something requires attention.
    Error,

    /// Something may require attention.
    Warning,

    /// Standard information.
    Info,

    /// Verbose debugging information.
    Debug,
}

#[derive(Debug, Error)]
pub enum ParseLogLevelError {
    #[error("unknown log level: '{0}'")]
    UnknownLevel(String),
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(LogLevel::Error),
            "warning" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(ParseLogLevelError::UnknownLevel(s.to_owned())),
        }
    }
}

#[macro_export]
macro_rules! impl_deserialize_try_from_and_display {
    ($type:ident) => {
        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                String::deserialize(deserializer)?
                    .try_into()
                    .map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

pub const LOG_SOURCE_MAX_LENGTH: usize = 8;

#[repr(transparent)]
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, PartialOrd, Ord)]
pub struct LogSource(Cow<'static, str>);
impl_deserialize_try_from_and_display!(LogSource);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseLogSourceError {
    #[error("empty string")]
    Empty,

    #[error("invalid characters: '{0}'")]
    InvalidChars(String),

    #[error("too long")]
    TooLong,
}

impl TryFrom<String> for LogSource {
    type Error = ParseLogSourceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseLogSourceError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        if !s.chars().all(char::is_alphanumeric) {
            return Err(InvalidChars(s));
        }
        if s.len() > LOG_SOURCE_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(Cow::Owned(s)))
    }
}

impl TryFrom<&'static str> for LogSource {
    type Error = ParseLogSourceError;

    fn try_from(s: &'static str) -> Result<Self, Self::Error> {
        use ParseLogSourceError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        if !s.chars().all(char::is_alphanumeric) {
            return Err(InvalidChars(s.to_owned()));
        }
        if s.len() > LOG_SOURCE_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(Cow::Borrowed(s)))
    }
}

impl FromStr for LogSource {
    type Err = ParseLogSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_owned().try_into()
    }
}

impl Deref for LogSource {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct DummyLogger;

impl DummyLogger {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(DummyLogger {})
    }
}

impl ILogger for DummyLogger {
    fn log(&self, _: LogEntry) {}
}

pub const CAMERA_ID_MAX_LENGTH: usize = 64;

const ALLOWED_ID_CHARS: [char; 2] = ['_', '-'];

#[repr(transparent)]
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CameraId(String);
impl_deserialize_try_from_and_display!(CameraId);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCameraIdError {
    #[error("empty string")]
    Empty,

    #[error("invalid character: '{0}'")]
    InvalidChar(char),

    #[error("max length is {CAMERA_ID_MAX_LENGTH}")]
    TooLong,
}

impl TryFrom<String> for CameraId {
    type Error = ParseCameraIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseCameraIdError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        for c in s.chars() {
            if !c.is_ascii_alphanumeric() && !ALLOWED_ID_CHARS.contains(&c) {
                return Err(InvalidChar(c));
            }
        }
        if s.len() > CAMERA_ID_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(s))
    }
}

impl FromStr for CameraId {
    type Err = ParseCameraIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_owned().try_into()
    }
}

impl Deref for CameraId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const ROI_ID_MAX_LENGTH: usize = 64;

#[repr(transparent)]
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RoiId(String);
impl_deserialize_try_from_and_display!(RoiId);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRoiIdError {
    #[error("empty string")]
    Empty,

    #[error("invalid character: '{0}'")]
    InvalidChar(char),

    #[error("max length is {ROI_ID_MAX_LENGTH}")]
    TooLong,
}

impl TryFrom<String> for RoiId {
    type Error = ParseRoiIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseRoiIdError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        for c in s.chars() {
            if !c.is_ascii_alphanumeric() && !ALLOWED_ID_CHARS.contains(&c) {
                return Err(InvalidChar(c));
            }
        }
        if s.len() > ROI_ID_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(s))
    }
}

impl FromStr for RoiId {
    type Err = ParseRoiIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_owned().try_into()
    }
}

impl Deref for RoiId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum WriteFileAtomicError {
    #[error("open file: {0}")]
    OpenFile(std::io::Error),

    #[error("write file: {0}")]
    WriteFile(std::io::Error),

    #[error("sync file: {0}")]
    SyncFile(std::io::Error),

    #[error("rename file: {0}")]
    RenameFile(std::io::Error),
}

// Writes to a temporary file first and then renames it into place,
// so readers never observe a partially written file.
pub async fn write_file_atomic(
    file_path: PathBuf,
    temp_file_path: PathBuf,
    content: Vec<u8>,
) -> Result<(), WriteFileAtomicError> {
    use WriteFileAtomicError::*;
    let mut file = tokio::fs::File::create(&temp_file_path)
        .await
        .map_err(OpenFile)?;
    file.write_all(&content).await.map_err(WriteFile)?;
    file.sync_all().await.map_err(SyncFile)?;
    tokio::fs::rename(&temp_file_path, &file_path)
        .await
        .map_err(RenameFile)
}
