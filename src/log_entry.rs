// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Log entry data structure.
//!
//! The [`LogEntry`] is the unit that flows through every write path: the
//! resilient single-entry path, the disk fallback queue and the bulk path.
//! Field names on the wire (and on disk) match the search backend's index
//! mapping, e.g. `log_level` and `@timestamp`.
//!
//! # Example
//!
//! ```
//! use log_relay::{LogEntry, LogLevel};
//!
//! let entry = LogEntry::new(LogLevel::Error, "payment gateway timed out")
//!     .with_source("billing")
//!     .with_metadata("attempt", 3);
//!
//! assert_eq!(entry.level, LogLevel::Error);
//! assert_eq!(entry.source.as_deref(), Some("billing"));
//!
//! let json = serde_json::to_value(&entry).unwrap();
//! assert_eq!(json["log_level"], "Error");
//! assert!(json.get("@timestamp").is_some());
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity of a log entry, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(alias = "verbose")]
    Verbose = 1,
    #[serde(alias = "debug")]
    Debug = 2,
    #[serde(alias = "information", alias = "info", alias = "Info")]
    Information = 3,
    #[serde(alias = "success")]
    Success = 4,
    #[serde(alias = "warning", alias = "warn", alias = "Warn")]
    Warning = 5,
    #[serde(alias = "error")]
    Error = 6,
    #[serde(alias = "fatal")]
    Fatal = 7,
}

impl LogLevel {
    /// Numeric severity code (1 = Verbose ... 7 = Fatal).
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Verbose => "Verbose",
            Self::Debug => "Debug",
            Self::Information => "Information",
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
        };
        f.write_str(name)
    }
}

/// A single log event destined for the search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier, also used as the backend document id
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(rename = "log_level")]
    pub level: LogLevel,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Acceptance time. Overwritten by every write path when the entry is accepted.
    #[serde(rename = "@timestamp", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(rename = "ip_address", default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Free-form structured context
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl LogEntry {
    /// Create an entry with a fresh id and the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            exception: None,
            trace_id: None,
            user_id: None,
            source: None,
            timestamp: Utc::now(),
            category: None,
            ip: None,
            code: None,
            code_description: None,
            user_role: None,
            correlation_id: None,
            tenant_id: None,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Overwrite the timestamp with the current time.
    ///
    /// Called by the write paths at the moment they accept the entry; a
    /// caller-supplied timestamp is not preserved.
    pub fn stamp_accepted(&mut self) {
        self.timestamp = Utc::now();
    }
}
