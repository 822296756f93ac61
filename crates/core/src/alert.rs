//! Alert payload carried on the alert stream.
//!
//! The health monitor serializes an [`AlertRaised`] into a stream entry; the
//! alert consumer parses it back. Anything that fails to parse here is a
//! permanent payload error: no amount of retrying will fix it.

use serde::{Deserialize, Deserializer, Serialize};

use crate::device::MAX_ALERT_MESSAGE_LEN;
use crate::error::PipelineError;
use crate::types::DbId;

/// Severity tag attached to alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(PipelineError::payload(format!("unknown severity '{other}'"))),
        }
    }
}

/// Payload of an alert-raised stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRaised {
    /// Device that went down. Producers writing flat string fields (as
    /// Redis streams do) send it as a numeric string, which is accepted too.
    #[serde(deserialize_with = "deserialize_id")]
    pub device_id: DbId,
    pub message: String,
    pub severity: Severity,
}

impl AlertRaised {
    /// The event emitted on an UP -> DOWN transition.
    pub fn device_down(device_id: DbId, device_name: &str) -> Self {
        Self {
            device_id,
            message: format!("{device_name} is DOWN"),
            severity: Severity::Critical,
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "device_id": self.device_id,
            "message": self.message,
            "severity": self.severity,
        })
    }

    /// Parse and validate a raw stream payload.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, PipelineError> {
        let parsed: Self = serde_json::from_value(payload.clone()).map_err(PipelineError::payload)?;

        if parsed.device_id <= 0 {
            return Err(PipelineError::payload(format!(
                "device_id must be positive, got {}",
                parsed.device_id
            )));
        }
        if parsed.message.trim().is_empty() {
            return Err(PipelineError::payload("message must not be empty"));
        }
        let len = parsed.message.chars().count();
        if len > MAX_ALERT_MESSAGE_LEN {
            return Err(PipelineError::payload(format!(
                "message is {len} characters, limit is {MAX_ALERT_MESSAGE_LEN}"
            )));
        }

        Ok(parsed)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<DbId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(DbId),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
