//! Records exchanged with the backend.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Machine status as stored on the computer record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "StatusRepr", into = "u8")]
pub enum ComputerStatus {
    Offline,
    Running,
    Idle,
}

impl ComputerStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Offline => 0,
            Self::Running => 1,
            Self::Idle => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Offline),
            1 => Some(Self::Running),
            2 => Some(Self::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for ComputerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::Running => write!(f, "running"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

impl From<ComputerStatus> for u8 {
    fn from(status: ComputerStatus) -> Self {
        status.code()
    }
}

// Some collections store the status as a select field, so the code can come
// back as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum StatusRepr {
    Code(u8),
    Text(String),
}

impl TryFrom<StatusRepr> for ComputerStatus {
    type Error = String;

    fn try_from(repr: StatusRepr) -> Result<Self, Self::Error> {
        let code = match repr {
            StatusRepr::Code(code) => code,
            StatusRepr::Text(text) if text.is_empty() => return Ok(Self::Offline),
            StatusRepr::Text(text) => text
                .trim()
                .parse::<u8>()
                .map_err(|_| format!("invalid computer status: {text:?}"))?,
        };
        Self::from_code(code).ok_or_else(|| format!("unknown computer status code: {code}"))
    }
}

fn default_status() -> ComputerStatus {
    ComputerStatus::Offline
}

/// Host identity record this agent represents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Computer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub region: String,
    #[serde(default = "default_status")]
    pub status: ComputerStatus,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

/// One requested unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub logs: String,
    #[serde(default)]
    pub computer: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub updated: String,
}

impl Execution {
    /// Minimal pending execution, mostly useful for tests and local runs.
    pub fn pending(id: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            executable: executable.into(),
            completed: false,
            logs: String::new(),
            computer: String::new(),
            user: String::new(),
            script: String::new(),
            created: String::new(),
            updated: String::new(),
        }
    }
}

/// Partial update for a computer record. Unset fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ComputerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ComputerStatus>,
}

impl ComputerPatch {
    pub fn status(status: ComputerStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Partial update for an execution record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExecutionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl ExecutionPatch {
    pub fn started(logs: impl Into<String>) -> Self {
        Self {
            logs: Some(logs.into()),
            completed: None,
        }
    }

    pub fn finished(logs: impl Into<String>) -> Self {
        Self {
            logs: Some(logs.into()),
            completed: Some(true),
        }
    }
}

/// Kind of change carried by a push event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

/// Push notification that an execution record changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub action: EventAction,
    pub record: Execution,
}

impl ExecutionEvent {
    pub fn created(record: Execution) -> Self {
        Self {
            action: EventAction::Create,
            record,
        }
    }

    pub fn updated(record: Execution) -> Self {
        Self {
            action: EventAction::Update,
            record,
        }
    }

    /// Decode a raw realtime payload (`{"action": ..., "record": {...}}`).
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
