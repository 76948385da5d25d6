//! Commands callers can issue and the collector endpoints they map to

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CommandError;

/// Payload attached to a command
pub type CommandData = Map<String, Value>;

/// Collector endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Clicks,
    Signup,
    Conversion,
    PageView,
    CustomEvent,
}

impl Endpoint {
    /// Path segment under the collector base URL
    pub fn path(self) -> &'static str {
        match self {
            Self::Clicks => "clicks",
            Self::Signup => "signup",
            Self::Conversion => "conversion",
            Self::PageView => "page_view",
            Self::CustomEvent => "custom_event",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// The closed set of commands the agent understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Click,
    Signup,
    Conversion,
    PageView,
    Custom,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Click,
        Command::Signup,
        Command::Conversion,
        Command::PageView,
        Command::Custom,
    ];

    /// External name of the command
    pub fn name(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Signup => "signup",
            Self::Conversion => "conversion",
            Self::PageView => "page_view",
            Self::Custom => "custom",
        }
    }

    pub fn endpoint(self) -> Endpoint {
        match self {
            Self::Click => Endpoint::Clicks,
            Self::Signup => Endpoint::Signup,
            Self::Conversion => Endpoint::Conversion,
            Self::PageView => Endpoint::PageView,
            Self::Custom => Endpoint::CustomEvent,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| CommandError::Unknown(s.to_string()))
    }
}

/// A caller invocation captured before the agent was ready
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    /// Name as the caller spelled it; validated only when processed
    pub command: String,
    pub data: CommandData,
}

impl QueuedCommand {
    pub fn new(command: impl Into<String>, data: CommandData) -> Self {
        Self {
            command: command.into(),
            data,
        }
    }
}

/// Build [`CommandData`] from a JSON object literal; non-objects yield empty data
pub fn data_from(value: Value) -> CommandData {
    match value {
        Value::Object(map) => map,
        _ => CommandData::new(),
    }
}

/// JavaScript-style truthiness, used for field fallbacks and response flags
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
