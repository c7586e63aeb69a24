//! Control socket protocol
//!
//! One JSON object per line in each direction.

use serde::{Deserialize, Serialize};

/// Commands accepted by the launcher daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Launch the SPX server
    Start,

    /// Stop the SPX server
    Stop,

    /// Control port the readiness probes target
    GetPort,

    /// Full supervisor status (without log lines)
    Status,

    /// Captured server log lines, oldest first
    Logs {
        /// Only return the last `tail` lines
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tail: Option<usize>,
    },

    /// Open the server's log directory in the platform file browser
    OpenLogsFolder,

    /// Stop supervising and exit the daemon
    Shutdown,
}

/// Response from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded
    Ok { data: serde_json::Value },

    /// Command failed
    Error { message: String },
}

impl Response {
    pub fn ok(data: impl Serialize) -> Self {
        Self::Ok {
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Ok { data } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Ok { .. } => None,
            Self::Error { message } => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_commands_use_snake_case_tags() {
        let json = serde_json::to_string(&Command::OpenLogsFolder).unwrap();
        assert_eq!(json, r#"{"command":"open_logs_folder"}"#);

        let parsed: Command = serde_json::from_str(r#"{"command":"get_port"}"#).unwrap();
        assert_eq!(parsed, Command::GetPort);
    }

    #[test]
    fn logs_tail_is_optional() {
        let parsed: Command = serde_json::from_str(r#"{"command":"logs"}"#).unwrap();
        assert_eq!(parsed, Command::Logs { tail: None });

        let parsed: Command = serde_json::from_str(r#"{"command":"logs","tail":20}"#).unwrap();
        assert_eq!(parsed, Command::Logs { tail: Some(20) });

        let json = serde_json::to_string(&Command::Logs { tail: None }).unwrap();
        assert!(!json.contains("tail"));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"command":"deploy"}"#).is_err());
    }

    #[test]
    fn response_ok_carries_string_data() {
        let response = Response::ok("Server stopped");
        assert!(response.is_ok());
        assert_eq!(
            response.data().and_then(|d| d.as_str()),
            Some("Server stopped")
        );
        assert_eq!(response.error_message(), None);
    }

    #[test]
    fn response_error_wire_format() {
        let response = Response::error("Error: spawn failed");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"status":"error","message":"Error: spawn failed"}"#);
        assert!(!response.is_ok());
        assert_eq!(response.error_message(), Some("Error: spawn failed"));
    }
}
