//! Server-issued commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Command types understood by the display.
///
/// The vocabulary is open: any string the server sends that is not one of the
/// known types is kept verbatim in [`CommandType::Other`] so it can still be
/// routed to a fallback handler and acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommandType {
    /// Render a scene description
    DisplayScene,
    /// Blank the display
    ClearContent,
    /// Reload the presentation layer
    Reload,
    /// Speak a text through the TTS collaborator
    Speak,
    /// Any command type not listed above
    Other(String),
}

impl CommandType {
    /// Wire name of this command type
    pub fn as_str(&self) -> &str {
        match self {
            CommandType::DisplayScene => "display_scene",
            CommandType::ClearContent => "clear_content",
            CommandType::Reload => "reload",
            CommandType::Speak => "speak",
            CommandType::Other(name) => name,
        }
    }

    /// Whether this is one of the built-in types
    pub fn is_known(&self) -> bool {
        !matches!(self, CommandType::Other(_))
    }
}

impl From<&str> for CommandType {
    fn from(value: &str) -> Self {
        match value {
            "display_scene" => CommandType::DisplayScene,
            "clear_content" => CommandType::ClearContent,
            "reload" => CommandType::Reload,
            "speak" => CommandType::Speak,
            other => CommandType::Other(other.to_string()),
        }
    }
}

impl From<String> for CommandType {
    fn from(value: String) -> Self {
        match CommandType::from(value.as_str()) {
            CommandType::Other(_) => CommandType::Other(value),
            known => known,
        }
    }
}

impl From<CommandType> for String {
    fn from(value: CommandType) -> Self {
        match value {
            CommandType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command received from the control server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Opaque token echoed back in the acknowledgment
    pub command_id: String,
    /// What the server wants done
    pub command_type: CommandType,
    /// Opaque payload handed to the handler unexamined
    #[serde(default)]
    pub parameters: Value,
}

impl Command {
    /// Create a new command
    pub fn new(command_id: impl Into<String>, command_type: CommandType, parameters: Value) -> Self {
        Self {
            command_id: command_id.into(),
            command_type,
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_types_map_to_variants() {
        assert_eq!(CommandType::from("display_scene"), CommandType::DisplayScene);
        assert_eq!(CommandType::from("clear_content"), CommandType::ClearContent);
        assert_eq!(CommandType::from("reload"), CommandType::Reload);
        assert_eq!(CommandType::from("speak"), CommandType::Speak);
        assert!(CommandType::Speak.is_known());
    }

    #[test]
    fn test_unknown_type_keeps_name() {
        let typ = CommandType::from("set_brightness".to_string());
        assert_eq!(typ, CommandType::Other("set_brightness".to_string()));
        assert!(!typ.is_known());
        assert_eq!(typ.to_string(), "set_brightness");
        assert_eq!(String::from(typ), "set_brightness");
    }

    #[test]
    fn test_command_parameters_default_to_null() {
        let cmd: Command = serde_json::from_value(json!({
            "command_id": "c9",
            "command_type": "reload",
        }))
        .unwrap();

        assert_eq!(cmd.command_id, "c9");
        assert_eq!(cmd.command_type, CommandType::Reload);
        assert!(cmd.parameters.is_null());
    }
}
