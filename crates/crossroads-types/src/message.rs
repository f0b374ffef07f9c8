//! Classification of client-originated frames.
//!
//! Dashboards send JSON text frames. The only kind the bridge acts on is
//! a control command: any JSON object carrying a [`CONTROL_FIELD`] key.
//! The value of that key does not matter for routing; the device decides
//! what it means. Everything else is [`ClientMessage::Unrecognized`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::codec::encode_line;
use crate::intersection::ManualDirective;

/// The key whose presence marks a client frame as a control command.
pub const CONTROL_FIELD: &str = "manual_control";

/// A manual-override command bound for the device.
///
/// Holds the object exactly as received. Key order is preserved so the
/// line written to the device matches what the client sent, modulo
/// whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ControlCommand(Map<String, Value>);

impl ControlCommand {
    /// Wrap an object if it carries [`CONTROL_FIELD`].
    pub fn from_object(object: Map<String, Value>) -> Result<Self, Map<String, Value>> {
        if object.contains_key(CONTROL_FIELD) {
            Ok(Self(object))
        } else {
            Err(object)
        }
    }

    /// The raw command object.
    pub const fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Interpret the command the way the signal controller does.
    pub fn directive(&self) -> ManualDirective {
        ManualDirective::interpret(&self.0)
    }

    /// The newline-terminated line written to the device socket.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the object cannot be encoded.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        encode_line(&self.0)
    }
}

/// A parsed client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// A manual-override command to forward to the device.
    Control(ControlCommand),
    /// Valid JSON that is not a control command.
    Unrecognized(Value),
}

impl ClientMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `text` is not valid JSON.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self::from_value)
    }

    /// Classify an already-parsed value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(object) => match ControlCommand::from_object(object) {
                Ok(command) => Self::Control(command),
                Err(object) => Self::Unrecognized(Value::Object(object)),
            },
            other => Self::Unrecognized(other),
        }
    }
}
