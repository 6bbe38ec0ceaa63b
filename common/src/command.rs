//! Steering commands and the relay that forwards them to the actuator.
//!
//! Two payload shapes are accepted on the wire:
//!
//! ```text
//! {"angle": 1.5, "intensity": 0.5, "x": 0, "y": 0}   // steering
//! {"command": "left"}                                // direction
//! ```
//!
//! Both decode into the single [`Command`] type, so sinks never care which
//! shape the client used.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CommandVariant;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Steering(Steering),
    Direction { command: Direction },
}

/// Continuous steering parameters. Missing fields decode as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Steering {
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub intensity: f64,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
        Direction::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| CommandError::InvalidDirection(s.to_string()))
    }
}

/// Reply body for an accepted command: the command's fields plus `"status":"ok"`.
#[derive(Debug, Serialize)]
pub struct CommandAck {
    pub status: &'static str,
    #[serde(flatten)]
    pub command: Command,
}

impl CommandAck {
    pub fn ok(command: Command) -> Self {
        Self {
            status: "ok",
            command,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid JSON: {0}")]
    Malformed(String),
    #[error("invalid command '{0}': expected one of forward, backward, left, right, stop")]
    InvalidDirection(String),
    #[error("{shape} commands are not accepted by this server")]
    UnsupportedShape { shape: &'static str },
}

/// Where validated commands end up. Fire-and-forget: no acknowledgement is awaited.
pub trait ActuatorSink: Send + Sync {
    fn push(&self, command: &Command);

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Stand-in for the hardware link: records each command in the log.
#[derive(Debug, Default)]
pub struct LogActuator;

impl ActuatorSink for LogActuator {
    fn push(&self, command: &Command) {
        match command {
            Command::Steering(s) => info!(
                angle = format!("{:.2}", s.angle),
                intensity = format!("{:.2}", s.intensity),
                x = format!("{:.2}", s.x),
                y = format!("{:.2}", s.y),
                "pushing steering command to hardware"
            ),
            Command::Direction { command } => {
                info!(direction = %command, "pushing direction command to hardware")
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Decodes, validates and forwards commands to an [`ActuatorSink`].
#[derive(Clone)]
pub struct CommandRelay {
    sink: Arc<dyn ActuatorSink>,
    variant: CommandVariant,
}

impl CommandRelay {
    pub fn new(sink: Arc<dyn ActuatorSink>, variant: CommandVariant) -> Self {
        Self { sink, variant }
    }

    /// Decode `payload`, forward it to the sink and return the normalized command.
    pub fn relay(&self, payload: &[u8]) -> Result<Command, CommandError> {
        let command = self.decode(payload)?;
        self.sink.push(&command);
        Ok(command)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Command, CommandError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| CommandError::Malformed(e.to_string()))?;
        let serde_json::Value::Object(mut fields) = value else {
            return Err(CommandError::Malformed("expected a JSON object".into()));
        };

        match fields.remove("command") {
            Some(token) => {
                if self.variant == CommandVariant::Steering {
                    return Err(CommandError::UnsupportedShape { shape: "direction" });
                }
                let serde_json::Value::String(token) = token else {
                    return Err(CommandError::Malformed("`command` must be a string".into()));
                };
                Ok(Command::Direction {
                    command: token.parse()?,
                })
            }
            None => {
                if self.variant == CommandVariant::Direction {
                    return Err(CommandError::UnsupportedShape { shape: "steering" });
                }
                let steering = serde_json::from_value(serde_json::Value::Object(fields))
                    .map_err(|e| CommandError::Malformed(e.to_string()))?;
                Ok(Command::Steering(steering))
            }
        }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }
}
