//! Command mailbox
//!
//! Single-producer/single-consumer queue from the controller context into the
//! render context. Posting never blocks; draining never blocks and hands over
//! every pending message in arrival order.
//!
//! The wire shapes of the messages (`{cmd: "play_sequence", data: [..]}` and
//! friends) are decoded on the controller side. Anything that does not decode
//! is dropped there and never reaches the render context.

use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::mpsc::{self, TryRecvError};
use tracing::debug;

/// Create a connected sender/receiver pair
pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (
        MailboxSender { tx },
        MailboxReceiver {
            rx,
            disconnected: false,
        },
    )
}

/// Producer half of a mailbox
#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> MailboxSender<T> {
    /// Enqueue a message without blocking
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` if the receiving side has been dropped.
    pub fn post(&self, message: T) -> Result<()> {
        self.tx.send(message).map_err(|_| BridgeError::Disconnected)
    }
}

/// Consumer half of a mailbox
#[derive(Debug)]
pub struct MailboxReceiver<T> {
    rx: mpsc::Receiver<T>,
    disconnected: bool,
}

impl<T> MailboxReceiver<T> {
    /// Hand every pending message to `apply`, oldest first
    ///
    /// Returns the number of messages delivered. Never waits for new ones.
    pub fn drain(&mut self, mut apply: impl FnMut(T)) -> usize {
        let mut delivered = 0;
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    apply(message);
                    delivered += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        debug!("mailbox sender dropped");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
        delivered
    }

    /// Take the oldest pending message without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.disconnected = true;
                None
            }
        }
    }

    /// Whether the sending side is gone and the queue is exhausted
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

/// Command for a generator session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bind a register stream and start the sequence channel
    PlaySequence(Vec<u8>),
    /// Bind a sound effect and start the patch-table channel
    PlayPatchTable(Vec<u8>),
    /// Write one chip register
    WriteRegister {
        /// Register index
        index: u16,
        /// Register value
        value: u8,
    },
    /// Halt the sequence channel
    StopSequence,
}

/// Wire representation of [`Command`]
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum WireCommand {
    #[serde(alias = "play_imf")]
    PlaySequence { data: Vec<u8> },
    #[serde(alias = "play_adl")]
    PlayPatchTable { data: Vec<u8> },
    #[serde(alias = "write_reg")]
    WriteRegister { reg: u16, value: u8 },
    #[serde(alias = "stop_imf")]
    StopSequence,
}

impl From<WireCommand> for Command {
    fn from(wire: WireCommand) -> Self {
        match wire {
            WireCommand::PlaySequence { data } => Command::PlaySequence(data),
            WireCommand::PlayPatchTable { data } => Command::PlayPatchTable(data),
            WireCommand::WriteRegister { reg, value } => Command::WriteRegister { index: reg, value },
            WireCommand::StopSequence => Command::StopSequence,
        }
    }
}

impl From<Command> for WireCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::PlaySequence(data) => WireCommand::PlaySequence { data },
            Command::PlayPatchTable(data) => WireCommand::PlayPatchTable { data },
            Command::WriteRegister { index, value } => WireCommand::WriteRegister { reg: index, value },
            Command::StopSequence => WireCommand::StopSequence,
        }
    }
}

impl Command {
    /// Decode a wire message
    ///
    /// Returns `None` for unknown tags, missing fields and out-of-range values.
    pub fn from_message(message: &Value) -> Option<Self> {
        match WireCommand::deserialize(message) {
            Ok(wire) => Some(wire.into()),
            Err(err) => {
                debug!("ignoring malformed command: {err}");
                None
            }
        }
    }

    /// Decode a wire message from JSON text
    pub fn from_json_str(json: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => Self::from_message(&value),
            Err(err) => {
                debug!("ignoring unparsable command: {err}");
                None
            }
        }
    }

    /// Encode as a wire message
    pub fn to_message(&self) -> Value {
        // Serializing a plain enum of integers and byte vectors cannot fail.
        serde_json::to_value(WireCommand::from(self.clone())).unwrap_or(Value::Null)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::PlaySequence(_) => "play_sequence",
            Command::PlayPatchTable(_) => "play_patch_table",
            Command::WriteRegister { .. } => "write_register",
            Command::StopSequence => "stop_sequence",
        }
    }
}

/// Message for a ring-buffer session
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Precomputed interleaved stereo samples to append to the queue
    Samples(Vec<f32>),
    /// Empty the queue
    Clear,
}

impl StreamMessage {
    /// Decode a wire message: an array of numbers or the literal `"clear"`
    pub fn from_message(message: &Value) -> Option<Self> {
        match message {
            Value::String(s) if s.eq_ignore_ascii_case("clear") => Some(StreamMessage::Clear),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_f64().map(|x| x as f32))
                .collect::<Option<Vec<f32>>>()
                .map(StreamMessage::Samples)
                .or_else(|| {
                    debug!("ignoring sample payload with non-numeric entries");
                    None
                }),
            _ => {
                debug!("ignoring unknown stream message");
                None
            }
        }
    }
}
