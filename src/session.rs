//! Session wiring
//!
//! A session is a pair: a controller handle that stays on the control side
//! and a [`RenderProcessor`](crate::render::RenderProcessor) that is handed to
//! a host and moves to the audio thread. The two halves share nothing but
//! the mailboxes between them.

use crate::config::SessionConfig;
use crate::engine::{SequencerEngine, SquareChip, ToneEngine};
use crate::mailbox::{mailbox, Command, MailboxReceiver, MailboxSender, StreamMessage};
use crate::notifier::Notification;
use crate::render::{GeneratorSession, RingBufferSession};
use crate::sample_queue::SampleQueue;
use crate::Result;
use serde_json::Value;
use tracing::debug;

type PatchTableEndHandler = Box<dyn FnMut() + Send>;

/// Control-side handle of a generator session
pub struct Controller {
    commands: MailboxSender<Command>,
    notifications: MailboxReceiver<Notification>,
    on_patch_table_end: Option<PatchTableEndHandler>,
}

impl Controller {
    /// Post a command to the render context
    ///
    /// # Errors
    ///
    /// Returns `Disconnected` once the render session has been dropped.
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands.post(command)
    }

    /// Bind a register stream and start it
    pub fn play_sequence(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Command::PlaySequence(data.into()))
    }

    /// Bind a sound effect and start it
    pub fn play_patch_table(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Command::PlayPatchTable(data.into()))
    }

    /// Write one chip register
    pub fn write_register(&self, index: u16, value: u8) -> Result<()> {
        self.send(Command::WriteRegister { index, value })
    }

    /// Halt the sequence channel
    pub fn stop_sequence(&self) -> Result<()> {
        self.send(Command::StopSequence)
    }

    /// Decode a wire message and post it
    ///
    /// Returns `Ok(false)` when the message was malformed and ignored.
    pub fn post_message(&self, message: &Value) -> Result<bool> {
        match Command::from_message(message) {
            Some(command) => self.send(command).map(|()| true),
            None => Ok(false),
        }
    }

    /// Register the handler run when a sound effect finishes
    ///
    /// Replaces any previous handler. Handlers run inside [`Controller::poll`].
    pub fn set_on_patch_table_end(&mut self, handler: impl FnMut() + Send + 'static) {
        self.on_patch_table_end = Some(Box::new(handler));
    }

    /// Remove the completion handler
    pub fn clear_on_patch_table_end(&mut self) {
        self.on_patch_table_end = None;
    }

    /// Deliver pending notifications to the registered handler
    ///
    /// Returns the number of notifications received.
    pub fn poll(&mut self) -> usize {
        let handler = &mut self.on_patch_table_end;
        self.notifications.drain(|notification| match notification {
            Notification::PatchTableFinished => {
                if let Some(callback) = handler.as_mut() {
                    callback();
                }
            }
        })
    }

    /// Take the next pending notification, if any, bypassing the handler
    pub fn try_recv_notification(&mut self) -> Option<Notification> {
        self.notifications.try_recv()
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("commands", &self.commands)
            .field("notifications", &self.notifications)
            .field("on_patch_table_end", &self.on_patch_table_end.is_some())
            .finish()
    }
}

/// Control-side handle of a ring-buffer session
#[derive(Debug)]
pub struct StreamController {
    messages: MailboxSender<StreamMessage>,
}

impl StreamController {
    /// Queue a chunk of interleaved stereo samples
    pub fn push_samples(&self, samples: impl Into<Vec<f32>>) -> Result<()> {
        self.messages.post(StreamMessage::Samples(samples.into()))
    }

    /// Drop every queued chunk
    pub fn clear(&self) -> Result<()> {
        self.messages.post(StreamMessage::Clear)
    }

    /// Decode a wire message and post it
    ///
    /// Returns `Ok(false)` when the message was malformed and ignored.
    pub fn post_message(&self, message: &Value) -> Result<bool> {
        match StreamMessage::from_message(message) {
            Some(msg) => self.messages.post(msg).map(|()| true),
            None => Ok(false),
        }
    }
}

/// Create a session around the built-in sequencer engine
pub fn generator_session(
    config: &SessionConfig,
) -> Result<(Controller, GeneratorSession<SequencerEngine<SquareChip>>)> {
    config.validate()?;
    generator_session_with_engine(SequencerEngine::create(config), config)
}

/// Create a session around a caller-supplied engine
pub fn generator_session_with_engine<E: ToneEngine>(
    engine: E,
    config: &SessionConfig,
) -> Result<(Controller, GeneratorSession<E>)> {
    config.validate()?;
    let (command_tx, command_rx) = mailbox();
    let (note_tx, note_rx) = mailbox();
    debug!(
        mixer_rate = config.mixer_rate,
        sequence_clock = config.effective_sequence_clock(),
        patch_clock = config.effective_patch_clock(),
        "generator session created"
    );

    let controller = Controller {
        commands: command_tx,
        notifications: note_rx,
        on_patch_table_end: None,
    };
    Ok((controller, GeneratorSession::new(engine, command_rx, note_tx)))
}

/// Create a legacy session playing back pushed sample chunks
pub fn ring_buffer_session(config: &SessionConfig) -> Result<(StreamController, RingBufferSession)> {
    config.validate()?;
    let (tx, rx) = mailbox();
    let queue = SampleQueue::with_capacity(config.queue_capacity);
    debug!(capacity = config.queue_capacity, "ring buffer session created");
    Ok((
        StreamController { messages: tx },
        RingBufferSession::new(queue, rx),
    ))
}
