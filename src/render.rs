//! Render callback
//!
//! A host calls [`RenderProcessor::process`] once per render quantum with a
//! planar stereo output. Processors never block and always leave valid
//! samples in both channels, whatever state the controller put them in.
//!
//! Two processors exist:
//! - [`GeneratorSession`] pulls one block per quantum from a [`ToneEngine`]
//! - [`RingBufferSession`] plays back precomputed chunks (legacy mode)

use crate::blob::{BlobManager, BlobSlot};
use crate::constants::RENDER_QUANTUM_FRAMES;
use crate::engine::{EngineStatus, SampleBlock, ToneEngine};
use crate::mailbox::{Command, MailboxReceiver, MailboxSender, StreamMessage};
use crate::notifier::{CompletionNotifier, Notification};
use crate::sample_queue::SampleQueue;
use tracing::{debug, trace, warn};

/// Periodic render context driven by a host
pub trait RenderProcessor: Send {
    /// Message type the processor consumes
    type Message;

    /// Apply one message immediately, outside the mailbox
    fn accept(&mut self, message: Self::Message);

    /// Render one quantum into planar outputs
    ///
    /// Writes at most [`RENDER_QUANTUM_FRAMES`] frames per channel and zeroes
    /// anything beyond that.
    fn process(&mut self, left: &mut [f32], right: &mut [f32]);
}

/// Split an interleaved block into planar channels
///
/// Even samples go left, odd samples go right.
pub fn deinterleave(block: &SampleBlock, left: &mut [f32], right: &mut [f32]) {
    let frames = RENDER_QUANTUM_FRAMES.min(left.len());
    for (i, out) in left[..frames].iter_mut().enumerate() {
        *out = block[2 * i];
    }
    left[frames..].fill(0.0);

    let frames = RENDER_QUANTUM_FRAMES.min(right.len());
    for (i, out) in right[..frames].iter_mut().enumerate() {
        *out = block[2 * i + 1];
    }
    right[frames..].fill(0.0);
}

/// Render session backed by a tone generator
pub struct GeneratorSession<E: ToneEngine> {
    engine: E,
    blobs: BlobManager,
    commands: MailboxReceiver<Command>,
    notifier: CompletionNotifier,
    notifications: MailboxSender<Notification>,
    quanta: u64,
}

fn apply_command<E: ToneEngine>(engine: &mut E, blobs: &mut BlobManager, command: Command) {
    trace!(command = command.name(), "applying command");
    match command {
        Command::PlaySequence(bytes) => {
            match blobs.bind(&mut *engine, BlobSlot::Sequence, &bytes) {
                Ok(record) => engine.play_sequence(record.ptr, record.len),
                Err(err) => warn!("dropping play_sequence: {err}"),
            }
        }
        Command::PlayPatchTable(bytes) => {
            match blobs.bind(&mut *engine, BlobSlot::PatchTable, &bytes) {
                Ok(record) => engine.play_patch_table(record.ptr, record.len),
                Err(err) => warn!("dropping play_patch_table: {err}"),
            }
        }
        Command::WriteRegister { index, value } => engine.write_register(index, value),
        Command::StopSequence => engine.stop_sequence(),
    }
}

impl<E: ToneEngine> GeneratorSession<E> {
    /// Wire a session around an engine
    pub fn new(
        engine: E,
        commands: MailboxReceiver<Command>,
        notifications: MailboxSender<Notification>,
    ) -> Self {
        GeneratorSession {
            engine,
            blobs: BlobManager::new(),
            commands,
            notifier: CompletionNotifier::new(),
            notifications,
            quanta: 0,
        }
    }

    /// The engine driven by this session
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Blob bookkeeping of this session
    pub fn blobs(&self) -> &BlobManager {
        &self.blobs
    }

    /// Channel states as of the last quantum
    pub fn status(&self) -> EngineStatus {
        self.engine.status()
    }

    /// Quanta rendered so far
    pub fn quanta(&self) -> u64 {
        self.quanta
    }
}

impl<E: ToneEngine> RenderProcessor for GeneratorSession<E> {
    type Message = Command;

    fn accept(&mut self, message: Command) {
        apply_command(&mut self.engine, &mut self.blobs, message);
    }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let GeneratorSession {
            engine,
            blobs,
            commands,
            ..
        } = self;
        commands.drain(|command| apply_command(engine, blobs, command));

        let block = self.engine.generate_block();
        deinterleave(block, left, right);
        self.quanta += 1;

        if self.notifier.observe(self.engine.is_patch_table_playing()) {
            debug!(quantum = self.quanta, "patch table finished");
            if self
                .notifications
                .post(Notification::PatchTableFinished)
                .is_err()
            {
                trace!("controller gone, notification dropped");
            }
        }
    }
}

impl<E: ToneEngine> Drop for GeneratorSession<E> {
    fn drop(&mut self) {
        self.blobs.release_all(&mut self.engine);
        debug!(quanta = self.quanta, "generator session closed");
    }
}

impl<E: ToneEngine> std::fmt::Debug for GeneratorSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorSession")
            .field("blobs", &self.blobs)
            .field("notifier", &self.notifier)
            .field("quanta", &self.quanta)
            .finish_non_exhaustive()
    }
}

/// Render session playing back precomputed sample chunks
#[derive(Debug)]
pub struct RingBufferSession {
    queue: SampleQueue,
    messages: MailboxReceiver<StreamMessage>,
}

impl RingBufferSession {
    /// Wire a session around an empty queue
    pub fn new(queue: SampleQueue, messages: MailboxReceiver<StreamMessage>) -> Self {
        RingBufferSession { queue, messages }
    }

    /// The queue being played
    pub fn queue(&self) -> &SampleQueue {
        &self.queue
    }
}

fn apply_stream_message(queue: &mut SampleQueue, message: StreamMessage) {
    match message {
        StreamMessage::Samples(chunk) => queue.enqueue(chunk),
        StreamMessage::Clear => queue.clear(),
    }
}

impl RenderProcessor for RingBufferSession {
    type Message = StreamMessage;

    fn accept(&mut self, message: StreamMessage) {
        apply_stream_message(&mut self.queue, message);
    }

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let queue = &mut self.queue;
        self.messages
            .drain(|message| apply_stream_message(queue, message));

        // Frames are consumed in left/right pairs, so both channels advance together
        let frames = RENDER_QUANTUM_FRAMES.min(left.len()).min(right.len());
        self.queue.render(&mut left[..frames], &mut right[..frames]);
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);
    }
}
