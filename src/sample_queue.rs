//! Legacy sample queue
//!
//! Plays back precomputed interleaved stereo chunks pushed by the controller.
//! Chunks are consumed strictly in arrival order; a single quantum may span
//! the tail of one chunk and the head of the next. When the queue runs dry the
//! rest of the quantum is silence.

use std::collections::VecDeque;
use tracing::trace;

/// FIFO of interleaved stereo chunks with a read cursor into the head chunk
#[derive(Debug, Default)]
pub struct SampleQueue {
    chunks: VecDeque<Vec<f32>>,
    /// Sample index inside the head chunk
    cursor: usize,
}

impl SampleQueue {
    /// Create a queue with room for `capacity` chunks before it reallocates
    pub fn with_capacity(capacity: usize) -> Self {
        SampleQueue {
            chunks: VecDeque::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Append a chunk (`[l0, r0, l1, r1, ..]`); empty chunks are discarded
    pub fn enqueue(&mut self, chunk: Vec<f32>) {
        if chunk.is_empty() {
            return;
        }
        self.chunks.push_back(chunk);
    }

    /// Drop every pending chunk and reset the cursor
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.cursor = 0;
    }

    /// Number of pending chunks, including a partially consumed head
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no samples are pending
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Interleaved samples still pending
    pub fn pending_samples(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum::<usize>() - self.cursor
    }

    /// Fill one quantum
    ///
    /// Samples alternate left then right. Returns the number of frames that
    /// carried queued audio; everything after that is zeroed.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let frames = left.len().min(right.len());
        let mut filled = 0;
        // Which channel the next sample belongs to
        let mut to_right = false;

        while filled < frames {
            let Some(head) = self.chunks.front() else {
                break;
            };
            let sample = head[self.cursor];
            self.cursor += 1;
            if self.cursor >= head.len() {
                self.chunks.pop_front();
                self.cursor = 0;
            }

            if to_right {
                right[filled] = sample;
                filled += 1;
            } else {
                left[filled] = sample;
            }
            to_right = !to_right;
        }

        if filled < frames {
            trace!(filled, frames, "sample queue underrun");
            // A dangling left sample from an odd-length tail is dropped
            left[filled..].fill(0.0);
            right[filled..].fill(0.0);
        }
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);
        filled
    }
}
