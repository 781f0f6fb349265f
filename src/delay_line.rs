use std::collections::VecDeque;

/// Fixed-depth FIFO that holds `depth` frames back before releasing any.
///
/// The first `depth` pushes release nothing (the pre-roll). After that every
/// push makes exactly one frame available, so the queue settles at `depth`
/// frames and output latency is `depth` frame durations.
#[derive(Debug)]
pub struct DelayLine<T> {
    depth: usize,
    frames: VecDeque<T>,
}

impl<T> DelayLine<T> {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            frames: VecDeque::with_capacity(depth + 1),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether the pre-roll has been filled.
    pub fn is_warm(&self) -> bool {
        self.frames.len() >= self.depth
    }

    pub fn push(&mut self, frame: T) {
        self.frames.push_back(frame);
    }

    /// Oldest frame, once more than `depth` frames are queued.
    pub fn try_pop(&mut self) -> Option<T> {
        if self.frames.len() > self.depth {
            self.frames.pop_front()
        } else {
            None
        }
    }
}
