use crate::virtual_machine::config::DEFAULT_MAX_ARRAY_LENGTH;
use crate::virtual_machine::frame::Frame;
use crate::virtual_machine::value::Value;
use crate::virtual_machine::Fault;

/// A call stack, innermost frame last.
#[derive(Debug)]
pub struct Thread {
    frames: Vec<Frame>,
    max_depth: usize,
    max_array_length: usize,
    /// What the outermost frame returned, once it has.
    completion: Option<Value>,
}

impl Thread {
    pub fn new(max_depth: usize) -> Self {
        Thread {
            frames: Vec::new(),
            max_depth,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
            completion: None,
        }
    }

    pub fn with_max_array_length(mut self, length: usize) -> Self {
        self.max_array_length = length;
        self
    }

    pub fn push_frame(&mut self, frame: Frame) -> Result<(), Fault> {
        if self.frames.len() >= self.max_depth {
            return Err(Fault::CallDepthExceeded(self.max_depth));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// The frame below the current one: after a `pop_frame` during a return, this is the frame
    /// the returned value is headed to.
    pub fn caller_frame(&self) -> Option<&Frame> {
        let depth = self.frames.len();
        if depth < 2 {
            None
        } else {
            self.frames.get(depth - 2)
        }
    }

    pub fn caller_frame_mut(&mut self) -> Option<&mut Frame> {
        let depth = self.frames.len();
        if depth < 2 {
            None
        } else {
            self.frames.get_mut(depth - 2)
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn max_array_length(&self) -> usize {
        self.max_array_length
    }

    pub(crate) fn complete(&mut self, value: Option<Value>) {
        self.completion = value;
    }

    pub fn take_completion(&mut self) -> Option<Value> {
        self.completion.take()
    }

    /// Frames from innermost to outermost.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }
}
