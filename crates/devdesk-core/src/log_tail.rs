use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

/// Longest line kept in one piece. Longer output is split at the next
/// character boundary.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Bounded, ordered buffer of the most recent output lines of a service.
///
/// Writers never wait for readers: once full, the oldest line is evicted.
#[derive(Debug)]
pub struct LogTail {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl LogTail {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of the buffered lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Reassembles lines from arbitrary output chunks.
#[derive(Debug, Default)]
pub struct LineAssembler {
    partial: Vec<u8>,
}

impl LineAssembler {
    /// Feed a chunk and return every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut complete = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                complete.push(self.take());
            } else {
                if self.at_split_point(byte) {
                    complete.push(self.take());
                }
                self.partial.push(byte);
            }
        }
        complete
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        (!self.partial.is_empty()).then(|| self.take())
    }

    /// The buffer is full and `next` does not continue a UTF-8 sequence.
    fn at_split_point(&self, next: u8) -> bool {
        let len = self.partial.len();
        len >= MAX_LINE_LEN + 3 || (len >= MAX_LINE_LEN && next & 0xC0 != 0x80)
    }

    fn take(&mut self) -> String {
        let bytes = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&bytes);
        line.strip_suffix('\r').unwrap_or(&*line).to_owned()
    }
}
