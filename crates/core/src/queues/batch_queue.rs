use std::sync::Mutex;

/// Insertion-ordered buffer that is drained whole. Only the owner pushes.
pub struct BatchQueue<T> {
    buf: Mutex<Vec<T>>,
}

impl<T> Default for BatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BatchQueue<T> {
    pub fn new() -> Self {
        Self {
            buf: Mutex::new(Vec::new()),
        }
    }

    /// Appends and returns the length afterwards.
    pub fn push(&self, value: T) -> usize {
        let mut buf = self.buf.lock().expect("BatchQueue poisoned");
        buf.push(value);
        buf.len()
    }

    /// Takes everything queued so far, leaving a fresh empty buffer behind.
    pub fn detach(&self) -> Vec<T> {
        std::mem::take(&mut *self.buf.lock().expect("BatchQueue poisoned"))
    }

    pub fn len(&self) -> usize {
        self.buf.lock().expect("BatchQueue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
