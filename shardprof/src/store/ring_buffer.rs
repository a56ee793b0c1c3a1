//! Fixed-capacity ring buffer that overwrites its oldest entry when full.

#[derive(Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<Option<T>>,
    /// Slot the next push writes to.
    write_index: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// # Panics
    /// Panics if `capacity` is zero; configuration validation rejects that first.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            buffer: std::iter::repeat_with(|| None).take(capacity).collect(),
            write_index: 0,
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// O(1). Returns the evicted entry when the buffer was already full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.buffer[self.write_index].replace(item);
        self.write_index = (self.write_index + 1) % self.capacity();
        if evicted.is_none() {
            self.len += 1;
        }
        evicted
    }

    /// Oldest retained entry.
    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        self.iter().next()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let start = (self.write_index + self.capacity() - self.len) % self.capacity();
        (0..self.len).filter_map(move |offset| {
            self.buffer[(start + offset) % self.capacity()].as_ref()
        })
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.write_index = 0;
        self.len = 0;
    }
}
