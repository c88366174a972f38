use std::collections::VecDeque;

/// Bounded FIFO of mono samples that discards the oldest on overflow.
///
/// Serves as the capture block assembler (`read` drains whole blocks) and
/// as the analysis window behind a measurement tap (`latest` peeks).
#[derive(Debug, Clone)]
pub struct SampleRing {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `input`, keeping only the newest `capacity` samples overall.
    pub fn write(&mut self, input: &[f32]) {
        let input = &input[input.len().saturating_sub(self.capacity)..];
        let excess = (self.samples.len() + input.len()).saturating_sub(self.capacity);
        self.samples.drain(..excess);
        self.samples.extend(input.iter().copied());
    }

    /// Remove and return up to `count` of the oldest samples.
    pub fn read(&mut self, count: usize) -> Vec<f32> {
        let count = count.min(self.samples.len());
        self.samples.drain(..count).collect()
    }

    /// The newest `count` samples, oldest first. Nothing is consumed.
    pub fn latest(&self, count: usize) -> Vec<f32> {
        let skip = self.samples.len().saturating_sub(count);
        self.samples.iter().skip(skip).copied().collect()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
