//! Uniform replay buffer.
//!
//! Fixed-capacity ring storage of transitions:
//! - **Ring buffer** semantics (overwrite oldest when full)
//! - **Uniform random sampling** with replacement
//! - **Explicit RNG**: the caller passes the generator, so runs are
//!   reproducible from the configured seed
//!
//! The buffer is owned and mutated by a single training loop.

use rand::Rng;

use crate::error::{Result, SafetyRlError};

/// Ring buffer with O(1) insert and random access.
#[derive(Debug, Clone)]
pub struct ReplayBuffer<T> {
    /// Storage vector.
    buffer: Vec<T>,
    /// Capacity of the buffer.
    capacity: usize,
    /// Next position to write (circular).
    write_pos: usize,
}

impl<T: Clone> ReplayBuffer<T> {
    /// Create a new buffer with given capacity.
    ///
    /// Returns [`SafetyRlError::InvalidConfig`] for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SafetyRlError::InvalidConfig(
                "replay buffer capacity must be > 0".into(),
            ));
        }
        Ok(Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        })
    }

    /// Push an item, overwriting the oldest one if full.
    pub fn push(&mut self, item: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(item);
        } else {
            self.buffer[self.write_pos] = item;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Sample `batch_size` items uniformly at random with replacement.
    ///
    /// Returns `None` if the buffer holds fewer than `batch_size` items.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Option<Vec<T>> {
        if batch_size == 0 || self.buffer.len() < batch_size {
            return None;
        }

        let samples = (0..batch_size)
            .map(|_| self.buffer[rng.gen_range(0..self.buffer.len())].clone())
            .collect();
        Some(samples)
    }

    /// Whether the buffer can serve a batch of `batch_size`.
    #[inline]
    pub fn is_ready(&self, batch_size: usize) -> bool {
        batch_size > 0 && self.buffer.len() >= batch_size
    }

    /// Current number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether every slot has been written at least once.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove all items.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.write_pos = 0;
    }

    /// Iterate over stored items in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(ReplayBuffer::<u32>::new(0).is_err());
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let mut buffer = ReplayBuffer::new(3).unwrap();
        for i in 0..5u32 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 3);
        assert!(buffer.is_full());

        let mut items: Vec<u32> = buffer.iter().copied().collect();
        items.sort_unstable();
        assert_eq!(items, vec![2, 3, 4]);
    }

    #[test]
    fn test_sample_requires_enough_items() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut buffer = ReplayBuffer::new(10).unwrap();
        buffer.push(1u32);
        assert!(buffer.sample(2, &mut rng).is_none());
        assert!(!buffer.is_ready(2));

        buffer.push(2);
        let batch = buffer.sample(2, &mut rng).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|x| *x == 1 || *x == 2));
    }

    #[test]
    fn test_sample_is_uniform() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut buffer = ReplayBuffer::new(4).unwrap();
        for i in 0..4usize {
            buffer.push(i);
        }

        let mut counts = [0usize; 4];
        for _ in 0..2_000 {
            for x in buffer.sample(4, &mut rng).unwrap() {
                counts[x] += 1;
            }
        }
        // 8000 draws, 2000 expected per slot
        for c in counts {
            assert!((1_800..=2_200).contains(&c), "count {} far from uniform", c);
        }
    }

    #[test]
    fn test_clear() {
        let mut buffer = ReplayBuffer::new(2).unwrap();
        buffer.push(1u8);
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.push(2);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2]);
    }
}
