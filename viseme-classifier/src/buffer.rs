//! PCM sample ring buffer
//!
//! Carries leftover samples between `process` calls so the analysis
//! window/hop can be reconciled with arbitrary host block sizes. Owned
//! exclusively by one stream processor on one thread, so both ring halves
//! live in the same struct with no locking.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;

type RingBuffer = HeapRb<f32>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Bounded f32 sample buffer with peek/skip access for overlapped analysis.
pub struct SampleBuffer {
    producer: RingProducer,
    consumer: RingConsumer,
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity).split();
        Self { producer, consumer }
    }

    /// Append samples, returning how many fit. Never overwrites buffered
    /// data; the caller drains via `skip` and retries with the remainder.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Copy the oldest samples into `out` without consuming them.
    /// Returns the number of samples copied.
    pub fn peek_into(&self, out: &mut [f32]) -> usize {
        let mut copied = 0;
        for (dst, &src) in out.iter_mut().zip(self.consumer.iter()) {
            *dst = src;
            copied += 1;
        }
        copied
    }

    /// Drop the oldest `count` samples. Returns how many were dropped.
    pub fn skip(&mut self, count: usize) -> usize {
        self.consumer.skip(count)
    }

    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.consumer.capacity().get()
    }

    pub fn free_space(&self) -> usize {
        self.producer.vacant_len()
    }

    pub fn clear(&mut self) {
        let occupied = self.consumer.occupied_len();
        self.consumer.skip(occupied);
    }
}
