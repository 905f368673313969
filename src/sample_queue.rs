// Sample Queue - Lock-Free Producer, Unbounded Consumer
//
// Architecture:
// 1. Capture callback: ONLY pushes into a lock-free SPSC ring (SampleWriter)
// 2. Consumer side (SampleQueue) moves everything in flight into an
//    unbounded staging deque before each read
// 3. Neither side ever blocks or waits

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::{traits::{Consumer, Producer, Split}, HeapCons, HeapProd, HeapRb};

/// Create a connected writer/queue pair
///
/// `ring_capacity` bounds only the samples in flight between the two
/// threads; the queue itself grows without limit if reads stall.
pub fn sample_queue(ring_capacity: usize) -> (SampleWriter, SampleQueue) {
    let rb = HeapRb::<i16>::new(ring_capacity.max(1));
    let (producer, consumer) = rb.split();
    let dropped = Arc::new(AtomicU64::new(0));

    (
        SampleWriter {
            producer,
            dropped: dropped.clone(),
            overflow_logged: false,
        },
        SampleQueue {
            consumer,
            staged: VecDeque::new(),
            dropped,
        },
    )
}

/// Capture-side handle. Owned by the device callback.
pub struct SampleWriter {
    producer: HeapProd<i16>,
    dropped: Arc<AtomicU64>,
    overflow_logged: bool,
}

impl SampleWriter {
    /// Append one sample. Never blocks.
    ///
    /// If the transport ring is full the sample is counted as dropped.
    pub fn enqueue(&mut self, sample: i16) {
        if self.producer.try_push(sample).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if !self.overflow_logged {
                self.overflow_logged = true;
                log::warn!("[SampleQueue] Transport ring full, dropping capture samples");
            }
        }
    }

    pub fn enqueue_slice(&mut self, samples: &[i16]) {
        for &sample in samples {
            self.enqueue(sample);
        }
    }
}

/// Consumer-side FIFO of canonical 8kHz samples
pub struct SampleQueue {
    consumer: HeapCons<i16>,
    staged: VecDeque<i16>,
    dropped: Arc<AtomicU64>,
}

impl SampleQueue {
    fn pull_in_flight(&mut self) {
        while let Some(sample) = self.consumer.try_pop() {
            self.staged.push_back(sample);
        }
    }

    /// Move everything in flight into staging and return how many samples
    /// can be read right now
    pub fn available(&mut self) -> usize {
        self.pull_in_flight();
        self.staged.len()
    }

    /// Dequeue exactly `out.len()` samples, or nothing at all.
    ///
    /// Returns false (queue untouched) when fewer samples are available.
    pub fn read_exact(&mut self, out: &mut [i16]) -> bool {
        self.pull_in_flight();
        let n = out.len();
        if self.staged.len() < n {
            return false;
        }
        for (slot, sample) in out.iter_mut().zip(self.staged.drain(..n)) {
            *slot = sample;
        }
        true
    }

    /// Dequeue up to `out.len()` samples, returning how many were written
    pub fn read_up_to(&mut self, out: &mut [i16]) -> usize {
        self.pull_in_flight();
        let n = out.len().min(self.staged.len());
        for (slot, sample) in out.iter_mut().zip(self.staged.drain(..n)) {
            *slot = sample;
        }
        n
    }

    /// Discard everything queued or in flight
    pub fn clear(&mut self) {
        while self.consumer.try_pop().is_some() {}
        self.staged.clear();
    }

    /// Samples dropped because the transport ring was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
