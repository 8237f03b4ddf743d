use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Single-producer / single-consumer ring buffer for raw ADC samples.
//
// The buffer is split at construction into a `ChunkProducer` (owned by the
// sampling driver's completion context) and a `ChunkConsumer` (owned by the
// polling context). Each cursor has exactly one writer: the producer advances
// `write`, the consumer advances `read`. The single exception is overflow,
// where the producer steals unread samples by advancing `read` with a CAS so
// the cursor stays monotonic even if a fetch races the steal.
//
// One slot is reserved so a full buffer (`available == capacity - 1`) is
// never confused with an empty one.

/// Callback invoked from the completion context with the number of unread
/// samples after each chunk lands. Must do nothing heavier than setting a
/// flag: no buffer access, no logging, no allocation.
pub type NotifyFn = dyn Fn(usize) + Send + Sync;

struct Shared {
    storage: UnsafeCell<Box<[u16]>>,
    capacity: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// Safety: the storage is only written through `ChunkProducer::push_chunk`
// (one context) and only read through `ChunkConsumer::fetch` (one context),
// in regions fenced off by the acquire/release cursor pair. A forced discard
// claims its region via CAS on `read` before the producer overwrites it.
unsafe impl Sync for Shared {}
unsafe impl Send for Shared {}

/// Producer half: appends one chunk of samples per sampling period.
pub struct ChunkProducer {
    shared: Arc<Shared>,
    notify: Option<Arc<NotifyFn>>,
}

/// Consumer half: FIFO copy-out of unread samples.
pub struct ChunkConsumer {
    shared: Arc<Shared>,
}

/// Create a ring buffer of `capacity` slots and split it into its two
/// single-owner handles. `notify` is invoked by the producer after each push.
pub fn split(capacity: usize, notify: Option<Arc<NotifyFn>>) -> (ChunkProducer, ChunkConsumer) {
    let shared = Arc::new(Shared {
        storage: UnsafeCell::new(vec![0u16; capacity].into_boxed_slice()),
        capacity,
        write: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
    });
    (
        ChunkProducer {
            shared: Arc::clone(&shared),
            notify,
        },
        ChunkConsumer { shared },
    )
}

impl ChunkProducer {
    /// Append `chunk` at the write cursor, discarding the oldest samples if
    /// the buffer lacks room (overwrite-oldest policy: the producer is
    /// hardware-paced and cannot be stalled). Returns the number of unread
    /// samples after the push, which is also passed to the notify callback.
    ///
    /// Non-blocking and allocation-free; runs in the completion context.
    pub fn push_chunk(&self, chunk: &[u16]) -> usize {
        let shared = &*self.shared;
        let capacity = shared.capacity;
        debug_assert!(chunk.len() < capacity);

        let write = shared.write.load(Ordering::Relaxed);
        let mut read = shared.read.load(Ordering::Acquire);

        // One slot stays reserved to disambiguate full from empty. If room
        // is short, steal the oldest unread samples by advancing the read
        // cursor; a concurrent fetch may race the steal, so recheck free
        // space until the CAS lands or the consumer has drained enough.
        loop {
            let free = (read + capacity - write - 1) % capacity;
            if free >= chunk.len() {
                break;
            }
            let next = (read + (chunk.len() - free)) % capacity;
            match shared
                .read
                .compare_exchange(read, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(current) => read = current,
            }
        }

        // Safety: the region [write, write + chunk.len()) is unreadable by
        // the consumer (it lies between the cursors) now that any overflow
        // region has been reclaimed above.
        let storage = unsafe { &mut *shared.storage.get() };
        for (i, &sample) in chunk.iter().enumerate() {
            storage[(write + i) % capacity] = sample;
        }

        let new_write = (write + chunk.len()) % capacity;
        shared.write.store(new_write, Ordering::Release);

        let available = (new_write + capacity - shared.read.load(Ordering::Relaxed)) % capacity;
        if let Some(notify) = &self.notify {
            notify(available);
        }
        available
    }
}

impl ChunkConsumer {
    /// Number of unread samples.
    pub fn available(&self) -> usize {
        let shared = &*self.shared;
        let write = shared.write.load(Ordering::Acquire);
        let read = shared.read.load(Ordering::Relaxed);
        (write + shared.capacity - read) % shared.capacity
    }

    /// Copy up to `out.len()` unread samples into `out` in FIFO order and
    /// advance the read cursor by the count actually copied. Returns that
    /// count; 0 when nothing is available. Never blocks.
    pub fn fetch(&mut self, out: &mut [u16]) -> usize {
        let shared = &*self.shared;
        let capacity = shared.capacity;

        loop {
            let write = shared.write.load(Ordering::Acquire);
            let read = shared.read.load(Ordering::Acquire);
            let available = (write + capacity - read) % capacity;
            let count = available.min(out.len());
            if count == 0 {
                return 0;
            }

            // Safety: [read, read + count) lies between the cursors; the
            // producer only writes past `write`. If an overflow steal moves
            // `read` under us, the CAS below fails and we re-copy.
            let storage = unsafe { &*shared.storage.get() };
            for (i, slot) in out.iter_mut().take(count).enumerate() {
                *slot = storage[(read + i) % capacity];
            }

            let next = (read + count) % capacity;
            if shared
                .read
                .compare_exchange(read, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return count;
            }
        }
    }
}
