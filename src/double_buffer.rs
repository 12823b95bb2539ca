//! Two-slot buffers for handing per-frame results from the writer to readers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

/// Two-slot buffer owned by a single writer.
///
/// [`DoubleBuffer::swap`] flips the current slot and hands out the previous
/// frame's data next to the slot being rebuilt, so per-frame state can be
/// derived from the last frame without copying it first.
#[derive(Debug, Clone, Default)]
pub struct DoubleBuffer<T> {
    buffers: [T; 2],
    current: usize,
}

impl<T> DoubleBuffer<T> {
    /// Buffer with `current` visible and `spare` as the next write target
    pub fn new(current: T, spare: T) -> Self {
        Self { buffers: [current, spare], current: 0 }
    }

    /// Make the other slot current. Returns `(previous, current)`.
    pub fn swap(&mut self) -> (&T, &mut T) {
        self.current ^= 1;
        let [first, second] = &mut self.buffers;
        if self.current == 0 {
            (&*second, first)
        } else {
            (&*first, second)
        }
    }

    /// Current slot
    pub fn get(&self) -> &T {
        &self.buffers[self.current]
    }

    /// Current slot, mutable
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.buffers[self.current]
    }

    /// Slot that was current before the last swap
    pub fn previous(&self) -> &T {
        &self.buffers[self.current ^ 1]
    }

    /// Apply `f` to both slots
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        self.buffers.iter_mut().for_each(&mut f);
    }
}

/// Two-slot buffer shared between one writer and any number of readers.
///
/// The writer fills the slot readers are not directed to, then flips the
/// published index with release ordering. Readers load the index with acquire
/// ordering. Each slot sits behind its own lock, so a reader that is still
/// copying a slot when the writer comes back to it delays the writer rather
/// than seeing a torn value.
#[derive(Debug, Default)]
pub struct PublishedBuffer<T> {
    slots: [RwLock<T>; 2],
    published: AtomicUsize,
    writer: Mutex<()>,
}

impl<T: Clone> PublishedBuffer<T> {
    /// Buffer publishing `initial`
    pub fn new(initial: T) -> Self {
        Self {
            slots: [RwLock::new(initial.clone()), RwLock::new(initial)],
            published: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Replace the published value
    pub fn publish(&self, value: T) {
        self.publish_with(|slot| *slot = value);
    }

    /// Build the next value in place, then publish it
    pub fn publish_with(&self, fill: impl FnOnce(&mut T)) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let next = self.published.load(Ordering::Acquire) ^ 1;
        {
            let mut slot = self.slots[next].write().unwrap_or_else(PoisonError::into_inner);
            fill(&mut *slot);
        }
        self.published.store(next, Ordering::Release);
    }

    /// Copy of the published value
    pub fn read(&self) -> T {
        self.with(T::clone)
    }

    /// Borrow the published value for the duration of `f`
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let index = self.published.load(Ordering::Acquire);
        let slot = self.slots[index].read().unwrap_or_else(PoisonError::into_inner);
        f(&*slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_swap_exposes_previous_frame() {
        let mut buffer = DoubleBuffer::new(vec![1], Vec::new());
        let (previous, current) = buffer.swap();
        assert_eq!(previous, &vec![1]);
        current.clear();
        current.extend(previous.iter().map(|v| v * 10));

        assert_eq!(buffer.get(), &vec![10]);
        assert_eq!(buffer.previous(), &vec![1]);

        let (previous, _) = buffer.swap();
        assert_eq!(previous, &vec![10]);
    }

    #[test]
    fn test_publish_and_read() {
        let buffer = PublishedBuffer::new(0u32);
        assert_eq!(buffer.read(), 0);
        buffer.publish(5);
        assert_eq!(buffer.read(), 5);
        buffer.publish_with(|value| *value += 2);
        // The spare slot still held the initial value
        assert_eq!(buffer.read(), 2);
    }

    #[test]
    fn test_readers_never_see_torn_values() {
        let buffer = Arc::new(PublishedBuffer::new([0u64; 16]));
        let writer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 1..2000u64 {
                    buffer.publish([i; 16]);
                }
            })
        };
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let value = buffer.read();
                        assert!(value.iter().all(|v| *v == value[0]));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.read(), [1999; 16]);
    }
}
