//! Reusable read/write buffer pool (SPEC_FULL.md A5).
//!
//! Every worker in [`crate::workerpool`] checks out a buffer before copying
//! a file and returns it when done, on every exit path including early
//! returns on error — that return is handled by [`PooledBuffer`]'s `Drop`
//! impl rather than by caller discipline.

use std::sync::{Arc, Mutex};

struct Inner {
    buffer_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

/// A fixed-capacity set of equally-sized byte buffers. Checking out more
/// buffers than were preallocated just allocates a fresh one; it is never
/// an error, only a missed reuse.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        let free = (0..capacity).map(|_| vec![0u8; buffer_size]).collect();
        Self {
            inner: Arc::new(Inner {
                buffer_size,
                free: Mutex::new(free),
            }),
        }
    }

    pub fn checkout(&self) -> PooledBuffer {
        let buffer = self
            .inner
            .free
            .lock()
            .expect("buffer pool mutex poisoned")
            .pop()
            .unwrap_or_else(|| vec![0u8; self.inner.buffer_size]);
        PooledBuffer {
            buffer: Some(buffer),
            pool: self.inner.clone(),
        }
    }
}

/// An on-loan buffer. Returned to the pool automatically when dropped.
pub struct PooledBuffer {
    buffer: Option<Vec<u8>>,
    pool: Arc<Inner>,
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        self.buffer.as_ref().expect("buffer taken before drop")
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buffer.as_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.clear();
            buffer.resize(self.pool.buffer_size, 0);
            self.pool
                .free
                .lock()
                .expect("buffer pool mutex poisoned")
                .push(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_returns_buffer_of_requested_size() {
        let pool = BufferPool::new(4096, 2);
        let buf = pool.checkout();
        assert_eq!(buf.len(), 4096);
    }

    #[test]
    fn dropped_buffer_is_reused() {
        let pool = BufferPool::new(1024, 1);
        {
            let _buf = pool.checkout();
        }
        let buf = pool.checkout();
        assert_eq!(buf.len(), 1024);
        assert_eq!(pool.inner.free.lock().unwrap().len(), 0);
    }

    #[test]
    fn exceeding_capacity_still_works() {
        let pool = BufferPool::new(512, 1);
        let a = pool.checkout();
        let b = pool.checkout();
        assert_eq!(a.len(), 512);
        assert_eq!(b.len(), 512);
    }
}
