//! A session-scoped, bounded free-list of transfer buffers.
//!
//! The original driver keeps a per-driver lookaside list for per-transfer
//! allocations (`send_context`). There is no global equivalent here: the
//! pool is owned by the session, bounded in size, and torn down with it.

use std::sync::Mutex;

pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        BufferPool {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Takes a buffer from the pool if one is free, otherwise allocates fresh.
    pub fn acquire(&self, min_len: usize) -> Vec<u8> {
        let mut free = self.free.lock().unwrap();
        if let Some(mut buf) = free.pop() {
            buf.clear();
            buf.resize(min_len, 0);
            buf
        } else {
            vec![0u8; min_len]
        }
    }

    /// Returns a buffer to the pool, dropping it instead if the pool is full.
    pub fn release(&self, buf: Vec<u8>) {
        let mut free = self.free.lock().unwrap();
        if free.len() < self.capacity {
            free.push(buf);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquired_buffer_has_requested_length() {
        let pool = BufferPool::new(4);
        let buf = pool.acquire(64);
        assert_eq!(buf.len(), 64);
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = BufferPool::new(4);
        let buf = pool.acquire(64);
        pool.release(buf);
        let buf2 = pool.acquire(32);
        assert_eq!(buf2.len(), 32);
    }

    #[test]
    fn pool_does_not_grow_past_capacity() {
        let pool = BufferPool::new(1);
        pool.release(vec![0; 8]);
        pool.release(vec![0; 8]);
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
