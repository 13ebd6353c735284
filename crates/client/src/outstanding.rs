//! The Outstanding Table: seqnum-indexed live request records, protected
//! by a single lock covering both the map and the sequence counter so
//! allocation can never collide with a concurrent dequeue.

use crate::error::ClientError;
use crate::request::Request;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Inner {
    map: HashMap<u32, Arc<Request>>,
    next_seqnum: u32,
}

pub struct OutstandingTable {
    inner: Mutex<Inner>,
}

impl OutstandingTable {
    pub fn new() -> Self {
        OutstandingTable {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                next_seqnum: 0,
            }),
        }
    }

    /// Allocates a fresh seqnum (skipping 0 and any value currently
    /// live) and inserts the request built from it, all under one lock.
    pub fn insert<F>(&self, build: F) -> Result<(u32, Arc<Request>), ClientError>
    where
        F: FnOnce(u32) -> Request,
    {
        let mut inner = self.inner.lock().unwrap();
        if inner.map.len() as u64 >= u32::MAX as u64 {
            return Err(ClientError::Exhausted);
        }
        loop {
            inner.next_seqnum = inner.next_seqnum.wrapping_add(1);
            if inner.next_seqnum == 0 {
                continue;
            }
            if !inner.map.contains_key(&inner.next_seqnum) {
                break;
            }
        }
        let seqnum = inner.next_seqnum;
        let request = Arc::new(build(seqnum));
        inner.map.insert(seqnum, request.clone());
        Ok((seqnum, request))
    }

    /// Atomic lookup-and-remove; at most one caller ever obtains the record.
    pub fn dequeue(&self, seqnum: u32) -> Option<Arc<Request>> {
        self.inner.lock().unwrap().map.remove(&seqnum)
    }

    /// Looks up a live record without removing it, for cancellation's
    /// status-word CAS (the record stays in the table until completion).
    pub fn peek(&self, seqnum: u32) -> Option<Arc<Request>> {
        self.inner.lock().unwrap().map.get(&seqnum).cloned()
    }

    /// Atomically removes and returns every live record, for session teardown.
    pub fn drain(&self) -> Vec<Arc<Request>> {
        let mut inner = self.inner.lock().unwrap();
        inner.map.drain().map(|(_, v)| v).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}

impl Default for OutstandingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::UrbKind;
    use usbip_wire::Direction;

    #[derive(Debug)]
    struct NullHandle;
    impl crate::host::HostRequestHandle for NullHandle {}

    fn dummy_request(seqnum: u32) -> Request {
        Request {
            seqnum,
            urb_kind: UrbKind::BulkOrInterrupt,
            direction: Direction::Out,
            transfer_buffer: Mutex::new(Some(Vec::new())),
            declared_length: 0,
            iso_packets: Mutex::new(Vec::new()),
            result_status: Mutex::new(None),
            result_actual_length: std::sync::atomic::AtomicU32::new(0),
            status: crate::status::StatusWord::new(),
            urb_function_select: false,
            host_handle: Some(Box::new(NullHandle)),
            victim_seqnum: None,
        }
    }

    #[test]
    fn seqnum_zero_is_never_allocated() {
        let table = OutstandingTable::new();
        let (seq, _) = table.insert(dummy_request).unwrap();
        assert_ne!(seq, 0);
    }

    #[test]
    fn seqnums_increment_and_skip_live_entries() {
        let table = OutstandingTable::new();
        let (s1, _) = table.insert(dummy_request).unwrap();
        let (s2, _) = table.insert(dummy_request).unwrap();
        assert_ne!(s1, s2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn dequeue_removes_exactly_once() {
        let table = OutstandingTable::new();
        let (seq, _) = table.insert(dummy_request).unwrap();
        assert!(table.dequeue(seq).is_some());
        assert!(table.dequeue(seq).is_none());
    }

    #[test]
    fn collision_with_live_entry_is_skipped() {
        let table = OutstandingTable::new();
        let (s1, _) = table.insert(dummy_request).unwrap();
        // Force the counter to wrap right onto the live seqnum.
        table.inner.lock().unwrap().next_seqnum = s1.wrapping_sub(1);
        let (s2, _) = table.insert(dummy_request).unwrap();
        assert_ne!(s1, s2);
    }

    #[test]
    fn drain_empties_the_table() {
        let table = OutstandingTable::new();
        table.insert(dummy_request).unwrap();
        table.insert(dummy_request).unwrap();
        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(table.len(), 0);
    }
}
