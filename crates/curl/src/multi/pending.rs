use super::{Event, EventKind};
use crate::engine::RawHandle;
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Events produced by the engine but not yet pulled from the iterator.
///
/// Each transfer has its own FIFO queue; queues are visited in the order their
/// transfers first produced an event.
#[derive(Debug, Default)]
pub(crate) struct PendingEvents {
    queues: IndexMap<RawHandle, VecDeque<EventKind>>,
    len: usize,
}

impl PendingEvents {
    pub(crate) fn push(&mut self, transfer: RawHandle, kind: EventKind) {
        self.queues.entry(transfer).or_default().push_back(kind);
        self.len += 1;
    }

    pub(crate) fn pop(&mut self) -> Option<Event> {
        let event = self.queues.iter_mut().find_map(|(transfer, queue)| queue.pop_front().map(|kind| Event::new(*transfer, kind)))?;
        self.len -= 1;
        Some(event)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const A: RawHandle = RawHandle::new(1);
    const B: RawHandle = RawHandle::new(2);

    #[test]
    fn test_order_within_transfer() {
        let mut pending = PendingEvents::default();
        pending.push(A, EventKind::Data(Bytes::from_static(b"1")));
        pending.push(A, EventKind::Data(Bytes::from_static(b"2")));
        pending.push(A, EventKind::Done);
        assert_eq!(pending.len(), 3);

        assert_eq!(pending.pop(), Some(Event::new(A, EventKind::Data(Bytes::from_static(b"1")))));
        assert_eq!(pending.pop(), Some(Event::new(A, EventKind::Data(Bytes::from_static(b"2")))));
        assert_eq!(pending.pop(), Some(Event::new(A, EventKind::Done)));
        assert_eq!(pending.pop(), None);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_drains_in_first_seen_order() {
        let mut pending = PendingEvents::default();
        pending.push(B, EventKind::Header(Bytes::from_static(b"HTTP/1.1 200 OK\r\n")));
        pending.push(A, EventKind::Data(Bytes::from_static(b"a")));
        pending.push(B, EventKind::Done);

        assert_eq!(pending.pop().map(|e| e.transfer), Some(B));
        assert_eq!(pending.pop().map(|e| e.transfer), Some(B));
        assert_eq!(pending.pop().map(|e| e.transfer), Some(A));
        assert!(pending.pop().is_none());

        // drained queues keep their position
        pending.push(A, EventKind::Done);
        pending.push(B, EventKind::Done);
        assert_eq!(pending.pop().map(|e| e.transfer), Some(B));
    }
}
