use crate::engine::RawHandle;
use crate::error::EngineError;
use bytes::Bytes;

/// One event of a transfer driven by a [`Multi`](super::Multi).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The transfer the event belongs to, compare with [`Easy::id`](crate::Easy::id)
    pub transfer: RawHandle,
    pub kind: EventKind,
}

/// What happened to a transfer.
///
/// `Data` and `Header` carry a chunk as the engine delivered it. Every transfer that
/// finishes while the set is driven ends with exactly one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A chunk of the response body
    Data(Bytes),
    /// A chunk of the response headers
    Header(Bytes),
    /// The transfer completed
    Done,
    /// The transfer failed
    Error(EngineError),
}

impl EventKind {
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, EventKind::Data(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, EventKind::Header(_))
    }

    /// Returns true if this event finishes its transfer
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, EventKind::Done | EventKind::Error(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Data(_) => "data",
            EventKind::Header(_) => "header",
            EventKind::Done => "done",
            EventKind::Error(_) => "error",
        }
    }

    /// Returns the chunk carried by a `Data` or `Header` event
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            EventKind::Data(bytes) | EventKind::Header(bytes) => Some(bytes),
            EventKind::Done | EventKind::Error(_) => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            EventKind::Data(bytes) | EventKind::Header(bytes) => Some(bytes),
            EventKind::Done | EventKind::Error(_) => None,
        }
    }
}

impl Event {
    pub fn new(transfer: RawHandle, kind: EventKind) -> Self {
        Self { transfer, kind }
    }

    /// Splits the event into `(payload, kind, transfer)`
    pub fn into_parts(self) -> (Option<Bytes>, &'static str, RawHandle) {
        let kind = self.kind.as_str();
        (self.kind.into_bytes(), kind, self.transfer)
    }
}
