//! The seam between the object layer and the native transfer engine.
//!
//! Everything that actually moves bytes (connection handling, protocol state machines,
//! TLS, DNS caching, multipart encoding) lives behind the [`Engine`] trait. The wrappers
//! in this crate only ever talk to the engine through it, and receive it by injection
//! through [`Curl::new`](crate::Curl::new).
//!
//! The engine is handle based: it hands out opaque [`RawHandle`]s of a given
//! [`HandleKind`], and every operation names the handle it acts upon. Besides the
//! dedicated operations below, each handle kind exposes a set of named operations
//! (see [`Engine::operations`]) reachable through the generic [`Engine::call`]
//! dispatch. Setters follow the convention of returning the handle they were
//! invoked on when they succeed.

mod value;

pub use value::Value;

use crate::easy::ProxyType;
use crate::error::EngineError;
use crate::share::ShareKind;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// An opaque handle issued by the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(u64);

impl RawHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// A single transfer
    Easy,
    /// A set of transfers driven together
    Multi,
    /// Cross-transfer shared state
    Share,
    /// A multipart form under construction
    Form,
}

impl HandleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HandleKind::Easy => "easy",
            HandleKind::Multi => "multi",
            HandleKind::Share => "share",
            HandleKind::Form => "form",
        }
    }
}

/// A callback invoked by the engine while a transfer runs.
///
/// Every variant returns the number of bytes it handled; returning anything else
/// than the size of the chunk makes the engine abort the transfer.
pub enum Callback {
    /// Fills the given buffer with upload data, returns the number of bytes written
    Read(Box<dyn FnMut(&mut [u8]) -> usize>),
    /// Consumes a chunk of the response body
    Write(Box<dyn FnMut(&[u8]) -> usize>),
    /// Consumes a chunk of the response headers
    Header(Box<dyn FnMut(&[u8]) -> usize>),
}

impl Callback {
    pub fn name(&self) -> &'static str {
        match self {
            Callback::Read(_) => "readfunction",
            Callback::Write(_) => "writefunction",
            Callback::Header(_) => "headerfunction",
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.name()).finish()
    }
}

/// One part of a multipart form, as handed to [`Engine::form_add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    /// A plain `name=value` field
    Content { name: String, value: String, headers: Vec<String> },
    /// A file read by the engine from `path`
    File { name: String, path: String, content_type: Option<String>, filename: Option<String>, headers: Vec<String> },
    /// An in-memory upload presented as a file called `filename`
    Buffer { name: String, filename: String, data: Bytes, content_type: Option<String>, headers: Vec<String> },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            FormPart::Content { name, .. } | FormPart::File { name, .. } | FormPart::Buffer { name, .. } => name,
        }
    }
}

/// A finished transfer reported by [`Engine::multi_info_read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub handle: RawHandle,
    pub result: Result<(), EngineError>,
}

impl Completion {
    pub fn done(handle: RawHandle) -> Self {
        Self { handle, result: Ok(()) }
    }

    pub fn failed(handle: RawHandle, error: EngineError) -> Self {
        Self { handle, result: Err(error) }
    }
}

/// The native transfer engine binding.
#[cfg_attr(test, mockall::automock)]
pub trait Engine {
    /// The engine version string
    fn version(&self) -> String;

    /// Allocates a new native handle of the given kind
    fn create(&self, kind: HandleKind) -> Result<RawHandle, EngineError>;

    /// Releases a handle previously returned by [`Engine::create`].
    ///
    /// A released easy handle is detached from any multi handle it was added to.
    fn release(&self, handle: RawHandle);

    /// Names of the operations reachable through [`Engine::call`] for a handle kind
    fn operations(&self, kind: HandleKind) -> Vec<String>;

    /// Generic dispatch of a named operation on a handle
    fn call(&self, handle: RawHandle, name: &str, args: &[Value]) -> Result<Value, EngineError>;

    /// Registers a transfer callback, replacing the one of the same kind
    fn set_callback(&self, handle: RawHandle, callback: Callback) -> Result<(), EngineError>;

    /// Runs a single transfer to completion
    fn perform(&self, handle: RawHandle) -> Result<(), EngineError>;

    /// The engine constant selecting a proxy type
    fn proxy_type_code(&self, proxy_type: ProxyType) -> i64;

    /// The engine lock-data constant of a shareable data kind
    fn lock_data_code(&self, kind: ShareKind) -> i64;

    fn multi_add(&self, multi: RawHandle, easy: RawHandle) -> Result<(), EngineError>;

    fn multi_remove(&self, multi: RawHandle, easy: RawHandle) -> Result<(), EngineError>;

    /// Drives every attached transfer as far as possible without blocking,
    /// returns the number of transfers still running
    fn multi_perform(&self, multi: RawHandle) -> Result<usize, EngineError>;

    /// Blocks until an attached transfer has activity or the timeout elapses,
    /// `None` selects the engine default timeout. Returns the number of active transfers
    fn multi_wait(&self, multi: RawHandle, timeout: Option<Duration>) -> Result<usize, EngineError>;

    /// Pops the next finished transfer, if any
    fn multi_info_read(&self, multi: RawHandle) -> Result<Option<Completion>, EngineError>;

    /// Appends a part to a form handle
    fn form_add(&self, form: RawHandle, part: &FormPart) -> Result<(), EngineError>;
}
