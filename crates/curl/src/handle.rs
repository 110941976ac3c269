use crate::engine::{Engine, HandleKind, RawHandle};
use crate::error::EngineError;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Exclusive owner of one native handle.
///
/// The handle is released exactly once, when the owner is dropped.
pub(crate) struct NativeHandle<E: Engine> {
    engine: Rc<E>,
    raw: RawHandle,
    kind: HandleKind,
}

impl<E: Engine> NativeHandle<E> {
    pub(crate) fn open(engine: &Rc<E>, kind: HandleKind) -> Result<Self, EngineError> {
        let raw = engine.create(kind)?;
        debug!(kind = kind.as_str(), handle = %raw, "native handle created");
        Ok(Self { engine: Rc::clone(engine), raw, kind })
    }

    #[inline]
    pub(crate) fn raw(&self) -> RawHandle {
        self.raw
    }

    #[inline]
    pub(crate) fn kind(&self) -> HandleKind {
        self.kind
    }

    #[inline]
    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    #[inline]
    pub(crate) fn engine_rc(&self) -> &Rc<E> {
        &self.engine
    }
}

impl<E: Engine> Drop for NativeHandle<E> {
    fn drop(&mut self) {
        debug!(kind = self.kind.as_str(), handle = %self.raw, "native handle released");
        self.engine.release(self.raw);
    }
}

impl<E: Engine> fmt::Debug for NativeHandle<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle").field("raw", &self.raw).field("kind", &self.kind).finish()
    }
}
