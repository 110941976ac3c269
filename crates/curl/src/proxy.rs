//! Forwarding of engine operations through the handle wrappers.
//!
//! Each wrapper only defines a handful of methods of its own. Every other operation the
//! engine exposes for the wrapper's [`HandleKind`] is reachable through `call`, which
//! resolves the name against a [`CapabilityTable`] built once per engine, binds a
//! [`Forwarder`] for it and caches that forwarder on the wrapper instance.
//!
//! A forwarded setter that answers with the wrapper's own handle (the engine convention
//! for success) produces [`Reply::This`], so calls can be chained; any other answer is
//! passed back untouched as [`Reply::Value`].

use crate::engine::{Engine, HandleKind, Value};
use crate::error::CurlError;
use crate::handle::NativeHandle;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{trace, warn};

/// The operations an engine exposes for one handle kind.
#[derive(Debug)]
pub(crate) struct CapabilityTable {
    kind: HandleKind,
    operations: HashSet<Rc<str>>,
}

impl CapabilityTable {
    pub(crate) fn build<E: Engine>(engine: &E, kind: HandleKind) -> Self {
        let operations: HashSet<Rc<str>> = engine.operations(kind).into_iter().map(Rc::from).collect();
        trace!(kind = kind.as_str(), count = operations.len(), "built capability table");
        Self { kind, operations }
    }

    fn resolve(&self, name: &str) -> Option<Rc<str>> {
        self.operations.get(name).cloned()
    }
}

/// An engine operation bound to a wrapper instance.
#[derive(Debug, Clone)]
pub struct Forwarder {
    target: Rc<str>,
}

impl Forwarder {
    /// The engine operation this forwarder dispatches to
    pub fn name(&self) -> &str {
        &self.target
    }

    /// Returns true if both forwarders dispatch to the same bound target
    pub fn same_target(&self, other: &Forwarder) -> bool {
        Rc::ptr_eq(&self.target, &other.target)
    }

    /// Calls the bound operation on the handle of `proxy`.
    pub(crate) fn invoke<E: Engine>(&self, proxy: &Proxy<E>, args: &[Value]) -> Result<Forwarded, CurlError> {
        proxy.dispatch(&self.target, args)
    }
}

/// The answer of a forwarded call.
#[derive(Debug)]
pub enum Reply<'w, W> {
    /// The engine answered with the wrapper's own handle
    This(&'w mut W),
    /// Any other answer, unmodified
    Value(Value),
}

impl<'w, W> Reply<'w, W> {
    #[inline]
    pub fn is_this(&self) -> bool {
        matches!(self, Reply::This(_))
    }

    /// The wrapper, when the call answered with it
    pub fn this(self) -> Option<&'w mut W> {
        match self {
            Reply::This(this) => Some(this),
            Reply::Value(_) => None,
        }
    }

    /// The value, when the call did not answer with the wrapper
    pub fn value(self) -> Option<Value> {
        match self {
            Reply::This(_) => None,
            Reply::Value(value) => Some(value),
        }
    }
}

/// [`Reply`] before it is tied to the wrapper borrow
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Forwarded {
    This,
    Value(Value),
}

impl Forwarded {
    pub(crate) fn into_reply<W>(self, this: &mut W) -> Reply<'_, W> {
        match self {
            Forwarded::This => Reply::This(this),
            Forwarded::Value(value) => Reply::Value(value),
        }
    }
}

/// The native handle of a wrapper together with its forwarding state.
#[derive(Debug)]
pub(crate) struct Proxy<E: Engine> {
    handle: NativeHandle<E>,
    table: Rc<CapabilityTable>,
    cache: HashMap<String, Forwarder>,
}

impl<E: Engine> Proxy<E> {
    pub(crate) fn new(handle: NativeHandle<E>, table: Rc<CapabilityTable>) -> Self {
        debug_assert_eq!(handle.kind(), table.kind);
        Self { handle, table, cache: HashMap::new() }
    }

    #[inline]
    pub(crate) fn handle(&self) -> &NativeHandle<E> {
        &self.handle
    }

    /// Resolves `name` to a cached forwarder, binding one on first use.
    pub(crate) fn lookup(&mut self, name: &str) -> Option<Forwarder> {
        if let Some(forwarder) = self.cache.get(name) {
            return Some(forwarder.clone());
        }

        let target = self.table.resolve(name)?;
        trace!(kind = self.table.kind.as_str(), name, "bound forwarder");
        let forwarder = Forwarder { target };
        self.cache.insert(name.to_owned(), forwarder.clone());
        Some(forwarder)
    }

    /// Forwards `name` if the engine exposes it for this handle kind.
    pub(crate) fn forward(&mut self, name: &str, args: &[Value]) -> Result<Forwarded, CurlError> {
        let forwarder = self.lookup(name).ok_or_else(|| CurlError::attribute(name))?;
        forwarder.invoke(self, args)
    }

    /// Calls the engine operation without consulting the capability table.
    pub(crate) fn dispatch(&self, name: &str, args: &[Value]) -> Result<Forwarded, CurlError> {
        let raw = self.handle.raw();
        trace!(handle = %raw, name, "forwarding call");
        match self.handle.engine().call(raw, name, args) {
            Ok(Value::Handle(answer)) if answer == raw => Ok(Forwarded::This),
            Ok(value) => Ok(Forwarded::Value(value)),
            Err(e) => {
                warn!(handle = %raw, name, cause = %e, "forwarded call failed");
                Err(CurlError::transfer(e))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Implements the forwarding surface shared by every wrapper type.
macro_rules! impl_forward {
    ($t:ident) => {
        impl<E: $crate::engine::Engine> $t<E> {
            /// Looks up an engine operation by name, binding and caching a forwarder for it.
            ///
            /// Returns `None` when the engine does not expose the operation for this handle.
            pub fn method(&mut self, name: &str) -> Option<$crate::proxy::Forwarder> {
                self.proxy.lookup(name)
            }

            /// Forwards a call to the engine operation `name` with this handle as implicit
            /// first argument.
            ///
            /// # Errors
            /// - [`CurlError::Attribute`](crate::CurlError::Attribute) if the engine has no such operation
            /// - [`CurlError::Transfer`](crate::CurlError::Transfer) if the engine call fails
            pub fn call(
                &mut self,
                name: &str,
                args: &[$crate::engine::Value],
            ) -> Result<$crate::proxy::Reply<'_, Self>, $crate::error::CurlError> {
                let forwarded = self.proxy.forward(name, args)?;
                Ok(forwarded.into_reply(self))
            }

            /// The native handle owned by this wrapper
            #[inline]
            pub fn handle(&self) -> $crate::engine::RawHandle {
                self.proxy.handle().raw()
            }

            /// Releases the native handle now instead of at drop.
            pub fn close(self) {}
        }
    };
}

pub(crate) use impl_forward;
