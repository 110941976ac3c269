//! A micro object layer over a curl-style transfer engine
//!
//! This crate wraps a procedural, handle-based transfer engine (a binding to a native
//! multi-protocol transfer library) in three cooperating handle types:
//!
//! - [`Easy`]: a single transfer
//! - [`Multi`]: a set of transfers driven together
//! - [`Share`]: state shared across transfers (cookies, DNS cache, TLS sessions)
//!
//! The engine itself is reached through the [`Engine`] trait and injected through
//! [`Curl::new`]. Connection handling, protocols, TLS and DNS all stay on the engine's
//! side; this crate only shapes the surface.
//!
//! # Example
//!
//! ```no_run
//! use micro_curl::{Curl, Engine, EventKind, PerformOptions, Value};
//!
//! fn fetch<E: Engine>(engine: E) -> Result<(), micro_curl::CurlError> {
//!     let curl = Curl::new(engine);
//!     println!("engine {}", curl.version());
//!
//!     // a single transfer, forwarded setters chain
//!     let mut easy = curl.easy()?;
//!     easy.call("setopt_url", &[Value::from("http://example.com")])?;
//!     easy.setopt_proxytype("SOCKS5")?;
//!     easy.perform(PerformOptions::new().write_function(|chunk| {
//!         println!("{} bytes", chunk.len());
//!         chunk.len()
//!     }))?;
//!
//!     // several transfers at once
//!     let other = curl.easy()?;
//!     let mut multi = curl.multi()?;
//!     multi.add(&easy)?.add(&other)?;
//!     for event in multi.perform() {
//!         let event = event?;
//!         if let EventKind::Data(chunk) = event.kind {
//!             println!("{}: {} bytes", event.transfer, chunk.len());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`engine`]: the [`Engine`] trait and the values crossing it
//! - [`Easy`], [`Multi`], [`Share`]: the handle wrappers
//! - [`multi`]: the event iterator behind [`Multi::perform`]
//!
//! ## Forwarding
//!
//! Each wrapper defines only the methods that add behaviour over the engine. Any other
//! operation the engine exposes for the wrapper's handle kind is reached through
//! `call(name, args)`, e.g. `easy.call("setopt_url", ..)`. The answer is a [`Reply`]:
//! [`Reply::This`] when the engine answered with the wrapper's own handle, which lets
//! setters chain, or [`Reply::Value`] with the engine's answer as is.
//!
//! ## Errors
//!
//! All fallible operations return [`CurlError`]. Engine failures carry the
//! [`EngineError`] reported by the engine.
//!
//! ## Threading
//!
//! Wrappers share the engine through an `Rc` and are neither `Send` nor `Sync`. The only
//! blocking point is the iterator returned by [`Multi::perform`], which waits on the
//! engine for transfer activity.

pub mod engine;
pub mod multi;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

mod easy;
mod error;
mod form;
mod handle;
mod proxy;
mod share;

pub use easy::{Easy, ErrorHook, PerformOptions, ProxyType};
pub use engine::{Engine, RawHandle, Value};
pub use error::{CurlError, EngineError};
pub use form::{FormField, FormUpload};
pub use multi::{Event, EventKind, Multi, Transfers};
pub use proxy::{Forwarder, Reply};
pub use share::{Share, ShareKind};

use engine::HandleKind;
use proxy::CapabilityTable;
use std::fmt;
use std::rc::Rc;

/// The entry point: owns the injected engine and builds the handle wrappers.
pub struct Curl<E: Engine> {
    engine: Rc<E>,
    easy: Rc<CapabilityTable>,
    multi: Rc<CapabilityTable>,
    share: Rc<CapabilityTable>,
}

impl<E: Engine> Curl<E> {
    /// Wraps `engine`, reading the operations it exposes for each handle kind once.
    pub fn new(engine: E) -> Self {
        let engine = Rc::new(engine);
        Self {
            easy: Rc::new(CapabilityTable::build(engine.as_ref(), HandleKind::Easy)),
            multi: Rc::new(CapabilityTable::build(engine.as_ref(), HandleKind::Multi)),
            share: Rc::new(CapabilityTable::build(engine.as_ref(), HandleKind::Share)),
            engine,
        }
    }

    /// Creates a single transfer.
    ///
    /// # Errors
    /// [`CurlError::Init`] if the engine cannot allocate the handle
    pub fn easy(&self) -> Result<Easy<E>, CurlError> {
        Easy::open(&self.engine, Rc::clone(&self.easy))
    }

    /// Creates an empty transfer set.
    ///
    /// # Errors
    /// [`CurlError::Init`] if the engine cannot allocate the handle
    pub fn multi(&self) -> Result<Multi<E>, CurlError> {
        Multi::open(&self.engine, Rc::clone(&self.multi))
    }

    /// Creates a shared-state handle.
    ///
    /// # Errors
    /// [`CurlError::Init`] if the engine cannot allocate the handle
    pub fn share(&self) -> Result<Share<E>, CurlError> {
        Share::open(&self.engine, Rc::clone(&self.share))
    }

    /// The engine version
    pub fn version(&self) -> String {
        self.engine.version()
    }

    /// The injected engine
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: Engine> fmt::Debug for Curl<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Curl").field("easy", &self.easy).field("multi", &self.multi).field("share", &self.share).finish()
    }
}
