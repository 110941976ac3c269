//! The multiplexed transfer set.
//!
//! A [`Multi`] drives several [`Easy`] transfers at once. [`Multi::perform`] turns the
//! engine's poll, perform and read-info cycle into a plain iterator of [`Event`]s, so
//! the transfers can be consumed one chunk at a time:
//!
//! ```no_run
//! # use micro_curl::{Curl, Engine, EventKind};
//! # fn run<E: Engine>(curl: Curl<E>) -> Result<(), micro_curl::CurlError> {
//! let first = curl.easy()?;
//! let second = curl.easy()?;
//!
//! let mut multi = curl.multi()?;
//! multi.add(&first)?.add(&second)?;
//!
//! for event in multi.perform() {
//!     let event = event?;
//!     match event.kind {
//!         EventKind::Data(chunk) => println!("{}: {} bytes", event.transfer, chunk.len()),
//!         EventKind::Header(_) => {}
//!         EventKind::Done => println!("{} done", event.transfer),
//!         EventKind::Error(e) => println!("{} failed: {e}", event.transfer),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod event;
mod pending;
mod transfers;

pub use event::{Event, EventKind};
pub use transfers::Transfers;

use crate::easy::Easy;
use crate::engine::{Engine, HandleKind, RawHandle};
use crate::error::CurlError;
use crate::handle::NativeHandle;
use crate::proxy::{CapabilityTable, Proxy, impl_forward};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, error};

/// A set of transfers driven together.
///
/// The set only refers to its transfers: removing a transfer, or dropping the set,
/// never releases the transfer itself. A transfer dropped while attached is forgotten
/// by the set, the engine detaches it as part of releasing it.
#[derive(Debug)]
pub struct Multi<E: Engine> {
    proxy: Proxy<E>,
    attached: Vec<Attached>,
    wait_timeout: Option<Duration>,
}

/// An attached transfer, alive as long as its [`Easy`] is.
#[derive(Debug)]
struct Attached {
    transfer: RawHandle,
    owner: Weak<()>,
}

impl Attached {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }

    fn is<E: Engine>(&self, easy: &Easy<E>) -> bool {
        std::ptr::eq(self.owner.as_ptr(), Rc::as_ptr(easy.token()))
    }
}

impl_forward!(Multi);

impl<E: Engine> Multi<E> {
    pub(crate) fn open(engine: &Rc<E>, table: Rc<CapabilityTable>) -> Result<Self, CurlError> {
        let handle = NativeHandle::open(engine, HandleKind::Multi).map_err(CurlError::init)?;
        Ok(Self { proxy: Proxy::new(handle, table), attached: Vec::new(), wait_timeout: None })
    }

    /// Attaches a transfer to the set.
    pub fn add(&mut self, easy: &Easy<E>) -> Result<&mut Self, CurlError> {
        let raw = self.handle();
        if let Err(e) = self.proxy.handle().engine().multi_add(raw, easy.id()) {
            error!(multi = %raw, easy = %easy.id(), cause = %e, "failed to add transfer");
            return Err(CurlError::transfer(e));
        }

        debug!(multi = %raw, easy = %easy.id(), "transfer added");
        self.attached.push(Attached { transfer: easy.id(), owner: Rc::downgrade(easy.token()) });
        Ok(self)
    }

    /// Detaches a transfer from the set.
    pub fn remove(&mut self, easy: &Easy<E>) -> Result<&mut Self, CurlError> {
        let raw = self.handle();
        if let Err(e) = self.proxy.handle().engine().multi_remove(raw, easy.id()) {
            error!(multi = %raw, easy = %easy.id(), cause = %e, "failed to remove transfer");
            return Err(CurlError::transfer(e));
        }

        debug!(multi = %raw, easy = %easy.id(), "transfer removed");
        if let Some(index) = self.attached.iter().position(|attached| attached.is(easy)) {
            self.attached.remove(index);
        }
        Ok(self)
    }

    /// Sets how long each iteration step waits for activity, `None` uses the engine default.
    pub fn set_wait_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.wait_timeout = timeout;
        self
    }

    #[inline]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }

    /// Returns true if `easy` is attached to this set
    pub fn contains(&self, easy: &Easy<E>) -> bool {
        self.attached.iter().any(|attached| attached.is(easy))
    }

    /// The number of attached transfers
    pub fn len(&self) -> usize {
        self.attached.iter().filter(|attached| attached.is_live()).count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drives the attached transfers, yielding their events one at a time.
    ///
    /// Nothing happens until the first pull. The first pull replaces the write and
    /// header callbacks of every attached transfer: their chunks are delivered as
    /// [`EventKind::Data`] and [`EventKind::Header`] events instead.
    ///
    /// The iterator ends once no transfer is running and every event has been
    /// yielded. An engine failure is yielded as the last item. Calling `perform` again
    /// starts a new pass.
    pub fn perform(&mut self) -> Transfers<'_, E> {
        Transfers::new(self)
    }

    pub(crate) fn native(&self) -> &NativeHandle<E> {
        self.proxy.handle()
    }

    /// Forgets transfers dropped since they were attached, returns the remaining ones.
    pub(crate) fn prune(&mut self) -> Vec<RawHandle> {
        let raw = self.handle();
        self.attached.retain(|attached| {
            let live = attached.is_live();
            if !live {
                debug!(multi = %raw, easy = %attached.transfer, "forgetting dropped transfer");
            }
            live
        });
        self.attached.iter().map(|attached| attached.transfer).collect()
    }
}
