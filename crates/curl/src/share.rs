//! The shared-state handle.

use crate::engine::{Engine, HandleKind, Value};
use crate::error::CurlError;
use crate::handle::NativeHandle;
use crate::proxy::{CapabilityTable, Proxy, Reply, impl_forward};
use std::rc::Rc;
use std::str::FromStr;

/// State cached across the transfers it is attached to.
///
/// No locking happens here: whether one share may be used by transfers running on
/// several threads is up to the engine.
#[derive(Debug)]
pub struct Share<E: Engine> {
    proxy: Proxy<E>,
}

impl_forward!(Share);

impl<E: Engine> Share<E> {
    pub(crate) fn open(engine: &Rc<E>, table: Rc<CapabilityTable>) -> Result<Self, CurlError> {
        let handle = NativeHandle::open(engine, HandleKind::Share).map_err(CurlError::init)?;
        Ok(Self { proxy: Proxy::new(handle, table) })
    }

    /// Shares one kind of data by its symbolic name, see [`ShareKind`].
    ///
    /// # Errors
    /// [`CurlError::UnsupportedValue`] if `name` is not a shareable data kind
    pub fn setopt_share(&mut self, name: &str) -> Result<Reply<'_, Self>, CurlError> {
        let kind = name.parse::<ShareKind>()?;
        self.share(kind)
    }

    pub fn share(&mut self, kind: ShareKind) -> Result<Reply<'_, Self>, CurlError> {
        let code = self.proxy.handle().engine().lock_data_code(kind);
        let forwarded = self.proxy.dispatch("setopt_share", &[Value::Int(code)])?;
        Ok(forwarded.into_reply(self))
    }
}

/// The kinds of data a [`Share`] can hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShareKind {
    Cookie,
    Dns,
    SslSession,
}

impl ShareKind {
    pub const ALL: [ShareKind; 3] = [ShareKind::Cookie, ShareKind::Dns, ShareKind::SslSession];

    pub fn as_str(self) -> &'static str {
        match self {
            ShareKind::Cookie => "COOKIE",
            ShareKind::Dns => "DNS",
            ShareKind::SslSession => "SSL_SESSION",
        }
    }
}

impl FromStr for ShareKind {
    type Err = CurlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COOKIE" => Ok(ShareKind::Cookie),
            "DNS" => Ok(ShareKind::Dns),
            "SSL_SESSION" => Ok(ShareKind::SslSession),
            _ => Err(CurlError::unsupported_value("SHARE", s)),
        }
    }
}
