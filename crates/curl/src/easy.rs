//! The single transfer handle.

use crate::engine::{Callback, Engine, HandleKind, RawHandle, Value};
use crate::error::CurlError;
use crate::form::{Form, FormField};
use crate::handle::NativeHandle;
use crate::proxy::{CapabilityTable, Proxy, Reply, impl_forward};
use crate::share::Share;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, error};

/// The recovery hook of [`Easy::perform`].
pub type ErrorHook = Box<dyn FnOnce(CurlError) -> Result<Value, CurlError>>;

/// A single transfer.
///
/// Operations not defined here are forwarded to the engine through [`Easy::call`].
#[derive(Debug)]
pub struct Easy<E: Engine> {
    proxy: Proxy<E>,
    form: Option<Form<E>>,
    // lets a Multi notice the transfer was dropped while attached
    token: Rc<()>,
}

impl_forward!(Easy);

impl<E: Engine> Easy<E> {
    pub(crate) fn open(engine: &Rc<E>, table: Rc<CapabilityTable>) -> Result<Self, CurlError> {
        let handle = NativeHandle::open(engine, HandleKind::Easy).map_err(CurlError::init)?;
        Ok(Self { proxy: Proxy::new(handle, table), form: None, token: Rc::new(()) })
    }

    /// The identity of this transfer in [`Multi`](crate::Multi) events
    #[inline]
    pub fn id(&self) -> RawHandle {
        self.handle()
    }

    pub(crate) fn token(&self) -> &Rc<()> {
        &self.token
    }

    /// Registers the callbacks in `options` and runs the transfer.
    ///
    /// Callbacks are registered read, write, header in that order. The first failing
    /// registration, or a failing transfer, is handed to the error hook of `options` and
    /// its result returned; without a hook the error is returned as is. Callbacks
    /// registered before a failure stay registered.
    ///
    /// Returns [`Reply::This`] when the transfer succeeds, [`Reply::Value`] when the hook
    /// recovered from a failure.
    pub fn perform(&mut self, options: PerformOptions) -> Result<Reply<'_, Self>, CurlError> {
        let PerformOptions { read, write, header, on_error } = options;
        let on_error = on_error.unwrap_or_else(|| Box::new(Err::<Value, CurlError>));

        let engine = self.proxy.handle().engine();
        let raw = self.proxy.handle().raw();

        for callback in [read, write, header].into_iter().flatten() {
            let name = callback.name();
            if let Err(e) = engine.set_callback(raw, callback) {
                error!(handle = %raw, callback = name, cause = %e, "failed to register callback");
                return on_error(CurlError::transfer(e)).map(Reply::Value);
            }
        }

        match engine.perform(raw) {
            Ok(()) => {
                debug!(handle = %raw, "transfer finished");
                Ok(Reply::This(self))
            }
            Err(e) => {
                error!(handle = %raw, cause = %e, "transfer failed");
                on_error(CurlError::transfer(e)).map(Reply::Value)
            }
        }
    }

    /// Posts `fields` as a multipart form.
    ///
    /// The form is only attached once every field is built; on failure the transfer's
    /// options are left as they were.
    ///
    /// # Errors
    /// - [`CurlError::UnsupportedFeature`] for a streamed upload field
    /// - [`CurlError::FormBuild`] if a part cannot be built or the form cannot be attached
    pub fn post<I, N, F>(&mut self, fields: I) -> Result<&mut Self, CurlError>
    where
        I: IntoIterator<Item = (N, F)>,
        N: Into<String>,
        F: Into<FormField>,
    {
        let form = Form::build(self.proxy.handle().engine_rc(), fields)?;
        let form_handle = form.handle().raw();

        if let Err(e) = self.proxy.dispatch("setopt_httppost", &[Value::Handle(form_handle)]) {
            error!(handle = %self.handle(), form = %form_handle, cause = %e, "failed to attach form");
            return Err(match e {
                CurlError::Transfer { source } => CurlError::form_build(source),
                other => other,
            });
        }

        debug!(handle = %self.handle(), form = %form_handle, parts = form.len(), "form attached");
        self.form = Some(form);
        Ok(self)
    }

    /// Shares the state cached by `share` with this transfer.
    ///
    /// `share` must outlive this transfer's use of it.
    pub fn setopt_share(&mut self, share: &Share<E>) -> Result<Reply<'_, Self>, CurlError> {
        let forwarded = self.proxy.dispatch("setopt_share", &[Value::Handle(share.handle())])?;
        Ok(forwarded.into_reply(self))
    }

    /// Selects the proxy protocol by its symbolic name, see [`ProxyType`].
    ///
    /// # Errors
    /// [`CurlError::UnsupportedValue`] if `name` is not a known proxy type
    pub fn setopt_proxytype(&mut self, name: &str) -> Result<Reply<'_, Self>, CurlError> {
        let proxy_type = name.parse::<ProxyType>()?;
        self.proxy_type(proxy_type)
    }

    pub fn proxy_type(&mut self, proxy_type: ProxyType) -> Result<Reply<'_, Self>, CurlError> {
        let code = self.proxy.handle().engine().proxy_type_code(proxy_type);
        let forwarded = self.proxy.dispatch("setopt_proxytype", &[Value::Int(code)])?;
        Ok(forwarded.into_reply(self))
    }
}

/// Callbacks and error hook for [`Easy::perform`].
#[derive(Default)]
pub struct PerformOptions {
    read: Option<Callback>,
    write: Option<Callback>,
    header: Option<Callback>,
    on_error: Option<ErrorHook>,
}

impl PerformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_function<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut [u8]) -> usize + 'static,
    {
        self.read = Some(Callback::Read(Box::new(f)));
        self
    }

    pub fn write_function<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8]) -> usize + 'static,
    {
        self.write = Some(Callback::Write(Box::new(f)));
        self
    }

    pub fn header_function<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8]) -> usize + 'static,
    {
        self.header = Some(Callback::Header(Box::new(f)));
        self
    }

    /// Sets the hook receiving any failure of the perform call
    pub fn error_function<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CurlError) -> Result<Value, CurlError> + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for PerformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformOptions")
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .field("header", &self.header.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// The proxy protocols a transfer can tunnel through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Http,
    Http1_0,
    Socks4,
    Socks5,
    Socks4a,
    Socks5Hostname,
}

impl ProxyType {
    pub const ALL: [ProxyType; 6] = [
        ProxyType::Http,
        ProxyType::Http1_0,
        ProxyType::Socks4,
        ProxyType::Socks5,
        ProxyType::Socks4a,
        ProxyType::Socks5Hostname,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProxyType::Http => "HTTP",
            ProxyType::Http1_0 => "HTTP_1_0",
            ProxyType::Socks4 => "SOCKS4",
            ProxyType::Socks5 => "SOCKS5",
            ProxyType::Socks4a => "SOCKS4A",
            ProxyType::Socks5Hostname => "SOCKS5_HOSTNAME",
        }
    }
}

impl FromStr for ProxyType {
    type Err = CurlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP" => Ok(ProxyType::Http),
            "HTTP_1_0" => Ok(ProxyType::Http1_0),
            "SOCKS4" => Ok(ProxyType::Socks4),
            "SOCKS5" => Ok(ProxyType::Socks5),
            "SOCKS4A" => Ok(ProxyType::Socks4a),
            "SOCKS5_HOSTNAME" => Ok(ProxyType::Socks5Hostname),
            _ => Err(CurlError::unsupported_value("PROXYTYPE", s)),
        }
    }
}
