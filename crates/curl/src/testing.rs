//! A scripted in-memory [`Engine`].
//!
//! [`ScriptedEngine`] does not touch the network. Each transfer plays back a script of
//! [`Step`]s: a single [`Engine::perform`] runs the whole script, while every
//! [`Engine::multi_perform`] advances each running attached transfer by one step.
//! Unscripted transfers complete on their first step.
//!
//! Besides playback the engine records what it was asked to do, so tests can check
//! the options set on a handle, the parts of a form, or how often an operation ran.

use crate::easy::ProxyType;
use crate::engine::{Callback, Completion, Engine, FormPart, HandleKind, RawHandle, Value};
use crate::error::EngineError;
use crate::share::ShareKind;
use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

const BAD_HANDLE: i32 = 43;
const WRITE_ERROR: i32 = 23;
const READ_ERROR: i32 = 26;
const ADDED_ALREADY: i32 = 7;

const EASY_OPERATIONS: &[&str] = &[
    "setopt_url",
    "setopt_followlocation",
    "setopt_httpheader",
    "setopt_postfields",
    "setopt_timeout",
    "getinfo_response_code",
    "getinfo_effective_url",
    "reset",
];
const MULTI_OPERATIONS: &[&str] = &["setopt_maxconnects", "setopt_pipelining", "timeout"];
const SHARE_OPERATIONS: &[&str] = &["setopt_unshare"];

/// One step of a scripted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Delivers a body chunk to the write callback
    Data(Bytes),
    /// Delivers a header chunk to the header callback
    Header(Bytes),
    /// Asks the read callback for up to this many bytes of upload data
    Read(usize),
    /// Completes the transfer
    Done,
    /// Fails the transfer
    Fail(EngineError),
}

impl Step {
    pub fn data<B: Into<Bytes>>(chunk: B) -> Self {
        Step::Data(chunk.into())
    }

    pub fn header<B: Into<Bytes>>(chunk: B) -> Self {
        Step::Header(chunk.into())
    }

    pub fn read(len: usize) -> Self {
        Step::Read(len)
    }

    pub fn done() -> Self {
        Step::Done
    }

    pub fn fail(error: EngineError) -> Self {
        Step::Fail(error)
    }
}

#[derive(Default)]
struct Transfer {
    steps: VecDeque<Step>,
    finished: bool,
    read: Option<Callback>,
    write: Option<Callback>,
    header: Option<Callback>,
    uploaded: BytesMut,
}

impl Transfer {
    fn slot(&mut self, slot: Slot) -> &mut Option<Callback> {
        match slot {
            Slot::Read => &mut self.read,
            Slot::Write => &mut self.write,
            Slot::Header => &mut self.header,
        }
    }
}

#[derive(Debug, Default)]
struct MultiState {
    attached: Vec<RawHandle>,
    completions: VecDeque<Completion>,
}

#[derive(Debug, Copy, Clone)]
enum Slot {
    Read,
    Write,
    Header,
}

#[derive(Default)]
struct State {
    next_id: u64,
    kinds: HashMap<RawHandle, HandleKind>,
    transfers: HashMap<RawHandle, Transfer>,
    multis: HashMap<RawHandle, MultiState>,
    forms: HashMap<RawHandle, Vec<FormPart>>,
    options: HashMap<RawHandle, Vec<(String, Vec<Value>)>>,
    infos: HashMap<(RawHandle, String), Value>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, EngineError>,
    released: Vec<RawHandle>,
}

impl State {
    fn check(&mut self, op: &'static str) -> Result<(), EngineError> {
        *self.calls.entry(op).or_default() += 1;
        self.failures.remove(op).map_or(Ok(()), Err)
    }

    fn expect_kind(&self, handle: RawHandle, kind: HandleKind) -> Result<(), EngineError> {
        match self.kinds.get(&handle) {
            Some(k) if *k == kind => Ok(()),
            _ => Err(EngineError::new(BAD_HANDLE, format!("{handle} is not a live {} handle", kind.as_str()))),
        }
    }

    fn multi(&mut self, multi: RawHandle) -> Result<&mut MultiState, EngineError> {
        self.expect_kind(multi, HandleKind::Multi)?;
        self.multis.get_mut(&multi).ok_or_else(|| EngineError::new(BAD_HANDLE, "unknown multi handle"))
    }
}

/// The scripted engine, see the [module documentation](self).
#[derive(Default)]
pub struct ScriptedEngine {
    state: RefCell<State>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the script of a transfer and marks it running again.
    pub fn script<I: IntoIterator<Item = Step>>(&self, easy: RawHandle, steps: I) {
        let mut state = self.state.borrow_mut();
        let transfer = state.transfers.entry(easy).or_default();
        transfer.steps = steps.into_iter().collect();
        transfer.finished = false;
    }

    /// Makes the next call of `op` fail with `error`.
    ///
    /// `op` is the name of the [`Engine`] method, e.g. `"multi_wait"`.
    pub fn fail_next(&self, op: &'static str, error: EngineError) {
        self.state.borrow_mut().failures.insert(op, error);
    }

    /// Sets the value answered by a `getinfo_*` operation.
    pub fn set_info(&self, handle: RawHandle, name: &str, value: Value) {
        self.state.borrow_mut().infos.insert((handle, name.to_owned()), value);
    }

    /// How many times the [`Engine`] method `op` was called
    pub fn count(&self, op: &str) -> usize {
        self.state.borrow().calls.get(op).copied().unwrap_or_default()
    }

    /// The `setopt_*` calls made on `handle`, in order
    pub fn options(&self, handle: RawHandle) -> Vec<(String, Vec<Value>)> {
        self.state.borrow().options.get(&handle).cloned().unwrap_or_default()
    }

    /// The arguments of the last `name` option set on `handle`
    pub fn option(&self, handle: RawHandle, name: &str) -> Option<Vec<Value>> {
        self.state.borrow().options.get(&handle)?.iter().rev().find(|(n, _)| n == name).map(|(_, args)| args.clone())
    }

    /// The parts added to a form handle
    pub fn form_parts(&self, form: RawHandle) -> Vec<FormPart> {
        self.state.borrow().forms.get(&form).cloned().unwrap_or_default()
    }

    /// The bytes a transfer's read callback supplied
    pub fn uploaded(&self, easy: RawHandle) -> Bytes {
        self.state.borrow().transfers.get(&easy).map(|t| Bytes::copy_from_slice(&t.uploaded)).unwrap_or_default()
    }

    /// Returns true if `handle` was created and not released yet
    pub fn is_live(&self, handle: RawHandle) -> bool {
        self.state.borrow().kinds.contains_key(&handle)
    }

    /// Every handle released so far, in release order
    pub fn released(&self) -> Vec<RawHandle> {
        self.state.borrow().released.clone()
    }

    /// Runs the next step of a transfer, returns its result once it finished.
    fn advance(&self, easy: RawHandle) -> Option<Result<(), EngineError>> {
        let step = {
            let mut state = self.state.borrow_mut();
            let transfer = state.transfers.entry(easy).or_default();
            transfer.steps.pop_front().unwrap_or(Step::Done)
        };

        let outcome = match step {
            Step::Data(chunk) => self.deliver(easy, Slot::Write, &chunk).err().map(Err),
            Step::Header(chunk) => self.deliver(easy, Slot::Header, &chunk).err().map(Err),
            Step::Read(len) => self.upload(easy, len).err().map(Err),
            Step::Done => Some(Ok(())),
            Step::Fail(e) => Some(Err(e)),
        };

        if outcome.is_some() {
            self.state.borrow_mut().transfers.entry(easy).or_default().finished = true;
        }
        outcome
    }

    /// Hands a chunk to a write or header callback. Without callback the chunk is dropped.
    fn deliver(&self, easy: RawHandle, slot: Slot, chunk: &[u8]) -> Result<(), EngineError> {
        let Some(mut callback) = self.take_callback(easy, slot) else {
            return Ok(());
        };

        let written = match &mut callback {
            Callback::Write(f) | Callback::Header(f) => f(chunk),
            Callback::Read(_) => chunk.len(),
        };
        self.put_callback(easy, slot, callback);

        if written == chunk.len() {
            Ok(())
        } else {
            Err(EngineError::new(WRITE_ERROR, "failure writing output to destination"))
        }
    }

    fn upload(&self, easy: RawHandle, len: usize) -> Result<(), EngineError> {
        let Some(mut callback) = self.take_callback(easy, Slot::Read) else {
            return Ok(());
        };

        let mut buf = vec![0; len];
        let read = match &mut callback {
            Callback::Read(f) => f(buf.as_mut_slice()),
            Callback::Write(_) | Callback::Header(_) => 0,
        };
        self.put_callback(easy, Slot::Read, callback);

        if read > len {
            return Err(EngineError::new(READ_ERROR, "read function returned too much data"));
        }
        let mut state = self.state.borrow_mut();
        state.transfers.entry(easy).or_default().uploaded.extend_from_slice(&buf[..read]);
        Ok(())
    }

    // callbacks run with the state unborrowed
    fn take_callback(&self, easy: RawHandle, slot: Slot) -> Option<Callback> {
        self.state.borrow_mut().transfers.get_mut(&easy)?.slot(slot).take()
    }

    fn put_callback(&self, easy: RawHandle, slot: Slot, callback: Callback) {
        let mut state = self.state.borrow_mut();
        let current = state.transfers.entry(easy).or_default().slot(slot);
        // a callback registered while this one ran wins
        if current.is_none() {
            *current = Some(callback);
        }
    }

    fn running(&self, multi: RawHandle) -> usize {
        let state = self.state.borrow();
        state.multis.get(&multi).map_or(0, |m| {
            m.attached.iter().filter(|easy| state.transfers.get(easy).is_none_or(|t| !t.finished)).count()
        })
    }
}

impl Engine for ScriptedEngine {
    fn version(&self) -> String {
        format!("micro-curl-scripted/{}", env!("CARGO_PKG_VERSION"))
    }

    fn create(&self, kind: HandleKind) -> Result<RawHandle, EngineError> {
        let mut state = self.state.borrow_mut();
        state.check("create")?;
        state.next_id += 1;
        let handle = RawHandle::new(state.next_id);
        state.kinds.insert(handle, kind);
        match kind {
            HandleKind::Easy => {
                state.transfers.insert(handle, Transfer::default());
            }
            HandleKind::Multi => {
                state.multis.insert(handle, MultiState::default());
            }
            HandleKind::Form => {
                state.forms.insert(handle, Vec::new());
            }
            HandleKind::Share => {}
        }
        Ok(handle)
    }

    fn release(&self, handle: RawHandle) {
        let mut state = self.state.borrow_mut();
        *state.calls.entry("release").or_default() += 1;
        state.kinds.remove(&handle);
        state.transfers.remove(&handle);
        state.multis.remove(&handle);
        for multi in state.multis.values_mut() {
            multi.attached.retain(|easy| *easy != handle);
        }
        state.released.push(handle);
    }

    fn operations(&self, kind: HandleKind) -> Vec<String> {
        let operations = match kind {
            HandleKind::Easy => EASY_OPERATIONS,
            HandleKind::Multi => MULTI_OPERATIONS,
            HandleKind::Share => SHARE_OPERATIONS,
            HandleKind::Form => &[],
        };
        operations.iter().map(|op| (*op).to_owned()).collect()
    }

    fn call(&self, handle: RawHandle, name: &str, args: &[Value]) -> Result<Value, EngineError> {
        let mut state = self.state.borrow_mut();
        state.check("call")?;
        if !state.kinds.contains_key(&handle) {
            return Err(EngineError::new(BAD_HANDLE, format!("{handle} is not a live handle")));
        }

        if name.starts_with("setopt_") {
            state.options.entry(handle).or_default().push((name.to_owned(), args.to_vec()));
            return Ok(Value::Handle(handle));
        }

        if name.starts_with("getinfo_") {
            return Ok(state.infos.get(&(handle, name.to_owned())).cloned().unwrap_or_default());
        }

        Ok(Value::Nil)
    }

    fn set_callback(&self, handle: RawHandle, callback: Callback) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.check("set_callback")?;
        state.expect_kind(handle, HandleKind::Easy)?;

        let slot = match callback {
            Callback::Read(_) => Slot::Read,
            Callback::Write(_) => Slot::Write,
            Callback::Header(_) => Slot::Header,
        };
        *state.transfers.entry(handle).or_default().slot(slot) = Some(callback);
        Ok(())
    }

    fn perform(&self, handle: RawHandle) -> Result<(), EngineError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("perform")?;
            state.expect_kind(handle, HandleKind::Easy)?;
        }

        loop {
            if let Some(result) = self.advance(handle) {
                return result;
            }
        }
    }

    fn proxy_type_code(&self, proxy_type: ProxyType) -> i64 {
        match proxy_type {
            ProxyType::Http => 0,
            ProxyType::Http1_0 => 1,
            ProxyType::Socks4 => 4,
            ProxyType::Socks5 => 5,
            ProxyType::Socks4a => 6,
            ProxyType::Socks5Hostname => 7,
        }
    }

    fn lock_data_code(&self, kind: ShareKind) -> i64 {
        match kind {
            ShareKind::Cookie => 2,
            ShareKind::Dns => 3,
            ShareKind::SslSession => 4,
        }
    }

    fn multi_add(&self, multi: RawHandle, easy: RawHandle) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.check("multi_add")?;
        state.expect_kind(easy, HandleKind::Easy)?;
        let multi = state.multi(multi)?;
        if multi.attached.contains(&easy) {
            return Err(EngineError::new(ADDED_ALREADY, "easy handle already added to a multi handle"));
        }
        multi.attached.push(easy);
        Ok(())
    }

    fn multi_remove(&self, multi: RawHandle, easy: RawHandle) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.check("multi_remove")?;
        state.multi(multi)?.attached.retain(|attached| *attached != easy);
        Ok(())
    }

    fn multi_perform(&self, multi: RawHandle) -> Result<usize, EngineError> {
        let attached = {
            let mut state = self.state.borrow_mut();
            state.check("multi_perform")?;
            let attached = state.multi(multi)?.attached.clone();
            attached.into_iter().filter(|easy| state.transfers.get(easy).is_none_or(|t| !t.finished)).collect::<Vec<_>>()
        };

        for easy in attached {
            if let Some(result) = self.advance(easy) {
                let completion = Completion { handle: easy, result };
                self.state.borrow_mut().multi(multi)?.completions.push_back(completion);
            }
        }

        Ok(self.running(multi))
    }

    fn multi_wait(&self, multi: RawHandle, _timeout: Option<Duration>) -> Result<usize, EngineError> {
        {
            let mut state = self.state.borrow_mut();
            state.check("multi_wait")?;
            state.multi(multi)?;
        }
        Ok(self.running(multi))
    }

    fn multi_info_read(&self, multi: RawHandle) -> Result<Option<Completion>, EngineError> {
        let mut state = self.state.borrow_mut();
        state.check("multi_info_read")?;
        Ok(state.multi(multi)?.completions.pop_front())
    }

    fn form_add(&self, form: RawHandle, part: &FormPart) -> Result<(), EngineError> {
        let mut state = self.state.borrow_mut();
        state.check("form_add")?;
        state.expect_kind(form, HandleKind::Form)?;
        state.forms.entry(form).or_default().push(part.clone());
        Ok(())
    }
}

impl fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ScriptedEngine")
            .field("live", &state.kinds.len())
            .field("released", &state.released.len())
            .finish()
    }
}
