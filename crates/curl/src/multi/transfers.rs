use super::pending::PendingEvents;
use super::{Event, EventKind, Multi};
use crate::engine::{Callback, Engine, RawHandle};
use crate::error::{CurlError, EngineError};
use bytes::Bytes;
use std::cell::RefCell;
use std::fmt;
use std::iter::FusedIterator;
use std::rc::Rc;
use tracing::{error, trace};
use TransfersState::*;

/// The iterator returned by [`Multi::perform`].
///
/// Yields `Ok(event)` until no attached transfer is running and every buffered event
/// has been handed out. An engine failure is yielded once as `Err` and ends the
/// iteration.
pub struct Transfers<'m, E: Engine> {
    multi: &'m mut Multi<E>,
    state: TransfersState,
    pending: Rc<RefCell<PendingEvents>>,
    remain: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransfersState {
    /// Nothing pulled yet, callbacks not installed
    Initializing,
    /// Handing out buffered events
    DrainingBuffer,
    /// Buffer empty, transfers still running
    AwaitingActivity,
    /// Finished or failed
    Exhausted,
}

impl<'m, E: Engine> Transfers<'m, E> {
    pub(super) fn new(multi: &'m mut Multi<E>) -> Self {
        Self { multi, state: Initializing, pending: Rc::new(RefCell::new(PendingEvents::default())), remain: 0 }
    }

    /// Routes the body and header chunks of every attached transfer into the buffer
    /// and performs once.
    fn start(&mut self) -> Result<(), EngineError> {
        let attached = self.multi.prune();
        let native = self.multi.native();
        let engine = native.engine();

        for &transfer in &attached {
            for callback in self.buffering_callbacks(transfer) {
                engine.set_callback(transfer, callback)?;
            }
            trace!(multi = %native.raw(), easy = %transfer, "installed buffering callbacks");
        }

        self.remain = attached.len();
        let running = engine.multi_perform(native.raw())?;
        trace!(multi = %native.raw(), attached = self.remain, running, "started transfers");
        Ok(())
    }

    fn buffering_callbacks(&self, transfer: RawHandle) -> [Callback; 2] {
        let body = Rc::clone(&self.pending);
        let header = Rc::clone(&self.pending);

        [
            Callback::Write(Box::new(move |chunk: &[u8]| {
                body.borrow_mut().push(transfer, EventKind::Data(Bytes::copy_from_slice(chunk)));
                chunk.len()
            })),
            Callback::Header(Box::new(move |chunk: &[u8]| {
                header.borrow_mut().push(transfer, EventKind::Header(Bytes::copy_from_slice(chunk)));
                chunk.len()
            })),
        ]
    }

    /// Waits for activity, performs, and buffers the completions of finished transfers.
    fn poll(&mut self) -> Result<(), EngineError> {
        let native = self.multi.native();
        let engine = native.engine();

        engine.multi_wait(native.raw(), self.multi.wait_timeout())?;
        let running = engine.multi_perform(native.raw())?;

        // the running count can only grow when a transfer was added meanwhile
        if running <= self.remain {
            while let Some(completion) = engine.multi_info_read(native.raw())? {
                let kind = match completion.result {
                    Ok(()) => EventKind::Done,
                    Err(e) => EventKind::Error(e),
                };
                trace!(multi = %native.raw(), easy = %completion.handle, kind = kind.as_str(), "transfer finished");
                self.pending.borrow_mut().push(completion.handle, kind);
            }
        }

        trace!(multi = %native.raw(), remain = self.remain, running, "performed");
        self.remain = running;
        Ok(())
    }

    fn fail(&mut self, e: EngineError) -> CurlError {
        error!(multi = %self.multi.handle(), cause = %e, "driving transfers failed");
        self.state = Exhausted;
        CurlError::transfer(e)
    }
}

impl<E: Engine> Iterator for Transfers<'_, E> {
    type Item = Result<Event, CurlError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.state = match self.state {
                Initializing => match self.start() {
                    Ok(()) => DrainingBuffer,
                    Err(e) => return Some(Err(self.fail(e))),
                },

                DrainingBuffer => {
                    if let Some(event) = self.pending.borrow_mut().pop() {
                        return Some(Ok(event));
                    }

                    if self.remain == 0 { Exhausted } else { AwaitingActivity }
                }

                AwaitingActivity => match self.poll() {
                    Ok(()) => DrainingBuffer,
                    Err(e) => return Some(Err(self.fail(e))),
                },

                Exhausted => {
                    trace!(multi = %self.multi.handle(), "transfers exhausted");
                    return None;
                }
            };
        }
    }
}

impl<E: Engine> FusedIterator for Transfers<'_, E> {}

impl<E: Engine> fmt::Debug for Transfers<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfers")
            .field("multi", &self.multi.handle())
            .field("state", &self.state)
            .field("pending", &self.pending.borrow().len())
            .field("remain", &self.remain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Curl;
    use crate::engine::{Completion, HandleKind, MockEngine};
    use crate::testing::{ScriptedEngine, Step};
    use mockall::Sequence;
    use mockall::predicate::eq;

    const MULTI: RawHandle = RawHandle::new(100);
    const EASY: RawHandle = RawHandle::new(1);

    fn kinds(events: &[Event]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind.as_str()).collect()
    }

    #[test]
    fn test_one_chunk_each() {
        let curl = Curl::new(ScriptedEngine::new());
        let transfers: Vec<_> = (0..3).map(|_| curl.easy().unwrap()).collect();
        for (i, easy) in transfers.iter().enumerate() {
            curl.engine().script(easy.id(), [Step::data(format!("body {i}")), Step::done()]);
        }

        let mut multi = curl.multi().unwrap();
        for easy in &transfers {
            multi.add(easy).unwrap();
        }

        let events: Vec<Event> = multi.perform().collect::<Result<_, _>>().unwrap();
        assert_eq!(kinds(&events), ["data", "data", "data", "done", "done", "done"]);

        for easy in &transfers {
            let own: Vec<_> = events.iter().filter(|e| e.transfer == easy.id()).collect();
            assert_eq!(own.len(), 2);
            assert!(own[0].kind.is_data());
            assert_eq!(own[1].kind, EventKind::Done);
        }
    }

    #[test]
    fn test_order_within_transfer_preserved() {
        let curl = Curl::new(ScriptedEngine::new());
        let slow = curl.easy().unwrap();
        let fast = curl.easy().unwrap();
        curl.engine().script(slow.id(), [Step::header("HTTP/1.1 200 OK\r\n"), Step::data("a"), Step::data("b"), Step::data("c"), Step::done()]);
        curl.engine().script(fast.id(), [Step::data("x"), Step::fail(EngineError::new(56, "recv failure"))]);

        let mut multi = curl.multi().unwrap();
        multi.add(&slow).unwrap().add(&fast).unwrap();

        let events: Vec<Event> = multi.perform().collect::<Result<_, _>>().unwrap();

        let slow_events: Vec<_> = events.iter().filter(|e| e.transfer == slow.id()).map(|e| e.kind.clone()).collect();
        assert_eq!(
            slow_events,
            [
                EventKind::Header(Bytes::from_static(b"HTTP/1.1 200 OK\r\n")),
                EventKind::Data(Bytes::from_static(b"a")),
                EventKind::Data(Bytes::from_static(b"b")),
                EventKind::Data(Bytes::from_static(b"c")),
                EventKind::Done,
            ]
        );

        let fast_events: Vec<_> = events.iter().filter(|e| e.transfer == fast.id()).map(|e| e.kind.clone()).collect();
        assert_eq!(fast_events, [EventKind::Data(Bytes::from_static(b"x")), EventKind::Error(EngineError::new(56, "recv failure"))]);
    }

    #[test]
    fn test_exhausted_then_fresh_pass() {
        let curl = Curl::new(ScriptedEngine::new());
        let easy = curl.easy().unwrap();
        curl.engine().script(easy.id(), [Step::data("once"), Step::done()]);

        let mut multi = curl.multi().unwrap();
        multi.add(&easy).unwrap();

        let mut transfers = multi.perform();
        assert_eq!(transfers.by_ref().count(), 2);
        assert!(transfers.next().is_none());
        assert!(transfers.next().is_none());
        drop(transfers);

        curl.engine().script(easy.id(), [Step::data("again"), Step::done()]);
        let events: Vec<Event> = multi.perform().collect::<Result<_, _>>().unwrap();
        assert_eq!(events.first().and_then(|e| e.kind.as_bytes()), Some(&Bytes::from_static(b"again")));
        assert_eq!(kinds(&events), ["data", "done"]);
    }

    #[test]
    fn test_nothing_attached() {
        let curl = Curl::new(ScriptedEngine::new());
        let mut multi = curl.multi().unwrap();
        assert!(multi.perform().next().is_none());
        assert_eq!(curl.engine().count("multi_perform"), 1);
        assert_eq!(curl.engine().count("multi_wait"), 0);
    }

    #[test]
    fn test_lazy_until_first_pull() {
        let curl = Curl::new(ScriptedEngine::new());
        let easy = curl.easy().unwrap();
        curl.engine().script(easy.id(), [Step::data("a"), Step::done()]);

        let mut multi = curl.multi().unwrap();
        multi.add(&easy).unwrap();

        let mut transfers = multi.perform();
        assert_eq!(curl.engine().count("set_callback"), 0);
        assert_eq!(curl.engine().count("multi_perform"), 0);

        assert!(transfers.next().is_some());
        assert_eq!(curl.engine().count("set_callback"), 2);
        assert_eq!(curl.engine().count("multi_perform"), 1);
        assert_eq!(curl.engine().count("multi_wait"), 0);
    }

    #[test]
    fn test_wait_failure_ends_iteration() {
        let curl = Curl::new(ScriptedEngine::new());
        let easy = curl.easy().unwrap();
        curl.engine().script(easy.id(), [Step::data("a"), Step::data("b"), Step::done()]);
        curl.engine().fail_next("multi_wait", EngineError::new(12, "bad socket"));

        let mut multi = curl.multi().unwrap();
        multi.add(&easy).unwrap();

        let mut transfers = multi.perform();
        assert!(matches!(transfers.next(), Some(Ok(Event { kind: EventKind::Data(_), .. }))));
        assert!(matches!(transfers.next(), Some(Err(CurlError::Transfer { source })) if source.code() == 12));
        assert!(transfers.next().is_none());
    }

    #[test]
    fn test_callback_install_failure() {
        let curl = Curl::new(ScriptedEngine::new());
        let easy = curl.easy().unwrap();
        curl.engine().fail_next("set_callback", EngineError::new(48, "unknown option"));

        let mut multi = curl.multi().unwrap();
        multi.add(&easy).unwrap();

        let mut transfers = multi.perform();
        assert!(matches!(transfers.next(), Some(Err(CurlError::Transfer { .. }))));
        assert!(transfers.next().is_none());
        assert_eq!(curl.engine().count("multi_perform"), 0);
    }

    #[test]
    fn test_removed_transfer_not_driven() {
        let curl = Curl::new(ScriptedEngine::new());
        let kept = curl.easy().unwrap();
        let removed = curl.easy().unwrap();
        curl.engine().script(kept.id(), [Step::data("kept"), Step::done()]);
        curl.engine().script(removed.id(), [Step::data("removed"), Step::done()]);

        let mut multi = curl.multi().unwrap();
        multi.add(&kept).unwrap().add(&removed).unwrap().remove(&removed).unwrap();

        let events: Vec<Event> = multi.perform().collect::<Result<_, _>>().unwrap();
        assert!(events.iter().all(|e| e.transfer == kept.id()));
        assert_eq!(kinds(&events), ["data", "done"]);
    }

    #[test]
    fn test_dropped_transfer_not_driven() {
        let curl = Curl::new(ScriptedEngine::new());
        let kept = curl.easy().unwrap();
        let gone = curl.easy().unwrap();
        let gone_id = gone.id();
        curl.engine().script(kept.id(), [Step::data("kept"), Step::done()]);

        let mut multi = curl.multi().unwrap();
        multi.add(&gone).unwrap().add(&kept).unwrap();
        drop(gone);
        assert_eq!(multi.len(), 1);

        let events: Vec<Event> = multi.perform().collect::<Result<_, _>>().unwrap();
        assert!(events.iter().all(|e| e.transfer == kept.id()));
        assert_eq!(kinds(&events), ["data", "done"]);
        assert_eq!(curl.engine().released(), [gone_id]);
    }

    fn mock_engine() -> MockEngine {
        let mut engine = MockEngine::new();
        engine.expect_operations().returning(|_| vec![]);
        engine.expect_create().with(eq(HandleKind::Multi)).returning(|_| Ok(MULTI));
        engine.expect_create().with(eq(HandleKind::Easy)).returning(|_| Ok(EASY));
        engine.expect_release().return_const(());
        engine.expect_multi_add().returning(|_, _| Ok(()));
        engine.expect_set_callback().returning(|_, _| Ok(()));
        engine
    }

    #[test]
    fn test_rising_running_count_defers_completions() {
        let mut engine = mock_engine();
        engine.expect_multi_wait().returning(|_, _| Ok(1));

        let mut seq = Sequence::new();
        engine.expect_multi_perform().times(1).in_sequence(&mut seq).returning(|_| Ok(1));
        // more running than expected: completions are left for a later round
        engine.expect_multi_perform().times(1).in_sequence(&mut seq).returning(|_| Ok(2));
        engine.expect_multi_perform().times(1).in_sequence(&mut seq).returning(|_| Ok(2));
        engine.expect_multi_info_read().times(1).in_sequence(&mut seq).returning(|_| Ok(Some(Completion::done(EASY))));
        engine.expect_multi_info_read().times(1).in_sequence(&mut seq).returning(|_| Ok(None));
        engine.expect_multi_perform().times(1).in_sequence(&mut seq).returning(|_| Ok(0));
        engine.expect_multi_info_read().times(1).in_sequence(&mut seq).returning(|_| Ok(None));

        let curl = Curl::new(engine);
        let easy = curl.easy().unwrap();
        let mut multi = curl.multi().unwrap();
        multi.add(&easy).unwrap();

        let mut transfers = multi.perform();
        assert_eq!(transfers.next().unwrap().unwrap(), Event::new(EASY, EventKind::Done));
        assert_eq!(transfers.remain, 2);
        assert!(transfers.next().is_none());
        assert_eq!(transfers.remain, 0);
    }

    #[test]
    fn test_info_read_failure_ends_iteration() {
        let mut engine = mock_engine();
        engine.expect_multi_wait().returning(|_, _| Ok(1));

        let mut seq = Sequence::new();
        engine.expect_multi_perform().times(1).in_sequence(&mut seq).returning(|_| Ok(1));
        engine.expect_multi_perform().times(1).in_sequence(&mut seq).returning(|_| Ok(0));
        engine.expect_multi_info_read().times(1).in_sequence(&mut seq).returning(|_| Ok(Some(Completion::done(EASY))));
        engine.expect_multi_info_read().times(1).in_sequence(&mut seq).returning(|_| Err(EngineError::new(2, "bad info")));

        let curl = Curl::new(engine);
        let easy = curl.easy().unwrap();
        let mut multi = curl.multi().unwrap();
        multi.add(&easy).unwrap();

        let mut transfers = multi.perform();
        assert!(matches!(transfers.next(), Some(Err(CurlError::Transfer { source })) if source.code() == 2));
        assert!(transfers.next().is_none());
    }

    #[test]
    fn test_eager_perform_failure_ends_iteration() {
        let mut engine = mock_engine();
        engine.expect_multi_perform().times(1).returning(|_| Err(EngineError::new(3, "bad handle")));
        engine.expect_multi_wait().never();
        engine.expect_multi_info_read().never();

        let curl = Curl::new(engine);
        let easy = curl.easy().unwrap();
        let mut multi = curl.multi().unwrap();
        multi.add(&easy).unwrap();

        let mut transfers = multi.perform();
        assert!(matches!(transfers.next(), Some(Err(CurlError::Transfer { source })) if source.code() == 3));
        assert!(transfers.next().is_none());
        assert!(transfers.next().is_none());
    }
}
