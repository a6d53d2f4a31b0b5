//! Table of calls waiting for a response and/or a callback frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tracing::trace;
use zwprims_frame::Frame;

use crate::callback::CallbackIds;
use crate::error::{Result, SessionError};
use crate::session::{CallOutcome, Expect};

type Slot = oneshot::Sender<Result<CallOutcome>>;

/// What the caller gets back from [`PendingTable::register`].
pub(crate) struct Registration {
    pub(crate) seq: u64,
    pub(crate) callback_id: Option<u8>,
    pub(crate) outcome: oneshot::Receiver<Result<CallOutcome>>,
}

struct PendingCall {
    function_id: u8,
    callback_id: Option<u8>,
    expect: Expect,
    finish_on_response: Option<fn(&Frame) -> bool>,
    response: Option<Frame>,
    callback: Option<Frame>,
    slot: Slot,
    /// Held until the Response arrives or the call leaves the table.
    turn: Option<OwnedSemaphorePermit>,
}

impl PendingCall {
    fn awaits_response(&self) -> bool {
        self.expect.wants_response() && self.response.is_none()
    }

    fn awaits_callback(&self) -> bool {
        self.expect.wants_callback() && self.callback.is_none()
    }

    fn is_complete(&self) -> bool {
        !self.awaits_response() && !self.awaits_callback()
    }
}

#[derive(Default)]
struct Table {
    calls: HashMap<u64, PendingCall>,
    next_seq: u64,
    ids: CallbackIds,
    closed: bool,
}

impl Table {
    fn outstanding(&self, callback_id: u8) -> bool {
        self.calls
            .values()
            .any(|call| call.callback_id == Some(callback_id))
    }

    fn complete(&mut self, seq: u64) {
        if let Some(call) = self.calls.remove(&seq) {
            let outcome = CallOutcome {
                response: call.response,
                callback: call.callback,
            };
            let _ = call.slot.send(Ok(outcome));
        }
    }
}

/// Pending calls keyed by issue order. The lock is held only for
/// insert, resolve and removal; never across an await.
#[derive(Default)]
pub(crate) struct PendingTable {
    inner: Mutex<Table>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a call, assigning a callback id when it expects one.
    ///
    /// An explicit `requested_id` that is already outstanding is rejected,
    /// never overwritten.
    pub(crate) fn register(
        &self,
        function_id: u8,
        expect: Expect,
        requested_id: Option<u8>,
        finish_on_response: Option<fn(&Frame) -> bool>,
        turn: Option<OwnedSemaphorePermit>,
    ) -> Result<Registration> {
        let mut table = self.lock();
        if table.closed {
            return Err(SessionError::TransportClosed);
        }

        let callback_id = if expect.wants_callback() {
            let id = match requested_id {
                Some(id) if table.outstanding(id) => {
                    return Err(SessionError::DuplicateCallbackId(id));
                }
                Some(id) => id,
                None => {
                    let Table { calls, ids, .. } = &mut *table;
                    ids.allocate(|id| calls.values().any(|call| call.callback_id == Some(id)))
                        .ok_or(SessionError::CallbackIdsExhausted)?
                }
            };
            Some(id)
        } else {
            None
        };

        let seq = table.next_seq;
        table.next_seq += 1;
        let (slot, outcome) = oneshot::channel();
        table.calls.insert(
            seq,
            PendingCall {
                function_id,
                callback_id,
                expect,
                finish_on_response,
                response: None,
                callback: None,
                slot,
                turn,
            },
        );
        Ok(Registration {
            seq,
            callback_id,
            outcome,
        })
    }

    /// Hand a response frame to the newest call awaiting one for its
    /// function. Returns false when no call claims it.
    pub(crate) fn resolve_response(&self, frame: &Frame) -> bool {
        let mut table = self.lock();
        let newest = table
            .calls
            .iter()
            .filter(|(_, call)| call.function_id == frame.function_id && call.awaits_response())
            .map(|(seq, _)| *seq)
            .max();
        let Some(seq) = newest else {
            return false;
        };

        let finished = match table.calls.get_mut(&seq) {
            Some(call) => {
                call.response = Some(frame.clone());
                call.turn = None;
                call.is_complete() || call.finish_on_response.is_some_and(|done| done(frame))
            }
            None => false,
        };
        if finished {
            table.complete(seq);
        }
        true
    }

    /// Hand a callback frame to the call registered under the id in its
    /// first payload byte. Returns false when no call claims it.
    pub(crate) fn resolve_callback(&self, frame: &Frame) -> bool {
        let Some(&callback_id) = frame.payload.first() else {
            return false;
        };
        let mut table = self.lock();
        let claimed = table.calls.iter_mut().find(|(_, call)| {
            call.callback_id == Some(callback_id)
                && call.function_id == frame.function_id
                && call.awaits_callback()
        });
        let Some((&seq, call)) = claimed else {
            return false;
        };

        call.callback = Some(frame.clone());
        if call.is_complete() {
            table.complete(seq);
        }
        true
    }

    /// Drop a call that timed out or failed to send.
    pub(crate) fn remove(&self, seq: u64) -> bool {
        self.lock().calls.remove(&seq).is_some()
    }

    /// Fail every pending call with `TransportClosed` and refuse new ones.
    pub(crate) fn close(&self) -> usize {
        let mut table = self.lock();
        table.closed = true;
        let drained = table.calls.len();
        for (_, call) in table.calls.drain() {
            let _ = call.slot.send(Err(SessionError::TransportClosed));
        }
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().calls.len()
    }
}

/// Drops its call from the table however the caller's future ends:
/// completion, error, timeout or cancellation.
pub(crate) struct PendingGuard {
    table: Arc<PendingTable>,
    seq: u64,
}

impl PendingGuard {
    pub(crate) fn new(table: Arc<PendingTable>, seq: u64) -> Self {
        Self { table, seq }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.table.remove(self.seq) {
            trace!(seq = self.seq, "abandoned call removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Semaphore;

    use super::*;

    fn rejected(frame: &Frame) -> bool {
        frame.payload.first() == Some(&0)
    }

    #[test]
    fn response_resolves_newest_matching_call() {
        let table = PendingTable::default();
        let mut older = table.register(0x15, Expect::Response, None, None, None).unwrap();
        let mut newer = table.register(0x15, Expect::Response, None, None, None).unwrap();

        assert!(table.resolve_response(&Frame::response(0x15, vec![0x01])));
        let outcome = newer.outcome.try_recv().unwrap().unwrap();
        assert_eq!(outcome.response.unwrap().payload.as_ref(), &[0x01]);
        assert!(older.outcome.try_recv().is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn response_for_other_function_is_unclaimed() {
        let table = PendingTable::default();
        let _call = table.register(0x15, Expect::Response, None, None, None).unwrap();
        assert!(!table.resolve_response(&Frame::response(0x20, vec![])));
    }

    #[test]
    fn both_parts_required_before_completion() {
        let table = PendingTable::default();
        let mut call = table
            .register(0x13, Expect::ResponseAndCallback, None, None, None)
            .unwrap();
        let id = call.callback_id.unwrap();

        assert!(table.resolve_response(&Frame::response(0x13, vec![0x01])));
        assert!(call.outcome.try_recv().is_err());

        assert!(table.resolve_callback(&Frame::request(0x13, vec![id, 0x00])));
        let outcome = call.outcome.try_recv().unwrap().unwrap();
        assert!(outcome.response.is_some());
        assert_eq!(outcome.callback.unwrap().payload.as_ref(), &[id, 0x00]);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn callback_before_response_waits_for_response() {
        let table = PendingTable::default();
        let mut call = table
            .register(0x13, Expect::ResponseAndCallback, None, None, None)
            .unwrap();
        let id = call.callback_id.unwrap();

        assert!(table.resolve_callback(&Frame::request(0x13, vec![id, 0x00])));
        assert!(call.outcome.try_recv().is_err());
        assert!(table.resolve_response(&Frame::response(0x13, vec![0x01])));
        assert!(call.outcome.try_recv().unwrap().is_ok());
    }

    #[test]
    fn finish_on_response_skips_callback() {
        let table = PendingTable::default();
        let mut call = table
            .register(0x13, Expect::ResponseAndCallback, None, Some(rejected), None)
            .unwrap();
        assert!(table.resolve_response(&Frame::response(0x13, vec![0x00])));
        let outcome = call.outcome.try_recv().unwrap().unwrap();
        assert!(outcome.callback.is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn turn_released_on_response_before_callback() {
        let gate = Arc::new(Semaphore::new(1));
        let table = PendingTable::default();
        let turn = gate.clone().try_acquire_owned().unwrap();
        let mut call = table
            .register(0x13, Expect::ResponseAndCallback, None, None, Some(turn))
            .unwrap();
        assert_eq!(gate.available_permits(), 0);

        assert!(table.resolve_response(&Frame::response(0x13, vec![0x01])));
        assert_eq!(gate.available_permits(), 1);
        assert!(call.outcome.try_recv().is_err());
    }

    #[test]
    fn guard_removes_abandoned_call_and_frees_its_turn() {
        let gate = Arc::new(Semaphore::new(1));
        let table = Arc::new(PendingTable::default());
        let turn = gate.clone().try_acquire_owned().unwrap();
        let call = table
            .register(0x13, Expect::ResponseAndCallback, Some(4), None, Some(turn))
            .unwrap();

        drop(PendingGuard::new(table.clone(), call.seq));
        assert_eq!(table.len(), 0);
        assert_eq!(gate.available_permits(), 1);
        table
            .register(0x13, Expect::Callback, Some(4), None, None)
            .unwrap();
    }

    #[test]
    fn unknown_callback_id_is_unclaimed() {
        let table = PendingTable::default();
        let call = table.register(0x13, Expect::Callback, None, None, None).unwrap();
        let other = call.callback_id.unwrap().wrapping_add(1);
        assert!(!table.resolve_callback(&Frame::request(0x13, vec![other])));
        assert!(!table.resolve_callback(&Frame::request(0x13, vec![])));
    }

    #[test]
    fn duplicate_callback_id_rejected() {
        let table = PendingTable::default();
        table.register(0x13, Expect::Callback, Some(7), None, None).unwrap();
        assert!(matches!(
            table.register(0x13, Expect::Callback, Some(7), None, None),
            Err(SessionError::DuplicateCallbackId(7))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn ids_exhausted_when_every_id_is_outstanding() {
        let table = PendingTable::default();
        let calls: Vec<_> = (0..255)
            .map(|_| table.register(0x13, Expect::Callback, None, None, None).unwrap())
            .collect();
        assert!(matches!(
            table.register(0x13, Expect::Callback, None, None, None),
            Err(SessionError::CallbackIdsExhausted)
        ));

        assert!(table.remove(calls[10].seq));
        let reused = table.register(0x13, Expect::Callback, None, None, None).unwrap();
        assert_eq!(reused.callback_id, calls[10].callback_id);
    }

    #[test]
    fn close_fails_everything_and_refuses_new_calls() {
        let table = PendingTable::default();
        let mut first = table.register(0x15, Expect::Response, None, None, None).unwrap();
        let mut second = table.register(0x13, Expect::Callback, None, None, None).unwrap();

        assert_eq!(table.close(), 2);
        assert!(matches!(
            first.outcome.try_recv().unwrap(),
            Err(SessionError::TransportClosed)
        ));
        assert!(matches!(
            second.outcome.try_recv().unwrap(),
            Err(SessionError::TransportClosed)
        ));
        assert!(matches!(
            table.register(0x15, Expect::Response, None, None, None),
            Err(SessionError::TransportClosed)
        ));
    }
}
