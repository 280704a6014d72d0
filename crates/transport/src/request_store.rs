//! Tracking in-flight requests and matching responses
//!
//! Each outstanding request owns a single-slot result holder. The holder is filled exactly
//! once: by the matching response, or with [`Error::RequestAbandoned`] when the client
//! stops first.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::message::{Response, Seq};

pub(crate) struct WaitingRequest {
    pub(crate) command: String,
    pub(crate) tx: oneshot::Sender<Result<Response>>,
}

#[derive(Default)]
pub(crate) struct RequestStore {
    pending: Mutex<HashMap<Seq, WaitingRequest>>,
}

impl RequestStore {
    pub(crate) fn insert(&self, seq: Seq, waiting: WaitingRequest) {
        with_lock("RequestStore.pending", &self.pending, |mut pending| {
            if let Some(previous) = pending.insert(seq, waiting) {
                // sequence numbers come from a monotonic counter so this means a bug upstream
                tracing::error!(seq, command = %previous.command, "sequence number reused");
            }
        });
    }

    pub(crate) fn remove(&self, seq: Seq) -> Option<WaitingRequest> {
        with_lock("RequestStore.pending", &self.pending, |mut pending| {
            pending.remove(&seq)
        })
    }

    /// Route `response` to its waiter, handing it back if nobody is waiting for it
    pub(crate) fn complete(&self, response: Response) -> std::result::Result<(), Response> {
        let Some(WaitingRequest { command, tx }) = self.remove(response.request_seq) else {
            return Err(response);
        };

        let seq = response.request_seq;
        let result = if response.success {
            Ok(response)
        } else {
            Err(Error::RequestFailed {
                command,
                seq,
                message: response.message,
            })
        };
        if tx.send(result).is_err() {
            tracing::debug!(seq, "requester went away before the response arrived");
        }
        Ok(())
    }

    /// Fail every outstanding request, returning how many there were
    pub(crate) fn abandon_all(&self) -> usize {
        let drained: Vec<_> = with_lock("RequestStore.pending", &self.pending, |mut pending| {
            pending.drain().collect()
        });

        let count = drained.len();
        for (seq, WaitingRequest { command, tx }) in drained {
            tracing::debug!(seq, %command, "abandoning request");
            let _ = tx.send(Err(Error::RequestAbandoned { command, seq }));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        with_lock("RequestStore.pending", &self.pending, |pending| pending.len())
    }
}

pub(crate) fn with_lock<T, F, R>(name: &str, lock: &Mutex<T>, f: F) -> R
where
    F: FnOnce(MutexGuard<'_, T>) -> R,
{
    tracing::trace!(%name, "taking lock");
    let inner = lock.lock().unwrap_or_else(|e| {
        tracing::warn!(%name, "lock poisoned, recovering");
        e.into_inner()
    });
    let res = f(inner);
    tracing::trace!(%name, "releasing lock");
    res
}
