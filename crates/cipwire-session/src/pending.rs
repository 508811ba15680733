//! Outstanding requests keyed by their correlation token.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use cipwire_cip::connection_manager::unwrap_unconnected_reply;
use cipwire_cip::Reply;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Result, SessionError};

/// How a raw reply is checked before it reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The reply must answer `service`; a failure status becomes an error
    /// described with the table of `class`.
    Direct { service: u8, class: Option<u16> },
    /// Like `Direct`, but the request went out inside an Unconnected Send,
    /// so a router failure may come back instead.
    Routed { service: u8, class: Option<u16> },
    /// Hand back the decoded reply whatever its status.
    Raw,
}

impl Expect {
    fn check(self, reply: Reply) -> Result<Reply> {
        let reply = match self {
            Expect::Direct { service, class } => {
                reply.expect_service(service)?;
                reply.into_result(class)?
            }
            Expect::Routed { service, class } => unwrap_unconnected_reply(reply, service, class)?,
            Expect::Raw => reply,
        };
        Ok(reply)
    }
}

/// A request waiting for its reply.
#[derive(Debug)]
pub struct Pending {
    tx: oneshot::Sender<Result<Reply>>,
    deadline: Instant,
    timeout: Duration,
    expect: Expect,
}

impl Pending {
    /// Decode and check the reply bytes, then hand the outcome to the caller.
    pub fn resolve(self, message: &[u8]) {
        let outcome = Reply::decode(message)
            .map_err(SessionError::from)
            .and_then(|reply| self.expect.check(reply));
        self.complete(outcome);
    }

    pub fn fail(self, err: SessionError) {
        self.complete(Err(err));
    }

    fn complete(self, outcome: Result<Reply>) {
        // The caller may have stopped waiting.
        let _ = self.tx.send(outcome);
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Correlation key to pending request.
///
/// Each entry leaves the table exactly once: through [`PendingTable::take`],
/// a timeout sweep, or cancellation.
#[derive(Debug)]
pub struct PendingTable<K> {
    entries: HashMap<K, Pending>,
}

impl<K: Copy + Eq + Hash + Debug> PendingTable<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `key`. Returns `None` when the key is already outstanding.
    pub fn insert(&mut self, key: K, timeout: Duration, expect: Expect) -> Option<ReplyHandle> {
        self.insert_at(key, Instant::now(), timeout, expect)
    }

    pub fn insert_at(
        &mut self,
        key: K,
        now: Instant,
        timeout: Duration,
        expect: Expect,
    ) -> Option<ReplyHandle> {
        if self.entries.contains_key(&key) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            key,
            Pending {
                tx,
                deadline: now + timeout,
                timeout,
                expect,
            },
        );
        Some(ReplyHandle { rx })
    }

    pub fn take(&mut self, key: &K) -> Option<Pending> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fail every entry whose deadline is at or before `now` with
    /// [`SessionError::Timeout`]. Returns the keys that expired.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<K> {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            if let Some(pending) = self.entries.remove(key) {
                debug!(?key, timeout = ?pending.timeout, "pending request expired");
                let timeout = pending.timeout;
                pending.fail(SessionError::Timeout(timeout));
            }
        }
        expired
    }

    /// Fail every entry with [`SessionError::Cancelled`].
    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, pending) in self.entries.drain() {
            pending.fail(SessionError::Cancelled);
        }
        count
    }
}

impl<K: Copy + Eq + Hash + Debug> Default for PendingTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives the outcome of one request.
///
/// Await it from async code, or check it with [`ReplyHandle::try_recv`]
/// while driving the session by hand. A handle whose entry was dropped
/// without completion yields [`SessionError::Cancelled`].
#[derive(Debug)]
pub struct ReplyHandle {
    rx: oneshot::Receiver<Result<Reply>>,
}

impl ReplyHandle {
    /// The outcome, if it has arrived.
    pub fn try_recv(&mut self) -> Option<Result<Reply>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SessionError::Cancelled)),
        }
    }
}

impl Future for ReplyHandle {
    type Output = Result<Reply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(SessionError::Cancelled)))
    }
}

/// Expectation for a plain Message Router request.
pub(crate) fn direct(service: u8, class: Option<u16>) -> Expect {
    Expect::Direct { service, class }
}
