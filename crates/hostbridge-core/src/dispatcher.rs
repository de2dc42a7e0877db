//! Deferred callback dispatch.
//!
//! Every context owns one [`Dispatcher`]. `enqueue` appends to an ordered queue
//! and returns at once; the host later drains the queue against the context.
//!
//! ```text
//!  Idle ──drain──▶ Draining ──queue empty──▶ Idle
//!    │                 │
//!    └──────close──────┴──────▶ Closed
//! ```
//!
//! Guarantees:
//! - entries run in enqueue order (FIFO per context)
//! - each entry runs at most once; a second concurrent drainer backs off
//! - a failing or panicking callback is logged and the queue continues
//! - `close` rejects new entries; whatever is left is handed back to the
//!   caller to run or discard

use crate::context::{ExtensionApi, ExtensionContext};
use crate::error::{HostError, HostResult};
use crate::host::LogLevel;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Opaque value handed to a callback. The dispatcher never looks inside it.
pub type Payload = Option<Arc<dyn Any + Send + Sync>>;

/// A deferred callback. Plain function pointer: all data travels in the payload.
pub type DispatchCallback = fn(&ExtensionContext, Payload) -> anyhow::Result<()>;

/// A queued callback.
pub struct DispatchEntry {
    callback: DispatchCallback,
    payload: Payload,
    seq: u64,
}

impl DispatchEntry {
    /// Enqueue-order sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("seq", &self.seq)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Dispatcher lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Draining,
    Closed,
}

struct Queue {
    state: DispatcherState,
    next_seq: u64,
    entries: VecDeque<DispatchEntry>,
}

/// Per-context FIFO of pending callbacks.
pub struct Dispatcher {
    queue: Mutex<Queue>,
    /// Held for the whole of a drain, so teardown can wait out in-flight work.
    drain_lock: Mutex<()>,
    wakeup: Notify,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                state: DispatcherState::Idle,
                next_seq: 0,
                entries: VecDeque::new(),
            }),
            drain_lock: Mutex::new(()),
            wakeup: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a callback. Never blocks on execution.
    pub fn enqueue(
        &self,
        extension: &str,
        callback: DispatchCallback,
        payload: Payload,
    ) -> HostResult<u64> {
        let seq = {
            let mut queue = self.lock();
            if queue.state == DispatcherState::Closed {
                return Err(HostError::ContextClosed(extension.to_string()));
            }

            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.entries.push_back(DispatchEntry {
                callback,
                payload,
                seq,
            });
            seq
        };

        debug!(extension = %extension, seq, "Enqueued callback");
        self.wakeup.notify_one();
        Ok(seq)
    }

    pub fn state(&self) -> DispatcherState {
        self.lock().state
    }

    /// Number of entries waiting to run.
    pub fn pending(&self) -> usize {
        self.lock().entries.len()
    }

    /// Resolves after the next enqueue or close.
    pub fn notified(&self) -> Notified<'_> {
        self.wakeup.notified()
    }

    /// Run queued entries in order until the queue is empty or closed.
    ///
    /// Returns the number of entries executed. Returns 0 immediately if another
    /// drain is already in progress.
    pub fn drain(&self, ctx: &ExtensionContext) -> usize {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            return 0;
        };

        let mut executed = 0;
        loop {
            let entry = {
                let mut queue = self.lock();
                if queue.state == DispatcherState::Closed {
                    break;
                }
                match queue.entries.pop_front() {
                    Some(entry) => {
                        queue.state = DispatcherState::Draining;
                        entry
                    }
                    None => {
                        queue.state = DispatcherState::Idle;
                        break;
                    }
                }
            };

            execute(ctx, entry);
            executed += 1;
        }
        executed
    }

    /// Reject further entries and wake any waiting worker. Idempotent.
    pub fn shut(&self) {
        self.lock().state = DispatcherState::Closed;
        self.wakeup.notify_one();
    }

    /// Shut, then wait for any in-flight drain to finish.
    ///
    /// Returns the entries that never ran, in enqueue order.
    pub fn close(&self) -> Vec<DispatchEntry> {
        self.shut();

        let _guard = self
            .drain_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.lock().entries.drain(..).collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one entry, logging failure through the context. Returns `true` on success.
pub(crate) fn execute(ctx: &ExtensionContext, entry: DispatchEntry) -> bool {
    let DispatchEntry {
        callback,
        payload,
        seq,
    } = entry;

    let reason = match panic::catch_unwind(AssertUnwindSafe(|| callback(ctx, payload))) {
        Ok(Ok(())) => return true,
        Ok(Err(e)) => format!("{e:#}"),
        Err(panic) => panic_message(&*panic),
    };

    let err = HostError::CallbackFailed {
        name: ctx.name().to_string(),
        seq,
        reason,
    };
    warn!(extension = %ctx.name(), seq, "{}", err);
    ctx.log_at(LogLevel::Error, &err.to_string());
    false
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(ctx: &ExtensionContext, payload: Payload) -> anyhow::Result<()> {
        let n = payload
            .as_ref()
            .and_then(|p| p.downcast_ref::<usize>())
            .copied()
            .unwrap_or_default();
        ctx.log(&format!("entry {n}"));
        Ok(())
    }

    fn fail(_ctx: &ExtensionContext, _payload: Payload) -> anyhow::Result<()> {
        anyhow::bail!("deliberate failure")
    }

    fn explode(_ctx: &ExtensionContext, _payload: Payload) -> anyhow::Result<()> {
        panic!("kaboom")
    }

    fn count(_ctx: &ExtensionContext, payload: Payload) -> anyhow::Result<()> {
        if let Some(counter) = payload.as_ref().and_then(|p| p.downcast_ref::<AtomicUsize>()) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn reenqueue(ctx: &ExtensionContext, _payload: Payload) -> anyhow::Result<()> {
        ctx.log("outer");
        ctx.dispatch(None, inner)?;
        Ok(())
    }

    fn inner(ctx: &ExtensionContext, _payload: Payload) -> anyhow::Result<()> {
        ctx.log("inner");
        Ok(())
    }

    #[test]
    fn test_enqueue_does_not_run() {
        let (ctx, sink) = test_context("ext");
        let d = &ctx.dispatcher;

        let seq = d.enqueue("ext", record, Some(Arc::new(1usize))).unwrap();
        assert_eq!(seq, 0);
        assert_eq!(d.pending(), 1);
        assert_eq!(d.state(), DispatcherState::Idle);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_drain_is_fifo() {
        let (ctx, sink) = test_context("ext");
        for i in 0..10usize {
            let seq = ctx.dispatcher.enqueue("ext", record, Some(Arc::new(i))).unwrap();
            assert_eq!(seq, i as u64);
        }

        assert_eq!(ctx.dispatcher.drain(&ctx), 10);
        let expected: Vec<String> = (0..10).map(|i| format!("entry {i}")).collect();
        assert_eq!(sink.messages_for("ext"), expected);
        assert_eq!(ctx.dispatcher.state(), DispatcherState::Idle);
        assert_eq!(ctx.dispatcher.pending(), 0);
    }

    #[test]
    fn test_failure_does_not_starve_queue() {
        let (ctx, sink) = test_context("ext");
        ctx.dispatcher.enqueue("ext", fail, None).unwrap();
        ctx.dispatcher.enqueue("ext", explode, None).unwrap();
        ctx.dispatcher.enqueue("ext", record, Some(Arc::new(7usize))).unwrap();

        assert_eq!(ctx.dispatcher.drain(&ctx), 3);

        let messages = sink.messages_for("ext");
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("Callback #0 failed"));
        assert!(messages[0].contains("deliberate failure"));
        assert!(messages[1].contains("Callback #1 failed"));
        assert!(messages[1].contains("kaboom"));
        assert_eq!(messages[2], "entry 7");

        let errors = sink
            .records()
            .iter()
            .filter(|r| r.level == LogLevel::Error)
            .count();
        assert_eq!(errors, 2);
    }

    #[test]
    fn test_entries_enqueued_while_draining_run_in_same_pass() {
        let (ctx, sink) = test_context("ext");
        ctx.dispatcher.enqueue("ext", reenqueue, None).unwrap();

        assert_eq!(ctx.dispatcher.drain(&ctx), 2);
        assert_eq!(sink.messages_for("ext"), vec!["outer", "inner"]);
    }

    #[test]
    fn test_nested_drain_backs_off() {
        fn nested(ctx: &ExtensionContext, _payload: Payload) -> anyhow::Result<()> {
            assert_eq!(ctx.dispatcher.drain(ctx), 0);
            Ok(())
        }

        let (ctx, _sink) = test_context("ext");
        ctx.dispatcher.enqueue("ext", nested, None).unwrap();
        assert_eq!(ctx.dispatcher.drain(&ctx), 1);
    }

    #[test]
    fn test_payload_is_shared_not_consumed() {
        let (ctx, _sink) = test_context("ext");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let payload: Arc<dyn Any + Send + Sync> = counter.clone();
            ctx.dispatcher.enqueue("ext", count, Some(payload)).unwrap();
        }
        ctx.dispatcher.drain(&ctx);

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(Arc::strong_count(&counter), 1);
    }

    #[test]
    fn test_close_rejects_and_returns_leftovers() {
        let (ctx, _sink) = test_context("ext");
        ctx.dispatcher.enqueue("ext", record, None).unwrap();
        ctx.dispatcher.enqueue("ext", record, None).unwrap();

        let leftovers = ctx.dispatcher.close();
        assert_eq!(leftovers.iter().map(DispatchEntry::seq).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(ctx.dispatcher.state(), DispatcherState::Closed);
        assert_eq!(ctx.dispatcher.drain(&ctx), 0);

        let result = ctx.dispatcher.enqueue("ext", record, None);
        assert!(matches!(result, Err(HostError::ContextClosed(ref n)) if n == "ext"));
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let (ctx, sink) = test_context("ext");
        let ctx = Arc::new(ctx);

        let producers: Vec<_> = (0..4usize)
            .map(|p| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || {
                    for i in 0..25usize {
                        ctx.dispatch(Some(Arc::new(p * 100 + i)), record).unwrap();
                    }
                })
            })
            .collect();

        let mut executed = 0;
        while executed < 100 {
            executed += ctx.dispatcher.drain(&ctx);
            std::thread::yield_now();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        executed += ctx.dispatcher.drain(&ctx);
        assert_eq!(executed, 100);

        let messages = sink.messages_for("ext");
        for p in 0..4usize {
            let seen: Vec<usize> = messages
                .iter()
                .filter_map(|m| m.strip_prefix("entry "))
                .filter_map(|n| n.parse::<usize>().ok())
                .filter(|n| n / 100 == p)
                .collect();
            let expected: Vec<usize> = (0..25).map(|i| p * 100 + i).collect();
            assert_eq!(seen, expected);
        }
    }
}
