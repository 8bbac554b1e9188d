use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::protocol::{ChangeSet, Envelope, Prefix};

use super::EnvelopeSink;

/// Accumulator a [`Debounced`] collects into between flushes.
pub trait Coalesce: Default + Send + 'static {
    type Item;

    fn absorb(&mut self, item: Self::Item);

    fn is_empty(&self) -> bool;
}

impl Coalesce for ChangeSet {
    type Item = ChangeSet;

    fn absorb(&mut self, item: ChangeSet) {
        self.merge(item);
    }

    fn is_empty(&self) -> bool {
        ChangeSet::is_empty(self)
    }
}

impl Coalesce for Vec<Value> {
    type Item = Value;

    fn absorb(&mut self, item: Value) {
        self.push(item);
    }

    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

type FlushFn<C> = Arc<dyn Fn(C) + Send + Sync>;

/// Collects items and delivers them as one flush once no new item has
/// arrived for `delay`.
///
/// Every `push` aborts the running timer and starts a new one, so there is
/// never more than one timer per instance. Empty accumulators are never
/// delivered.
pub struct Debounced<C: Coalesce> {
    pending: Arc<Mutex<C>>,
    delay: Duration,
    timer: Option<JoinHandle<()>>,
    flush: FlushFn<C>,
}

impl<C: Coalesce> Debounced<C> {
    pub fn new<F>(delay: Duration, flush: F) -> Self
    where
        F: Fn(C) + Send + Sync + 'static,
    {
        Self {
            pending: Arc::new(Mutex::new(C::default())),
            delay,
            timer: None,
            flush: Arc::new(flush),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn push(&mut self, item: C::Item) {
        self.pending.lock().absorb(item);
        self.restart();
    }

    /// Deliver whatever is pending right now and drop the timer.
    pub fn flush_now(&mut self) {
        self.stop_timer();
        deliver(&self.pending, &self.flush);
    }

    /// Drop the timer and everything pending.
    pub fn cancel(&mut self) {
        self.stop_timer();
        let dropped = std::mem::take(&mut *self.pending.lock());
        if !dropped.is_empty() {
            tracing::trace!("Discarded unflushed changes");
        }
    }

    /// True while a timer is armed.
    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn restart(&mut self) {
        self.stop_timer();
        let pending = Arc::clone(&self.pending);
        let flush = Arc::clone(&self.flush);
        // Deadline is taken now, not on the task's first poll.
        let deadline = tokio::time::Instant::now() + self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            deliver(&pending, &flush);
        }));
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<C: Coalesce> Drop for Debounced<C> {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

fn deliver<C: Coalesce>(pending: &Mutex<C>, flush: &FlushFn<C>) {
    let batch = std::mem::take(&mut *pending.lock());
    if !batch.is_empty() {
        flush(batch);
    }
}

/// Per-entity reporter: merges change-sets and emits them as prefixed envelopes.
pub struct DebouncedReporter {
    inner: Debounced<ChangeSet>,
}

impl DebouncedReporter {
    pub fn new(prefix: Prefix, sink: Arc<dyn EnvelopeSink>, delay: Duration) -> Self {
        let inner = Debounced::new(delay, move |changes: ChangeSet| {
            tracing::debug!(
                "Flushing {} change(s) for {} {}",
                changes.len(),
                prefix.kind.as_str(),
                prefix.id
            );
            sink.post(Envelope {
                prefix: prefix.clone(),
                changes,
            });
        });
        Self { inner }
    }

    pub fn report(&mut self, change: ChangeSet) {
        if change.is_empty() {
            return;
        }
        self.inner.push(change);
    }

    pub fn flush_now(&mut self) {
        self.inner.flush_now();
    }

    pub fn cancel(&mut self) {
        self.inner.cancel();
    }

    pub fn is_armed(&self) -> bool {
        self.inner.is_armed()
    }
}
